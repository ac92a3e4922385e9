use std::fmt;

use thiserror::Error;

use super::layout::{BlockNo, InodeNo};

/// The twelve invariants, numbered in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rule {
  InodeType = 1,
  AddressRange = 2,
  RootDirectory = 3,
  DirectoryFormat = 4,
  BitmapUnderMarked = 5,
  BitmapOverMarked = 6,
  DirectUniqueness = 7,
  IndirectUniqueness = 8,
  Orphan = 9,
  DanglingReference = 10,
  FileLinkCount = 11,
  DirectoryLinkCount = 12,
}

impl Rule {
  pub const ALL: [Rule; 12] = [
    Rule::InodeType,
    Rule::AddressRange,
    Rule::RootDirectory,
    Rule::DirectoryFormat,
    Rule::BitmapUnderMarked,
    Rule::BitmapOverMarked,
    Rule::DirectUniqueness,
    Rule::IndirectUniqueness,
    Rule::Orphan,
    Rule::DanglingReference,
    Rule::FileLinkCount,
    Rule::DirectoryLinkCount,
  ];

  pub fn number(self) -> u8 {
    self as u8
  }

  /// Rules 9-12 need the directory walk.
  pub fn needs_reference_counts(self) -> bool {
    self >= Rule::Orphan
  }

  pub fn name(self) -> &'static str {
    match self {
      Rule::InodeType => "inode type",
      Rule::AddressRange => "address range",
      Rule::RootDirectory => "root directory",
      Rule::DirectoryFormat => "directory format",
      Rule::BitmapUnderMarked => "used blocks marked in bitmap",
      Rule::BitmapOverMarked => "marked blocks in use",
      Rule::DirectUniqueness => "direct address uniqueness",
      Rule::IndirectUniqueness => "indirect address uniqueness",
      Rule::Orphan => "allocated inodes referenced",
      Rule::DanglingReference => "referenced inodes allocated",
      Rule::FileLinkCount => "file link count",
      Rule::DirectoryLinkCount => "directory link count",
    }
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "rule {} ({})", self.number(), self.name())
  }
}

/// A broken invariant. `Display` is the fixed diagnostic; the fields say
/// where it was found.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
  #[error("bad inode")]
  BadInodeType { inode: InodeNo, raw: i16 },
  #[error("bad direct address in inode.")]
  BadDirectAddress { inode: InodeNo, block: BlockNo },
  #[error("bad indirect address in inode.")]
  BadIndirectAddress { inode: InodeNo, block: BlockNo },
  #[error("root directory does not exist.")]
  RootMissing { reason: &'static str },
  #[error("directory not properly formatted.")]
  BadDirectoryFormat { inode: InodeNo, reason: &'static str },
  #[error("address used by inode but marked free in bitmap.")]
  UsedBlockMarkedFree { inode: InodeNo, block: BlockNo },
  #[error("bitmap marks block in use but it is not in use.")]
  FreeBlockMarkedUsed { block: BlockNo },
  #[error("direct address used more than once.")]
  DuplicateDirectAddress { inode: InodeNo, block: BlockNo },
  #[error("indirect address used more than once.")]
  DuplicateIndirectAddress { inode: InodeNo, block: BlockNo },
  #[error("inode marked use but not found in a directory.")]
  Orphan { inode: InodeNo },
  #[error("inode referred to in directory but marked free.")]
  DanglingReference { inode: InodeNo, references: u32 },
  #[error("bad reference count for file.")]
  FileLinkCount { inode: InodeNo, nlink: i16, references: u32 },
  #[error("directory appears more than once in file system.")]
  DirectoryLinkCount { inode: InodeNo, references: u32 },
}

impl Violation {
  /// Where the violation was found, for logs and reports.
  pub fn detail(&self) -> String {
    match self {
      Self::BadInodeType { inode, raw } => format!("inode {inode} has type {raw}"),
      Self::BadDirectAddress { inode, block } | Self::BadIndirectAddress { inode, block } => {
        format!("inode {inode} points at block {block}")
      },
      Self::RootMissing { reason } => reason.to_string(),
      Self::BadDirectoryFormat { inode, reason } => format!("directory {inode}: {reason}"),
      Self::UsedBlockMarkedFree { inode, block } => format!("block {block} of inode {inode} is free"),
      Self::FreeBlockMarkedUsed { block } => format!("block {block} is owned by no inode"),
      Self::DuplicateDirectAddress { inode, block } | Self::DuplicateIndirectAddress { inode, block } => {
        format!("block {block} reused by inode {inode}")
      },
      Self::Orphan { inode } => format!("inode {inode} has no directory entry"),
      Self::DanglingReference { inode, references } => {
        format!("free inode {inode} is named by {references} entries")
      },
      Self::FileLinkCount { inode, nlink, references } => {
        format!("file {inode} has nlink {nlink} but {references} entries")
      },
      Self::DirectoryLinkCount { inode, references } => {
        format!("directory {inode} is named by {references} entries")
      },
    }
  }
}


// vim:ts=2 sw=2
