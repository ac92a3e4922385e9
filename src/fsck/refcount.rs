//! Rules comparing inode metadata against the counts from the directory walk.

use super::inode::{DiskInode, InodeType};
use super::layout::InodeNo;
use super::violation::{Rule, Violation};

pub type ReferenceCheck = fn(InodeNo, &DiskInode, u32) -> Result<(), Violation>;

/// Applied to one inode at a time, in this order.
pub const REFERENCE_RULES: [(Rule, ReferenceCheck); 4] = [
  (Rule::Orphan, check_referenced),
  (Rule::DanglingReference, check_allocated),
  (Rule::FileLinkCount, check_file_links),
  (Rule::DirectoryLinkCount, check_directory_links),
];

/// Rule 9
pub fn check_referenced(inum: InodeNo, inode: &DiskInode, references: u32) -> Result<(), Violation> {
  if inode.is_allocated() && references == 0 {
    return Err(Violation::Orphan { inode: inum });
  }

  Ok(())
}

/// Rule 10
pub fn check_allocated(inum: InodeNo, inode: &DiskInode, references: u32) -> Result<(), Violation> {
  if !inode.is_allocated() && references > 0 {
    return Err(Violation::DanglingReference { inode: inum, references });
  }

  Ok(())
}

/// Rule 11
pub fn check_file_links(inum: InodeNo, inode: &DiskInode, references: u32) -> Result<(), Violation> {
  if inode.kind == InodeType::File && i64::from(inode.nlink) != i64::from(references) {
    return Err(Violation::FileLinkCount {
      inode: inum,
      nlink: inode.nlink,
      references,
    });
  }

  Ok(())
}

/// Rule 12: no hard links to directories.
pub fn check_directory_links(inum: InodeNo, inode: &DiskInode, references: u32) -> Result<(), Violation> {
  if inode.is_dir() && references > 1 {
    return Err(Violation::DirectoryLinkCount { inode: inum, references });
  }

  Ok(())
}


// vim:ts=2 sw=2
