use crate::util::{read_le_u16, trim_nul};

use super::layout::*;

pub const SELF_NAME: &[u8] = b".";
pub const PARENT_NAME: &[u8] = b"..";

/// A fixed-size `(inum, name)` record. `inum == 0` marks an empty slot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
  pub inum: u16,
  pub name: [u8; DIRSIZ],
}

impl DirEntry {
  /// Names longer than `DIRSIZ` are cut, the way xv6 stores them.
  pub fn new(inum: u16, name: &str) -> Self {
    let mut raw = [0u8; DIRSIZ];
    let len = name.len().min(DIRSIZ);
    raw[..len].copy_from_slice(&name.as_bytes()[..len]);

    Self { inum, name: raw }
  }

  pub fn parse(bytes: &[u8]) -> Option<Self> {
    let inum = read_le_u16(bytes, 0)?;
    let name = bytes.get(2..DIRENT_SIZE)?.try_into().ok()?;

    Some(Self { inum, name })
  }

  pub fn to_bytes(&self) -> [u8; DIRENT_SIZE] {
    let mut bytes = [0u8; DIRENT_SIZE];
    bytes[..2].copy_from_slice(&self.inum.to_le_bytes());
    bytes[2..].copy_from_slice(&self.name);
    bytes
  }

  pub fn is_empty(&self) -> bool {
    self.inum == 0
  }

  pub fn name(&self) -> &[u8] {
    trim_nul(&self.name)
  }

  pub fn is_self(&self) -> bool {
    self.name() == SELF_NAME
  }

  pub fn is_parent(&self) -> bool {
    self.name() == PARENT_NAME
  }

  /// `.` and `..` never name a new object
  pub fn is_link_to_tree(&self) -> bool {
    !self.is_empty() && !self.is_self() && !self.is_parent()
  }

  pub fn target(&self) -> InodeNo {
    InodeNo::from(self.inum)
  }

  pub fn display_name(&self) -> String {
    String::from_utf8_lossy(self.name()).into_owned()
  }
}


// vim:ts=2 sw=2
