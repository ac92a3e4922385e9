use crate::util::{read_le_i16, read_le_u32};

use super::image::{ImageError, ImageView};
use super::layout::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
  Free,
  Dir,
  File,
  Device,
  /// Anything the format does not define
  Unknown(i16),
}

impl Default for InodeType {
  fn default() -> Self {
    Self::Free
  }
}

impl From<i16> for InodeType {
  fn from(raw: i16) -> Self {
    match raw {
      T_FREE => Self::Free,
      T_DIR => Self::Dir,
      T_FILE => Self::File,
      T_DEV => Self::Device,
      other => Self::Unknown(other),
    }
  }
}

impl From<InodeType> for i16 {
  fn from(kind: InodeType) -> Self {
    match kind {
      InodeType::Free => T_FREE,
      InodeType::Dir => T_DIR,
      InodeType::File => T_FILE,
      InodeType::Device => T_DEV,
      InodeType::Unknown(raw) => raw,
    }
  }
}

impl InodeType {
  pub fn is_valid(&self) -> bool {
    !matches!(self, Self::Unknown(_))
  }
}

// 2 + 2 + 2 + 2 + 4 + (4 * 13)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiskInode {
  pub kind: InodeType,
  pub major: i16,
  pub minor: i16,
  pub nlink: i16,
  pub size: u32,
  pub addrs: [BlockNo; NDIRECT + 1],
}

impl DiskInode {
  pub fn new(kind: InodeType) -> Self {
    Self {
      kind,
      ..Self::default()
    }
  }

  pub fn parse(bytes: &[u8]) -> Option<Self> {
    let mut addrs = [0; NDIRECT + 1];
    for (slot, address) in addrs.iter_mut().enumerate() {
      *address = read_le_u32(bytes, 12 + slot * 4)?;
    }

    Some(Self {
      kind: read_le_i16(bytes, 0)?.into(),
      major: read_le_i16(bytes, 2)?,
      minor: read_le_i16(bytes, 4)?,
      nlink: read_le_i16(bytes, 6)?,
      size: read_le_u32(bytes, 8)?,
      addrs,
    })
  }

  pub fn to_bytes(&self) -> Vec<u8> {
    let mut inode_bytes = Vec::with_capacity(DINODE_SIZE);
    inode_bytes.extend_from_slice(&i16::from(self.kind).to_le_bytes());
    inode_bytes.extend_from_slice(&self.major.to_le_bytes());
    inode_bytes.extend_from_slice(&self.minor.to_le_bytes());
    inode_bytes.extend_from_slice(&self.nlink.to_le_bytes());
    inode_bytes.extend_from_slice(&self.size.to_le_bytes());
    inode_bytes.extend(self.addrs.iter().flat_map(|address| address.to_le_bytes()));
    inode_bytes
  }

  pub fn is_allocated(&self) -> bool {
    self.kind != InodeType::Free
  }

  pub fn is_dir(&self) -> bool {
    self.kind == InodeType::Dir
  }

  pub fn direct(&self) -> &[BlockNo] {
    &self.addrs[..NDIRECT]
  }

  pub fn indirect(&self) -> BlockNo {
    self.addrs[NDIRECT]
  }
}

/// Every on-disk inode, decoded once in index order.
#[derive(Debug, Clone)]
pub struct InodeTable {
  inodes: Vec<DiskInode>,
}

impl InodeTable {
  pub fn load(view: &ImageView) -> Result<Self, ImageError> {
    let inodes = (0..view.geometry().ninodes)
      .map(|inum| view.read_inode(inum))
      .collect::<Result<Vec<_>, _>>()?;

    Ok(Self { inodes })
  }

  pub fn len(&self) -> usize {
    self.inodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inodes.is_empty()
  }

  pub fn get(&self, inum: InodeNo) -> Option<&DiskInode> {
    self.inodes.get(inum as usize)
  }

  pub fn iter(&self) -> impl Iterator<Item = (InodeNo, &DiskInode)> {
    self.inodes.iter().enumerate().map(|(inum, inode)| (inum as InodeNo, inode))
  }

  pub fn allocated(&self) -> impl Iterator<Item = (InodeNo, &DiskInode)> {
    self.iter().filter(|(_, inode)| inode.is_allocated())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fsck::mkfs::ImageBuilder;

  #[test]
  fn inode_type_from_raw() {
    assert_eq!(InodeType::from(0), InodeType::Free);
    assert_eq!(InodeType::from(1), InodeType::Dir);
    assert_eq!(InodeType::from(2), InodeType::File);
    assert_eq!(InodeType::from(3), InodeType::Device);
    assert_eq!(InodeType::from(4), InodeType::Unknown(4));
    assert_eq!(InodeType::from(-1), InodeType::Unknown(-1));
    assert!(!InodeType::Unknown(7).is_valid());
    assert_eq!(i16::from(InodeType::Unknown(9)), 9);
  }

  #[test]
  fn inode_encoding_is_64_bytes() {
    let mut inode = DiskInode::new(InodeType::File);
    inode.nlink = 2;
    inode.size = 1024;
    inode.addrs[0] = 40;
    inode.addrs[NDIRECT] = 41;

    let bytes = inode.to_bytes();
    assert_eq!(bytes.len(), DINODE_SIZE);
    assert_eq!(DiskInode::parse(&bytes), Some(inode));
    assert_eq!(&bytes[0..2], &[2, 0]);
    assert_eq!(&bytes[60..64], &41u32.to_le_bytes());
  }

  #[test]
  fn short_record_does_not_parse() {
    assert_eq!(DiskInode::parse(&[0u8; DINODE_SIZE - 1]), None);
  }

  #[test]
  fn table_holds_every_inode() {
    let mut builder = ImageBuilder::new(256, 40).unwrap();
    let file = builder.create_file(ROOT_INO, "a", 1).unwrap();
    let view = ImageView::from_bytes(builder.into_bytes()).unwrap();
    let table = InodeTable::load(&view).unwrap();

    assert_eq!(table.len(), 40);
    assert!(table.get(40).is_none());
    assert_eq!(table.get(file).map(|inode| inode.kind), Some(InodeType::File));
    assert_eq!(
      table.allocated().map(|(inum, _)| inum).collect::<Vec<_>>(),
      vec![ROOT_INO, file],
    );
  }
}

// vim:ts=2 sw=2
