//! Builds well-formed xv6 images in memory, for tests and fixtures.
//!
//! The raw setters (`set_inode`, `write_entry`, `set_allocated`, ...) bypass
//! every invariant so that broken images can be produced on purpose.

use std::mem::size_of;
use std::path::Path;

use thiserror::Error;
use tracing::trace;

use crate::util::{get_bit_at, read_le_u32, set_bit_at};

use super::dir::DirEntry;
use super::image::{Geometry, ImageError, Superblock};
use super::inode::{DiskInode, InodeType};
use super::layout::*;

#[derive(Debug, Error)]
pub enum MkfsError {
  #[error(transparent)]
  Geometry(#[from] ImageError),
  #[error("no free data blocks left")]
  NoSpace,
  #[error("no free inodes left")]
  NoInodes,
  #[error("inode {inode} is not a directory")]
  NotADirectory { inode: InodeNo },
  #[error("directory {inode} cannot grow any further")]
  DirectoryFull { inode: InodeNo },
  #[error("file of {nblocks} blocks does not fit in one inode")]
  FileTooLarge { nblocks: usize },
  #[error("no entry '{name}' in directory {inode}")]
  NoSuchEntry { inode: InodeNo, name: String },
}

pub struct ImageBuilder {
  bytes: Vec<u8>,
  geometry: Geometry,
}

impl ImageBuilder {
  /// Empty filesystem of `size` blocks holding only the root directory.
  pub fn new(size: u32, ninodes: u32) -> Result<Self, MkfsError> {
    let image_len = size as usize * BSIZE;
    let mut superblock = Superblock {
      size,
      nblocks: 0,
      ninodes,
      nlog: 0,
    };
    let layout = Geometry::from_superblock(&superblock, image_len)?;
    superblock.nblocks = size - layout.first_data_block;
    let geometry = Geometry::from_superblock(&superblock, image_len)?;

    let mut builder = Self {
      bytes: vec![0; image_len],
      geometry,
    };

    let offset = SUPERBLOCK_BLOCK as usize * BSIZE;
    builder.bytes[offset..offset + Superblock::SIZE].copy_from_slice(&superblock.to_bytes());

    for block in 0..geometry.first_data_block {
      builder.set_allocated(block, true);
    }

    let mut root = DiskInode::new(InodeType::Dir);
    root.nlink = 1;
    builder.set_inode(ROOT_INO, &root);
    builder.add_entry(ROOT_INO, ".", ROOT_INO)?;
    builder.add_entry(ROOT_INO, "..", ROOT_INO)?;

    Ok(builder)
  }

  pub fn geometry(&self) -> &Geometry {
    &self.geometry
  }

  /// Lowest free data block, marked in the bitmap.
  pub fn alloc_block(&mut self) -> Result<BlockNo, MkfsError> {
    let block = self
      .geometry
      .data_blocks()
      .find(|&block| !self.is_allocated(block))
      .ok_or(MkfsError::NoSpace)?;
    self.set_allocated(block, true);
    trace!(block, "allocated block");

    Ok(block)
  }

  /// Lowest free inode above the root.
  pub fn alloc_inode(&mut self, kind: InodeType) -> Result<InodeNo, MkfsError> {
    let inum = (ROOT_INO + 1..self.geometry.ninodes)
      .find(|&inum| !self.inode(inum).is_allocated())
      .ok_or(MkfsError::NoInodes)?;

    let mut inode = DiskInode::new(kind);
    inode.nlink = 1;
    self.set_inode(inum, &inode);
    trace!(inode = inum, ?kind, "allocated inode");

    Ok(inum)
  }

  pub fn mkdir(&mut self, parent: InodeNo, name: &str) -> Result<InodeNo, MkfsError> {
    self.ensure_dir(parent)?;
    let dir = self.alloc_inode(InodeType::Dir)?;
    self.add_entry(dir, ".", dir)?;
    self.add_entry(dir, "..", parent)?;
    self.add_entry(parent, name, dir)?;

    Ok(dir)
  }

  /// Regular file owning `nblocks` data blocks; past `NDIRECT` they go
  /// through an indirect block.
  pub fn create_file(&mut self, parent: InodeNo, name: &str, nblocks: usize) -> Result<InodeNo, MkfsError> {
    if nblocks > NDIRECT + NINDIRECT {
      return Err(MkfsError::FileTooLarge { nblocks });
    }
    self.ensure_dir(parent)?;

    let file = self.alloc_inode(InodeType::File)?;
    for index in 0..nblocks {
      let block = self.alloc_block()?;
      self.attach_block(file, block, index)?;
    }
    let mut inode = self.inode(file);
    inode.size = (nblocks * BSIZE) as u32;
    self.set_inode(file, &inode);

    self.add_entry(parent, name, file)?;
    Ok(file)
  }

  pub fn mknod(&mut self, parent: InodeNo, name: &str) -> Result<InodeNo, MkfsError> {
    self.ensure_dir(parent)?;
    let device = self.alloc_inode(InodeType::Device)?;
    let mut inode = self.inode(device);
    inode.major = 1;
    inode.minor = 1;
    self.set_inode(device, &inode);

    self.add_entry(parent, name, device)?;
    Ok(device)
  }

  /// Hard link: a new entry plus one more on the target's `nlink`.
  pub fn link(&mut self, dir: InodeNo, name: &str, inum: InodeNo) -> Result<(), MkfsError> {
    self.add_entry(dir, name, inum)?;

    let mut inode = self.inode(inum);
    inode.nlink = inode.nlink.saturating_add(1);
    self.set_inode(inum, &inode);
    Ok(())
  }

  /// Clears the entry and drops the target's `nlink`. The inode itself
  /// stays allocated.
  pub fn unlink(&mut self, dir: InodeNo, name: &str) -> Result<(), MkfsError> {
    let (block, slot, entry) = self
      .entry_slots(dir)?
      .into_iter()
      .find(|(_, _, entry)| !entry.is_empty() && entry.name() == DirEntry::new(0, name).name())
      .ok_or_else(|| MkfsError::NoSuchEntry {
        inode: dir,
        name: name.to_owned(),
      })?;
    self.write_entry(block, slot, &DirEntry::default());

    let target = entry.target();
    let mut inode = self.inode(target);
    inode.nlink = inode.nlink.saturating_sub(1);
    self.set_inode(target, &inode);
    Ok(())
  }

  /// Writes `(inum, name)` into the first empty slot of `dir`, growing it by
  /// a block when every slot is taken. The target is not checked.
  pub fn add_entry(&mut self, dir: InodeNo, name: &str, inum: InodeNo) -> Result<(), MkfsError> {
    self.ensure_dir(dir)?;
    let entry = DirEntry::new(inum as u16, name);

    if let Some((block, slot, _)) = self.entry_slots(dir)?.into_iter().find(|(_, _, entry)| entry.is_empty()) {
      self.write_entry(block, slot, &entry);
      return Ok(());
    }

    let used = self.content_blocks(&self.inode(dir)).len();
    if used >= NDIRECT + NINDIRECT {
      return Err(MkfsError::DirectoryFull { inode: dir });
    }
    let block = self.alloc_block()?;
    self.attach_block(dir, block, used)?;
    self.write_entry(block, 0, &entry);

    let mut inode = self.inode(dir);
    inode.size = inode.size.saturating_add(BSIZE as u32);
    self.set_inode(dir, &inode);
    Ok(())
  }

  /// Inodes outside the table read as free.
  pub fn inode(&self, inum: InodeNo) -> DiskInode {
    self
      .inode_offset(inum)
      .and_then(|offset| self.bytes.get(offset..offset + DINODE_SIZE))
      .and_then(DiskInode::parse)
      .unwrap_or_default()
  }

  pub fn set_inode(&mut self, inum: InodeNo, inode: &DiskInode) {
    if let Some(offset) = self.inode_offset(inum) {
      self.write_bytes(offset, &inode.to_bytes());
    }
  }

  pub fn set_kind(&mut self, inum: InodeNo, kind: InodeType) {
    let mut inode = self.inode(inum);
    inode.kind = kind;
    self.set_inode(inum, &inode);
  }

  pub fn set_nlink(&mut self, inum: InodeNo, nlink: i16) {
    let mut inode = self.inode(inum);
    inode.nlink = nlink;
    self.set_inode(inum, &inode);
  }

  pub fn set_allocated(&mut self, block: BlockNo, allocated: bool) {
    let offset = self.geometry.bitmap_start as usize * BSIZE + block as usize / 8;
    if let Some(byte) = self.bytes.get_mut(offset) {
      *byte = set_bit_at(*byte, (block % 8) as u8, allocated);
    }
  }

  /// Writes `value` into slot `index` of an address block.
  pub fn write_address(&mut self, block: BlockNo, index: usize, value: BlockNo) {
    let offset = block as usize * BSIZE + index * size_of::<u32>();
    self.write_bytes(offset, &value.to_le_bytes());
  }

  pub fn read_address(&self, block: BlockNo, index: usize) -> BlockNo {
    read_le_u32(&self.bytes, block as usize * BSIZE + index * size_of::<u32>()).unwrap_or(0)
  }

  pub fn write_entry(&mut self, block: BlockNo, slot: usize, entry: &DirEntry) {
    let offset = block as usize * BSIZE + slot * DIRENT_SIZE;
    self.write_bytes(offset, &entry.to_bytes());
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.bytes
  }

  pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
    std::fs::write(path, &self.bytes)
  }

  fn ensure_dir(&self, inum: InodeNo) -> Result<(), MkfsError> {
    if self.inode(inum).is_dir() {
      Ok(())
    } else {
      Err(MkfsError::NotADirectory { inode: inum })
    }
  }

  fn is_allocated(&self, block: BlockNo) -> bool {
    let offset = self.geometry.bitmap_start as usize * BSIZE + block as usize / 8;
    self
      .bytes
      .get(offset)
      .map_or(false, |&byte| get_bit_at(byte, (block % 8) as u8))
  }

  /// Puts `block` at logical position `index` of the inode, allocating the
  /// indirect block on first use.
  fn attach_block(&mut self, inum: InodeNo, block: BlockNo, index: usize) -> Result<(), MkfsError> {
    let mut inode = self.inode(inum);
    if index < NDIRECT {
      inode.addrs[index] = block;
    } else {
      if inode.indirect() == 0 {
        inode.addrs[NDIRECT] = self.alloc_block()?;
      }
      self.write_address(inode.indirect(), index - NDIRECT, block);
    }

    self.set_inode(inum, &inode);
    Ok(())
  }

  fn content_blocks(&self, inode: &DiskInode) -> Vec<BlockNo> {
    let mut blocks: Vec<BlockNo> = inode.direct().iter().copied().filter(|&block| block != 0).collect();
    if inode.indirect() != 0 {
      blocks.extend(
        (0..NINDIRECT)
          .map(|index| self.read_address(inode.indirect(), index))
          .filter(|&block| block != 0),
      );
    }
    blocks
  }

  /// Every `(block, slot, entry)` of a directory, in order.
  fn entry_slots(&self, dir: InodeNo) -> Result<Vec<(BlockNo, usize, DirEntry)>, MkfsError> {
    self.ensure_dir(dir)?;

    Ok(
      self
        .content_blocks(&self.inode(dir))
        .into_iter()
        .flat_map(|block| (0..DPB).map(move |slot| (block, slot)))
        .map(|(block, slot)| {
          let offset = block as usize * BSIZE + slot * DIRENT_SIZE;
          let entry = self
            .bytes
            .get(offset..offset + DIRENT_SIZE)
            .and_then(DirEntry::parse)
            .unwrap_or_default();
          (block, slot, entry)
        })
        .collect(),
    )
  }

  fn inode_offset(&self, inum: InodeNo) -> Option<usize> {
    if !self.geometry.contains_inode(inum) {
      return None;
    }

    let block = self.geometry.inode_start + inum / IPB;
    Some(block as usize * BSIZE + (inum % IPB) as usize * DINODE_SIZE)
  }

  fn write_bytes(&mut self, offset: usize, data: &[u8]) {
    if let Some(target) = self.bytes.get_mut(offset..offset + data.len()) {
      target.copy_from_slice(data);
    }
  }
}


// vim:ts=2 sw=2
