use std::path::Path;

use tracing::trace;

use super::bitmap::Bitmap;
use super::dir::DirEntry;
use super::image::{Geometry, ImageError, ImageView};
use super::inode::{DiskInode, InodeTable};
use super::layout::*;

/// An opened image: the raw view plus the decoded inode table and bitmap.
#[derive(Debug, Clone)]
pub struct Volume {
  view: ImageView,
  inodes: InodeTable,
  bitmap: Bitmap,
}

impl Volume {
  pub fn open(path: &Path) -> Result<Self, ImageError> {
    Self::from_view(ImageView::open(path)?)
  }

  pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ImageError> {
    Self::from_view(ImageView::from_bytes(bytes)?)
  }

  pub fn from_view(view: ImageView) -> Result<Self, ImageError> {
    let inodes = InodeTable::load(&view)?;
    let bitmap = Bitmap::load(&view)?;

    Ok(Self { view, inodes, bitmap })
  }

  pub fn view(&self) -> &ImageView {
    &self.view
  }

  pub fn geometry(&self) -> &Geometry {
    self.view.geometry()
  }

  pub fn inodes(&self) -> &InodeTable {
    &self.inodes
  }

  pub fn bitmap(&self) -> &Bitmap {
    &self.bitmap
  }

  /// Contents of the inode's indirect block. Empty when there is none or
  /// when the pointer cannot be dereferenced (range checks report that).
  pub fn indirect_addresses(&self, inode: &DiskInode) -> Vec<BlockNo> {
    match inode.indirect() {
      0 => Vec::new(),
      block => self.view.read_addresses(block).unwrap_or_else(|error| {
        trace!(block, %error, "indirect block unreadable");
        Vec::new()
      }),
    }
  }

  /// Every non-zero block the inode owns: direct blocks, the indirect block
  /// itself and the blocks it lists.
  pub fn referenced_blocks(&self, inode: &DiskInode) -> Vec<BlockNo> {
    let mut blocks: Vec<BlockNo> = inode.addrs.iter().copied().filter(|&block| block != 0).collect();
    blocks.extend(self.indirect_addresses(inode).into_iter().filter(|&block| block != 0));
    blocks
  }

  /// Blocks holding a directory's entries: direct blocks in order, then the
  /// blocks listed by the indirect block. Holes are skipped.
  pub fn content_blocks(&self, inode: &DiskInode) -> Vec<BlockNo> {
    inode
      .direct()
      .iter()
      .copied()
      .chain(self.indirect_addresses(inode))
      .filter(|&block| block != 0)
      .collect()
  }

  pub fn dir_entries(&self, inode: &DiskInode) -> Vec<DirEntry> {
    self
      .content_blocks(inode)
      .into_iter()
      .flat_map(|block| {
        self.view.read_dir_entries(block).unwrap_or_else(|error| {
          trace!(block, %error, "directory block unreadable");
          Vec::new()
        })
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fsck::mkfs::ImageBuilder;

  #[test]
  fn large_file_spills_into_indirect_block() {
    let mut builder = ImageBuilder::new(512, 32).unwrap();
    let file = builder.create_file(ROOT_INO, "big", NDIRECT + 3).unwrap();
    let volume = Volume::from_bytes(builder.into_bytes()).unwrap();
    let inode = volume.inodes().get(file).unwrap();

    assert_ne!(inode.indirect(), 0);
    assert_eq!(volume.indirect_addresses(inode).iter().filter(|&&block| block != 0).count(), 3);
    assert_eq!(volume.referenced_blocks(inode).len(), NDIRECT + 1 + 3);
    assert_eq!(volume.content_blocks(inode).len(), NDIRECT + 3);
  }

  #[test]
  fn small_file_has_no_indirect_block() {
    let mut builder = ImageBuilder::new(128, 32).unwrap();
    let file = builder.create_file(ROOT_INO, "small", 2).unwrap();
    let volume = Volume::from_bytes(builder.into_bytes()).unwrap();
    let inode = volume.inodes().get(file).unwrap();

    assert!(volume.indirect_addresses(inode).is_empty());
    assert_eq!(volume.referenced_blocks(inode).len(), 2);
  }

  #[test]
  fn unreadable_indirect_pointer_reads_as_empty() {
    let mut builder = ImageBuilder::new(128, 32).unwrap();
    let file = builder.create_file(ROOT_INO, "f", 1).unwrap();
    let mut inode = builder.inode(file);
    inode.addrs[NDIRECT] = 5000;
    builder.set_inode(file, &inode);
    let volume = Volume::from_bytes(builder.into_bytes()).unwrap();

    assert!(volume.indirect_addresses(volume.inodes().get(file).unwrap()).is_empty());
  }

  #[test]
  fn root_entries_start_with_dots() {
    let volume = Volume::from_bytes(ImageBuilder::new(128, 32).unwrap().into_bytes()).unwrap();
    let root = volume.inodes().get(ROOT_INO).unwrap();
    let entries = volume.dir_entries(root);

    assert!(entries[0].is_self());
    assert!(entries[1].is_parent());
    assert!(entries[2..].iter().all(DirEntry::is_empty));
  }
}

// vim:ts=2 sw=2
