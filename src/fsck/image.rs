use std::mem::size_of;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::util::read_le_u32;

use super::dir::DirEntry;
use super::inode::DiskInode;
use super::layout::*;

#[derive(Debug, Error)]
pub enum ImageError {
  #[error("image not found")]
  NotFound {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("image too small to hold a superblock ({len} bytes)")]
  TooSmall { len: usize },
  #[error("implausible superblock: {0}")]
  Geometry(&'static str),
  #[error("image truncated: superblock claims {size} blocks but image holds {len} bytes")]
  Truncated { size: u32, len: usize },
  #[error("block {block} outside filesystem of {size} blocks")]
  BlockOutOfRange { block: BlockNo, size: u32 },
  #[error("inode {inode} outside inode table of {ninodes} inodes")]
  InodeOutOfRange { inode: InodeNo, ninodes: u32 },
}

// size + nblocks + ninodes + nlog
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
  /// Size of filesystem image (blocks)
  pub size: u32,
  /// Number of data blocks
  pub nblocks: u32,
  pub ninodes: u32,
  /// Number of log blocks
  pub nlog: u32,
}

impl Superblock {
  pub const SIZE: usize = 4 * size_of::<u32>();

  pub fn parse(bytes: &[u8]) -> Option<Self> {
    Some(Self {
      size: read_le_u32(bytes, 0)?,
      nblocks: read_le_u32(bytes, 4)?,
      ninodes: read_le_u32(bytes, 8)?,
      nlog: read_le_u32(bytes, 12)?,
    })
  }

  pub fn to_bytes(&self) -> Vec<u8> {
    let mut superblock_bytes = Vec::with_capacity(Self::SIZE);
    superblock_bytes.extend_from_slice(&self.size.to_le_bytes());
    superblock_bytes.extend_from_slice(&self.nblocks.to_le_bytes());
    superblock_bytes.extend_from_slice(&self.ninodes.to_le_bytes());
    superblock_bytes.extend_from_slice(&self.nlog.to_le_bytes());
    superblock_bytes
  }
}

/// Where everything lives, derived once from the superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Geometry {
  pub size: u32,
  pub nblocks: u32,
  pub ninodes: u32,
  pub nlog: u32,
  pub inode_start: BlockNo,
  pub inode_blocks: u32,
  pub bitmap_start: BlockNo,
  pub bitmap_blocks: u32,
  pub first_data_block: BlockNo,
}

impl Geometry {
  /// Validates the superblock against the image length before anything is
  /// sized from it.
  pub fn from_superblock(superblock: &Superblock, image_len: usize) -> Result<Self, ImageError> {
    let Superblock { size, nblocks, ninodes, nlog } = *superblock;

    if size == 0 {
      return Err(ImageError::Geometry("zero-sized filesystem"));
    }
    if nblocks > size {
      return Err(ImageError::Geometry("more data blocks than blocks"));
    }

    let inode_blocks = ninodes / IPB + 1;
    let bitmap_blocks = size / BPB + 1;
    let first_data_block = u64::from(INODE_START_BLOCK) + u64::from(inode_blocks) + u64::from(bitmap_blocks);
    if first_data_block > u64::from(size) {
      return Err(ImageError::Geometry("metadata overruns the filesystem"));
    }

    let required = u64::from(size) * BSIZE as u64;
    if required > image_len as u64 {
      return Err(ImageError::Truncated { size, len: image_len });
    }

    Ok(Self {
      size,
      nblocks,
      ninodes,
      nlog,
      inode_start: INODE_START_BLOCK,
      inode_blocks,
      bitmap_start: INODE_START_BLOCK + inode_blocks,
      bitmap_blocks,
      first_data_block: first_data_block as BlockNo,
    })
  }

  pub fn contains_block(&self, block: BlockNo) -> bool {
    block < self.size
  }

  pub fn contains_inode(&self, inode: InodeNo) -> bool {
    inode < self.ninodes
  }

  /// Blocks that may be handed out to files, clipped to the filesystem.
  pub fn data_blocks(&self) -> Range<BlockNo> {
    let end = self.first_data_block.saturating_add(self.nblocks).min(self.size);
    self.first_data_block..end
  }
}

/// Read-only view over a whole image held in memory.
#[derive(Debug, Clone)]
pub struct ImageView {
  bytes: Vec<u8>,
  geometry: Geometry,
}

impl ImageView {
  pub fn open(path: &Path) -> Result<Self, ImageError> {
    let bytes = std::fs::read(path).map_err(|source| ImageError::NotFound {
      path: path.to_owned(),
      source,
    })?;
    info!(path = %path.display(), bytes = bytes.len(), "loaded image");

    Self::from_bytes(bytes)
  }

  pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ImageError> {
    let offset = SUPERBLOCK_BLOCK as usize * BSIZE;
    let superblock = bytes
      .get(offset..offset + Superblock::SIZE)
      .and_then(Superblock::parse)
      .ok_or(ImageError::TooSmall { len: bytes.len() })?;
    let geometry = Geometry::from_superblock(&superblock, bytes.len())?;
    debug!(?geometry, "derived geometry");

    Ok(Self { bytes, geometry })
  }

  pub fn geometry(&self) -> &Geometry {
    &self.geometry
  }

  pub fn block(&self, block: BlockNo) -> Result<&[u8], ImageError> {
    let out_of_range = ImageError::BlockOutOfRange {
      block,
      size: self.geometry.size,
    };
    if !self.geometry.contains_block(block) {
      return Err(out_of_range);
    }

    let start = block as usize * BSIZE;
    self.bytes.get(start..start + BSIZE).ok_or(out_of_range)
  }

  /// Contiguous run of `count` blocks starting at `start`.
  pub fn blocks(&self, start: BlockNo, count: u32) -> Result<&[u8], ImageError> {
    let end = match start.checked_add(count) {
      Some(end) if end <= self.geometry.size => end,
      _ => {
        return Err(ImageError::BlockOutOfRange {
          block: start.saturating_add(count),
          size: self.geometry.size,
        })
      },
    };

    let range = start as usize * BSIZE..end as usize * BSIZE;
    self.bytes.get(range).ok_or(ImageError::Truncated {
      size: self.geometry.size,
      len: self.bytes.len(),
    })
  }

  pub fn read_inode(&self, inode: InodeNo) -> Result<DiskInode, ImageError> {
    let out_of_range = ImageError::InodeOutOfRange {
      inode,
      ninodes: self.geometry.ninodes,
    };
    if !self.geometry.contains_inode(inode) {
      return Err(out_of_range);
    }

    let block = self.block(self.geometry.inode_start + inode / IPB)?;
    let offset = (inode % IPB) as usize * DINODE_SIZE;
    block
      .get(offset..offset + DINODE_SIZE)
      .and_then(DiskInode::parse)
      .ok_or(out_of_range)
  }

  /// Block interpreted as an array of block addresses (an indirect block).
  pub fn read_addresses(&self, block: BlockNo) -> Result<Vec<BlockNo>, ImageError> {
    let bytes = self.block(block)?;

    Ok(
      bytes
        .chunks_exact(size_of::<u32>())
        .filter_map(|chunk| read_le_u32(chunk, 0))
        .collect(),
    )
  }

  /// Block interpreted as an array of directory entries.
  pub fn read_dir_entries(&self, block: BlockNo) -> Result<Vec<DirEntry>, ImageError> {
    let bytes = self.block(block)?;

    Ok(bytes.chunks_exact(DIRENT_SIZE).filter_map(DirEntry::parse).collect())
  }

  pub fn bitmap_bytes(&self) -> Result<&[u8], ImageError> {
    self.blocks(self.geometry.bitmap_start, self.geometry.bitmap_blocks)
  }

  pub fn sha256(&self) -> String {
    hex::encode(Sha256::digest(&self.bytes))
  }
}


// vim:ts=2 sw=2
