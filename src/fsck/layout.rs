//! On-disk constants of the xv6 filesystem format.
//!
//! ```text
//! [ boot | super | inodes ... | bitmap ... | data ... | log ... ]
//!   0      1       2
//! ```

use std::mem::size_of;

pub type BlockNo = u32;
pub type InodeNo = u32;

/// Block size in bytes
pub const BSIZE: usize = 512;

pub const SUPERBLOCK_BLOCK: BlockNo = 1;
pub const INODE_START_BLOCK: BlockNo = 2;

pub const NDIRECT: usize = 12;
pub const NINDIRECT: usize = BSIZE / size_of::<u32>();

/// `type`, `major`, `minor`, `nlink` (i16 each), `size` (u32), `addrs` (u32 * 13)
pub const DINODE_SIZE: usize = 4 * size_of::<i16>() + size_of::<u32>() + (NDIRECT + 1) * size_of::<u32>();
/// Inodes per block
pub const IPB: u32 = (BSIZE / DINODE_SIZE) as u32;
/// Bitmap bits per block
pub const BPB: u32 = (BSIZE * 8) as u32;

pub const DIRSIZ: usize = 14;
pub const DIRENT_SIZE: usize = size_of::<u16>() + DIRSIZ;
/// Directory entries per block
pub const DPB: usize = BSIZE / DIRENT_SIZE;

/// Inode 0 is never handed out.
pub const RESERVED_INO: InodeNo = 0;
pub const ROOT_INO: InodeNo = 1;

pub const T_FREE: i16 = 0;
pub const T_DIR: i16 = 1;
pub const T_FILE: i16 = 2;
pub const T_DEV: i16 = 3;


// vim:ts=2 sw=2
