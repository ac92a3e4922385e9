use crate::util::get_bit_at;

use super::image::{ImageError, ImageView};
use super::layout::BlockNo;

/// Free-block bitmap: block `b` is bit `b % 8` of byte `b / 8`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
  bits: Vec<u8>,
}

impl Bitmap {
  pub fn new(bits: Vec<u8>) -> Self {
    Self { bits }
  }

  pub fn load(view: &ImageView) -> Result<Self, ImageError> {
    Ok(Self::new(view.bitmap_bytes()?.to_vec()))
  }

  /// Blocks past the end of the bitmap read as free.
  pub fn is_allocated(&self, block: BlockNo) -> bool {
    self
      .bits
      .get(block as usize / 8)
      .map(|&byte| get_bit_at(byte, (block % 8) as u8))
      .unwrap_or(false)
  }

  pub fn allocated_in(&self, blocks: std::ops::Range<BlockNo>) -> impl Iterator<Item = BlockNo> + '_ {
    blocks.filter(move |&block| self.is_allocated(block))
  }
}


// vim:ts=2 sw=2
