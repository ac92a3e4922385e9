use std::mem::size_of;

/// gets the bit at position `n`. Bits are numbered from 0 (least significant) to 7 (most significant).
pub fn get_bit_at(input: u8, n: u8) -> bool {
  if n < 8 {
    input & (1 << n) != 0
  } else {
    false
  }
}

pub fn set_bit_at(input: u8, n: u8, value: bool) -> u8 {
  if n >= 8 {
    return input;
  }

  if value {
    input | (1 << n)
  } else {
    input & !(1 << n)
  }
}

pub fn read_le_u16(data: &[u8], offset: usize) -> Option<u16> {
  let bytes = data.get(offset..offset.checked_add(size_of::<u16>())?)?;
  Some(u16::from_le_bytes(bytes.try_into().ok()?))
}

pub fn read_le_i16(data: &[u8], offset: usize) -> Option<i16> {
  read_le_u16(data, offset).map(|raw| raw as i16)
}

pub fn read_le_u32(data: &[u8], offset: usize) -> Option<u32> {
  let bytes = data.get(offset..offset.checked_add(size_of::<u32>())?)?;
  Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

/// Fixed-size, NUL-padded name fields end at the first NUL.
pub fn trim_nul(raw: &[u8]) -> &[u8] {
  match raw.iter().position(|&byte| byte == 0) {
    Some(end) => &raw[..end],
    None => raw,
  }
}


// vim:ts=2 sw=2
