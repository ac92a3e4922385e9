//! Structural passes. Each walks the inode table once and returns the first
//! violation it finds. None of them needs the directory walk.

use tracing::trace;

use super::layout::*;
use super::violation::{Rule, Violation};
use super::volume::Volume;

pub type StructuralCheck = fn(&Volume) -> Result<(), Violation>;

/// Evaluation order matters: later passes assume earlier ones held.
pub const STRUCTURAL_RULES: [(Rule, StructuralCheck); 8] = [
  (Rule::InodeType, check_inode_types),
  (Rule::AddressRange, check_addresses),
  (Rule::RootDirectory, check_root),
  (Rule::DirectoryFormat, check_directory_format),
  (Rule::BitmapUnderMarked, check_used_blocks_marked),
  (Rule::BitmapOverMarked, check_marked_blocks_used),
  (Rule::DirectUniqueness, check_direct_uniqueness),
  (Rule::IndirectUniqueness, check_indirect_uniqueness),
];

/// Rule 1
pub fn check_inode_types(volume: &Volume) -> Result<(), Violation> {
  match volume.inodes().iter().find(|(_, inode)| !inode.kind.is_valid()) {
    Some((inum, inode)) => Err(Violation::BadInodeType {
      inode: inum,
      raw: inode.kind.into(),
    }),
    None => Ok(()),
  }
}

/// Rule 2: direct addresses first, then everything behind indirect blocks.
pub fn check_addresses(volume: &Volume) -> Result<(), Violation> {
  check_direct_addresses(volume)?;
  check_indirect_addresses(volume)
}

pub fn check_direct_addresses(volume: &Volume) -> Result<(), Violation> {
  let geometry = volume.geometry();

  for (inum, inode) in volume.inodes().allocated() {
    if let Some(&block) = inode
      .direct()
      .iter()
      .find(|&&block| block != 0 && !geometry.contains_block(block))
    {
      return Err(Violation::BadDirectAddress { inode: inum, block });
    }
  }

  Ok(())
}

pub fn check_indirect_addresses(volume: &Volume) -> Result<(), Violation> {
  let geometry = volume.geometry();

  for (inum, inode) in volume.inodes().allocated() {
    let indirect = inode.indirect();
    if indirect == 0 {
      continue;
    }

    // The view refuses to read a pointer outside the filesystem
    let addresses = match volume.view().read_addresses(indirect) {
      Ok(addresses) => addresses,
      Err(_) => return Err(Violation::BadIndirectAddress { inode: inum, block: indirect }),
    };

    if let Some(block) = addresses
      .into_iter()
      .find(|&block| block != 0 && !geometry.contains_block(block))
    {
      return Err(Violation::BadIndirectAddress { inode: inum, block });
    }
  }

  Ok(())
}

/// Rule 3: inode 1 is a directory whose first entry is `.` naming itself.
pub fn check_root(volume: &Volume) -> Result<(), Violation> {
  let root = match volume.inodes().get(ROOT_INO) {
    Some(root) if root.is_dir() => root,
    Some(_) => return Err(Violation::RootMissing { reason: "inode 1 is not a directory" }),
    None => return Err(Violation::RootMissing { reason: "inode table has no inode 1" }),
  };

  let first = volume
    .content_blocks(root)
    .first()
    .and_then(|&block| volume.view().read_dir_entries(block).ok())
    .and_then(|entries| entries.first().copied());

  match first {
    Some(entry) if entry.is_self() && entry.target() == ROOT_INO => Ok(()),
    Some(_) => Err(Violation::RootMissing { reason: "first root entry is not '.' naming inode 1" }),
    None => Err(Violation::RootMissing { reason: "root directory has no data blocks" }),
  }
}

/// Rule 4: exactly one `.` naming the directory, exactly one `..` naming the
/// parent (the root is its own parent), and no entry past the inode table.
pub fn check_directory_format(volume: &Volume) -> Result<(), Violation> {
  let geometry = volume.geometry();

  for (inum, inode) in volume.inodes().allocated().filter(|(_, inode)| inode.is_dir()) {
    let mut self_entries = 0;
    let mut parent_entries = 0;

    for entry in volume.dir_entries(inode).into_iter().filter(|entry| !entry.is_empty()) {
      let target = entry.target();

      if !geometry.contains_inode(target) {
        return Err(Violation::BadDirectoryFormat {
          inode: inum,
          reason: "entry names an inode past the inode table",
        });
      }

      if entry.is_self() {
        self_entries += 1;
        if target != inum {
          return Err(Violation::BadDirectoryFormat { inode: inum, reason: "'.' does not name the directory" });
        }
      } else if entry.is_parent() {
        parent_entries += 1;
        if inum == ROOT_INO && target != ROOT_INO {
          return Err(Violation::RootMissing { reason: "root '..' does not name the root" });
        }
        if inum != ROOT_INO && target == inum {
          return Err(Violation::BadDirectoryFormat { inode: inum, reason: "'..' names the directory itself" });
        }
      }
    }

    trace!(inode = inum, self_entries, parent_entries, "directory entries counted");
    match (self_entries, parent_entries) {
      (1, 1) => (),
      (0, _) => return Err(Violation::BadDirectoryFormat { inode: inum, reason: "missing '.'" }),
      (_, 0) => return Err(Violation::BadDirectoryFormat { inode: inum, reason: "missing '..'" }),
      _ => return Err(Violation::BadDirectoryFormat { inode: inum, reason: "duplicate '.' or '..'" }),
    }
  }

  Ok(())
}

/// Rule 5: whatever an inode owns is marked allocated.
pub fn check_used_blocks_marked(volume: &Volume) -> Result<(), Violation> {
  let geometry = volume.geometry();
  let bitmap = volume.bitmap();

  for (inum, inode) in volume.inodes().allocated() {
    let unmarked = volume
      .referenced_blocks(inode)
      .into_iter()
      .filter(|&block| geometry.contains_block(block))
      .find(|&block| !bitmap.is_allocated(block));

    if let Some(block) = unmarked {
      return Err(Violation::UsedBlockMarkedFree { inode: inum, block });
    }
  }

  Ok(())
}

/// Rule 6: whatever the bitmap marks in the data region is owned by someone.
pub fn check_marked_blocks_used(volume: &Volume) -> Result<(), Violation> {
  let geometry = volume.geometry();
  let mut in_use = vec![false; geometry.size as usize];

  for (_, inode) in volume.inodes().allocated() {
    for block in volume.referenced_blocks(inode) {
      if let Some(slot) = in_use.get_mut(block as usize) {
        *slot = true;
      }
    }
  }

  match volume
    .bitmap()
    .allocated_in(geometry.data_blocks())
    .find(|&block| !in_use[block as usize])
  {
    Some(block) => Err(Violation::FreeBlockMarkedUsed { block }),
    None => Ok(()),
  }
}

/// Rule 7
pub fn check_direct_uniqueness(volume: &Volume) -> Result<(), Violation> {
  let mut seen = vec![false; volume.geometry().size as usize];

  for (inum, inode) in volume.inodes().allocated() {
    for &block in inode.direct() {
      if let Some(true) = mark_seen(&mut seen, block) {
        return Err(Violation::DuplicateDirectAddress { inode: inum, block });
      }
    }
  }

  Ok(())
}

/// Rule 8
pub fn check_indirect_uniqueness(volume: &Volume) -> Result<(), Violation> {
  let mut seen = vec![false; volume.geometry().size as usize];

  for (inum, inode) in volume.inodes().allocated() {
    for block in volume.indirect_addresses(inode) {
      if let Some(true) = mark_seen(&mut seen, block) {
        return Err(Violation::DuplicateIndirectAddress { inode: inum, block });
      }
    }
  }

  Ok(())
}

/// Marks `block` and returns whether it had been seen before. Holes and
/// out-of-range addresses are not tracked.
fn mark_seen(seen: &mut [bool], block: BlockNo) -> Option<bool> {
  if block == 0 {
    return None;
  }

  let slot = seen.get_mut(block as usize)?;
  Some(std::mem::replace(slot, true))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fsck::dir::DirEntry;
  use crate::fsck::image::Superblock;
  use crate::fsck::inode::InodeType;
  use crate::fsck::mkfs::ImageBuilder;

  fn volume(builder: ImageBuilder) -> Volume {
    Volume::from_bytes(builder.into_bytes()).unwrap()
  }

  fn builder() -> ImageBuilder {
    ImageBuilder::new(512, 64).unwrap()
  }

  fn run_all(volume: &Volume) -> Result<(), Violation> {
    STRUCTURAL_RULES.iter().try_for_each(|(_, check)| check(volume))
  }

  #[test]
  fn minimal_image_passes() {
    assert_eq!(run_all(&volume(builder())), Ok(()));
  }

  #[test]
  fn populated_image_passes() {
    let mut builder = builder();
    let dir = builder.mkdir(ROOT_INO, "dir").unwrap();
    builder.create_file(dir, "small", 2).unwrap();
    builder.create_file(ROOT_INO, "large", NDIRECT + 10).unwrap();
    builder.mknod(dir, "console").unwrap();

    assert_eq!(run_all(&volume(builder)), Ok(()));
  }

  #[test]
  fn unknown_inode_type() {
    let mut builder = builder();
    let file = builder.create_file(ROOT_INO, "f", 1).unwrap();
    builder.set_kind(file, InodeType::Unknown(7));

    assert_eq!(check_inode_types(&volume(builder)), Err(Violation::BadInodeType { inode: file, raw: 7 }));
  }

  #[test]
  fn free_inode_with_garbage_is_skipped() {
    let mut builder = builder();
    let mut inode = builder.inode(20);
    inode.addrs[0] = 100_000;
    builder.set_inode(20, &inode);

    assert_eq!(check_addresses(&volume(builder)), Ok(()));
  }

  #[test]
  fn direct_address_out_of_range() {
    let mut builder = builder();
    let file = builder.create_file(ROOT_INO, "f", 1).unwrap();
    let mut inode = builder.inode(file);
    inode.addrs[3] = 512;
    builder.set_inode(file, &inode);

    assert_eq!(
      check_addresses(&volume(builder)),
      Err(Violation::BadDirectAddress { inode: file, block: 512 }),
    );
  }

  #[test]
  fn indirect_pointer_out_of_range() {
    let mut builder = builder();
    let file = builder.create_file(ROOT_INO, "f", 1).unwrap();
    let mut inode = builder.inode(file);
    inode.addrs[NDIRECT] = 9000;
    builder.set_inode(file, &inode);

    assert_eq!(
      check_addresses(&volume(builder)),
      Err(Violation::BadIndirectAddress { inode: file, block: 9000 }),
    );
  }

  #[test]
  fn indirect_entry_out_of_range() {
    let mut builder = builder();
    let file = builder.create_file(ROOT_INO, "f", NDIRECT + 2).unwrap();
    let indirect = builder.inode(file).indirect();
    builder.write_address(indirect, 5, u32::MAX);

    assert_eq!(
      check_addresses(&volume(builder)),
      Err(Violation::BadIndirectAddress { inode: file, block: u32::MAX }),
    );
  }

  #[test]
  fn direct_pass_runs_before_indirect_pass() {
    let mut builder = builder();
    let first = builder.create_file(ROOT_INO, "first", NDIRECT + 1).unwrap();
    let second = builder.create_file(ROOT_INO, "second", 1).unwrap();
    let indirect = builder.inode(first).indirect();
    builder.write_address(indirect, 0, 600);
    let mut inode = builder.inode(second);
    inode.addrs[0] = 700;
    builder.set_inode(second, &inode);

    assert_eq!(
      check_addresses(&volume(builder)),
      Err(Violation::BadDirectAddress { inode: second, block: 700 }),
    );
  }

  #[test]
  fn root_not_a_directory() {
    let mut builder = builder();
    builder.set_kind(ROOT_INO, InodeType::File);

    assert!(matches!(check_root(&volume(builder)), Err(Violation::RootMissing { .. })));
  }

  #[test]
  fn inode_table_without_root() {
    let mut bytes = vec![0u8; 64 * BSIZE];
    let superblock = Superblock { size: 64, nblocks: 60, ninodes: 1, nlog: 0 };
    let offset = SUPERBLOCK_BLOCK as usize * BSIZE;
    bytes[offset..offset + Superblock::SIZE].copy_from_slice(&superblock.to_bytes());
    let volume = Volume::from_bytes(bytes).unwrap();

    assert_eq!(
      check_root(&volume),
      Err(Violation::RootMissing { reason: "inode table has no inode 1" }),
    );
    assert_eq!(run_all(&volume), check_root(&volume));
  }

  #[test]
  fn root_first_entry_not_self() {
    let mut builder = builder();
    let block = builder.inode(ROOT_INO).addrs[0];
    builder.write_entry(block, 0, &DirEntry::new(ROOT_INO as u16, "x"));

    assert!(matches!(check_root(&volume(builder)), Err(Violation::RootMissing { .. })));
  }

  #[test]
  fn root_self_entry_names_other_inode() {
    let mut builder = builder();
    let block = builder.inode(ROOT_INO).addrs[0];
    builder.write_entry(block, 0, &DirEntry::new(2, "."));

    assert!(matches!(check_root(&volume(builder)), Err(Violation::RootMissing { .. })));
  }

  #[test]
  fn root_parent_must_be_root() {
    let mut builder = builder();
    let dir = builder.mkdir(ROOT_INO, "d").unwrap();
    let block = builder.inode(ROOT_INO).addrs[0];
    builder.write_entry(block, 1, &DirEntry::new(dir as u16, ".."));

    assert!(matches!(check_directory_format(&volume(builder)), Err(Violation::RootMissing { .. })));
  }

  #[test]
  fn missing_self_entry() {
    let mut builder = builder();
    let dir = builder.mkdir(ROOT_INO, "d").unwrap();
    let block = builder.inode(dir).addrs[0];
    builder.write_entry(block, 0, &DirEntry::new(0, "."));

    assert_eq!(
      check_directory_format(&volume(builder)),
      Err(Violation::BadDirectoryFormat { inode: dir, reason: "missing '.'" }),
    );
  }

  #[test]
  fn self_entry_names_wrong_inode() {
    let mut builder = builder();
    let dir = builder.mkdir(ROOT_INO, "d").unwrap();
    let block = builder.inode(dir).addrs[0];
    builder.write_entry(block, 0, &DirEntry::new(ROOT_INO as u16, "."));

    assert!(matches!(
      check_directory_format(&volume(builder)),
      Err(Violation::BadDirectoryFormat { inode, .. }) if inode == dir
    ));
  }

  #[test]
  fn parent_entry_names_itself() {
    let mut builder = builder();
    let dir = builder.mkdir(ROOT_INO, "d").unwrap();
    let block = builder.inode(dir).addrs[0];
    builder.write_entry(block, 1, &DirEntry::new(dir as u16, ".."));

    assert_eq!(
      check_directory_format(&volume(builder)),
      Err(Violation::BadDirectoryFormat { inode: dir, reason: "'..' names the directory itself" }),
    );
  }

  #[test]
  fn duplicate_parent_entry() {
    let mut builder = builder();
    let dir = builder.mkdir(ROOT_INO, "d").unwrap();
    builder.add_entry(dir, "..", ROOT_INO).unwrap();

    assert_eq!(
      check_directory_format(&volume(builder)),
      Err(Violation::BadDirectoryFormat { inode: dir, reason: "duplicate '.' or '..'" }),
    );
  }

  #[test]
  fn entry_past_inode_table() {
    let mut builder = builder();
    builder.add_entry(ROOT_INO, "ghost", 64).unwrap();

    assert!(matches!(
      check_directory_format(&volume(builder)),
      Err(Violation::BadDirectoryFormat { inode: ROOT_INO, .. })
    ));
  }

  #[test]
  fn directory_entries_in_indirect_blocks_are_scanned() {
    let mut builder = builder();
    let dir = builder.mkdir(ROOT_INO, "big").unwrap();
    let file = builder.create_file(dir, "f", 0).unwrap();
    // ".", ".." and "f" plus these fill every direct block
    for index in 0..(NDIRECT * DPB - 3) {
      builder.add_entry(dir, &format!("l{index}"), file).unwrap();
    }
    assert_eq!(builder.inode(dir).indirect(), 0);
    builder.add_entry(dir, ".", dir).unwrap();

    assert_ne!(builder.inode(dir).indirect(), 0);
    assert_eq!(
      check_directory_format(&volume(builder)),
      Err(Violation::BadDirectoryFormat { inode: dir, reason: "duplicate '.' or '..'" }),
    );
  }

  #[test]
  fn used_block_marked_free() {
    let mut builder = builder();
    let file = builder.create_file(ROOT_INO, "f", 3).unwrap();
    let block = builder.inode(file).addrs[1];
    builder.set_allocated(block, false);

    assert_eq!(
      check_used_blocks_marked(&volume(builder)),
      Err(Violation::UsedBlockMarkedFree { inode: file, block }),
    );
  }

  #[test]
  fn indirect_block_itself_must_be_marked() {
    let mut builder = builder();
    let file = builder.create_file(ROOT_INO, "f", NDIRECT + 1).unwrap();
    let indirect = builder.inode(file).indirect();
    builder.set_allocated(indirect, false);

    assert_eq!(
      check_used_blocks_marked(&volume(builder)),
      Err(Violation::UsedBlockMarkedFree { inode: file, block: indirect }),
    );
  }

  #[test]
  fn blocks_behind_indirect_block_must_be_marked() {
    let mut builder = builder();
    let file = builder.create_file(ROOT_INO, "f", NDIRECT + 2).unwrap();
    let indirect = builder.inode(file).indirect();
    let block = builder.read_address(indirect, 1);
    assert_ne!(block, 0);
    builder.set_allocated(block, false);

    assert_eq!(
      check_used_blocks_marked(&volume(builder)),
      Err(Violation::UsedBlockMarkedFree { inode: file, block }),
    );
  }

  #[test]
  fn marked_block_not_in_use() {
    let mut builder = builder();
    let block = builder.geometry().size - 1;
    builder.set_allocated(block, true);

    assert_eq!(check_marked_blocks_used(&volume(builder)), Err(Violation::FreeBlockMarkedUsed { block }));
  }

  #[test]
  fn metadata_blocks_are_not_data() {
    let builder = builder();
    let geometry = *builder.geometry();
    let volume = volume(builder);

    assert!(volume.bitmap().is_allocated(geometry.bitmap_start));
    assert_eq!(check_marked_blocks_used(&volume), Ok(()));
  }

  #[test]
  fn shared_direct_block() {
    let mut builder = builder();
    let first = builder.create_file(ROOT_INO, "a", 2).unwrap();
    let second = builder.create_file(ROOT_INO, "b", 2).unwrap();
    let shared = builder.inode(first).addrs[0];
    let mut inode = builder.inode(second);
    inode.addrs[1] = shared;
    builder.set_inode(second, &inode);

    assert_eq!(
      check_direct_uniqueness(&volume(builder)),
      Err(Violation::DuplicateDirectAddress { inode: second, block: shared }),
    );
  }

  #[test]
  fn shared_indirect_block_entry() {
    let mut builder = builder();
    let first = builder.create_file(ROOT_INO, "a", NDIRECT + 2).unwrap();
    let second = builder.create_file(ROOT_INO, "b", NDIRECT + 2).unwrap();
    let first_indirect = builder.inode(first).indirect();
    let second_indirect = builder.inode(second).indirect();
    let shared = builder.read_address(first_indirect, 1);
    builder.write_address(second_indirect, 0, shared);

    let volume = volume(builder);
    assert_eq!(check_direct_uniqueness(&volume), Ok(()));
    assert_eq!(
      check_indirect_uniqueness(&volume),
      Err(Violation::DuplicateIndirectAddress { inode: second, block: shared }),
    );
  }
}

// vim:ts=2 sw=2
