use tracing::{debug, trace};

use super::layout::*;
use super::volume::Volume;

/// inode number -> number of directory entries naming it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefCounts {
  counts: Vec<u32>,
}

impl RefCounts {
  pub fn new(ninodes: u32) -> Self {
    Self {
      counts: vec![0; ninodes as usize],
    }
  }

  /// Inode 0 and the root start with one reference each: the root is named by
  /// its own `.`/`..`, which the walk never counts.
  pub fn seeded(ninodes: u32) -> Self {
    let mut counts = Self::new(ninodes);
    counts.increment(RESERVED_INO);
    counts.increment(ROOT_INO);
    counts
  }

  pub fn get(&self, inum: InodeNo) -> u32 {
    self.counts.get(inum as usize).copied().unwrap_or(0)
  }

  pub fn len(&self) -> usize {
    self.counts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.counts.is_empty()
  }

  fn increment(&mut self, inum: InodeNo) {
    if let Some(count) = self.counts.get_mut(inum as usize) {
      *count = count.saturating_add(1);
    }
  }
}

/// Walks the tree from the root and counts every entry other than `.` and
/// `..`. Each directory is expanded once, however many entries name it.
pub fn walk(volume: &Volume) -> RefCounts {
  let inodes = volume.inodes();
  let ninodes = volume.geometry().ninodes;
  let mut counts = RefCounts::seeded(ninodes);
  let mut expanded = vec![false; ninodes as usize];
  let mut pending = vec![ROOT_INO];

  while let Some(dir) = pending.pop() {
    match expanded.get_mut(dir as usize) {
      Some(done) if !*done => *done = true,
      _ => continue,
    }
    let inode = match inodes.get(dir) {
      Some(inode) if inode.is_dir() => inode,
      _ => continue,
    };
    trace!(inode = dir, "expanding directory");

    for entry in volume.dir_entries(inode).into_iter().filter(|entry| entry.is_link_to_tree()) {
      let target = entry.target();
      if !volume.geometry().contains_inode(target) {
        continue;
      }

      counts.increment(target);
      if inodes.get(target).map_or(false, |child| child.is_dir()) {
        pending.push(target);
      }
    }
  }

  debug!(
    directories = expanded.iter().filter(|&&done| done).count(),
    "directory walk complete"
  );
  counts
}


// vim:ts=2 sw=2
