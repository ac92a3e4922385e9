//! Offline consistency checking of xv6 filesystem images.

pub mod bitmap;
pub mod checker;
pub mod dir;
pub mod image;
pub mod inode;
pub mod layout;
pub mod mkfs;
pub mod refcount;
pub mod report;
pub mod rules;
pub mod violation;
pub mod volume;
pub mod walker;

use std::path::Path;

use thiserror::Error;
use tracing::info;

pub use checker::{check, Checker, Finding, Mode};
pub use image::ImageError;
pub use report::{Report, ReportFormat};
pub use violation::{Rule, Violation};
pub use volume::Volume;

#[derive(Debug, Error)]
pub enum FsckError {
  #[error(transparent)]
  Image(#[from] ImageError),
  #[error(transparent)]
  Violation(#[from] Violation),
}

/// How one run is configured. Built from command-line flags; there are no
/// configuration files.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckOptions {
  pub mode: Mode,
  pub report: ReportFormat,
  pub verbosity: u64,
}

/// Opens and checks the image at `path`, summarising every finding.
pub fn inspect(path: &Path, options: &CheckOptions) -> Result<Report, FsckError> {
  let volume = Volume::open(path)?;
  let findings = Checker::new(&volume, options.mode).run();
  let report = Report::new(&path.display().to_string(), &volume, options.mode, &findings);
  info!("{}", report.summary());

  Ok(report)
}

/// Opens the image at `path` and stops at the first violation.
pub fn check_path(path: &Path) -> Result<(), FsckError> {
  let volume = Volume::open(path)?;
  check(&volume)?;

  Ok(())
}


// vim:ts=2 sw=2
