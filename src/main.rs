use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use fcheck::fsck::{self, CheckOptions, FsckError, ImageError, Mode, ReportFormat};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// Checks an xv6 filesystem image for consistency
#[derive(Debug, Parser)]
#[clap(name = "fcheck", version)]
struct BinArgs {
  /// Run every rule and print every violation
  #[clap(short, long, takes_value = false)]
  all: bool,

  /// Output format: text or yaml
  #[clap(long, default_value_t = ReportFormat::Text)]
  report: ReportFormat,

  /// Raise log verbosity (repeatable)
  #[clap(short, long, parse(from_occurrences))]
  verbose: u64,

  image: PathBuf,
}

impl BinArgs {
  fn options(&self) -> CheckOptions {
    CheckOptions {
      mode: if self.all { Mode::Aggregate } else { Mode::FailFast },
      report: self.report,
      verbosity: self.verbose,
    }
  }
}

fn init_logging(verbosity: u64) {
  let level = match verbosity {
    0 => LevelFilter::OFF,
    1 => LevelFilter::INFO,
    2 => LevelFilter::DEBUG,
    _ => LevelFilter::TRACE,
  };

  tracing_subscriber::fmt()
    .with_max_level(level)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(args: BinArgs) -> u8 {
  let options = args.options();
  let report = match fsck::inspect(&args.image, &options) {
    Ok(report) => report,
    Err(FsckError::Image(ImageError::NotFound { .. })) => {
      eprintln!("image not found");
      return EXIT_FAILURE;
    },
    Err(error) => {
      eprintln!("ERROR: {error}");
      return EXIT_FAILURE;
    },
  };

  match options.report {
    ReportFormat::Text => {
      for line in report.diagnostics() {
        eprintln!("{line}");
      }
    },
    ReportFormat::Yaml => match report.to_yaml() {
      Ok(yaml) => print!("{yaml}"),
      Err(error) => {
        eprintln!("ERROR: cannot render report: {error}");
        return EXIT_FAILURE;
      },
    },
  }

  if report.consistent {
    EXIT_SUCCESS
  } else {
    EXIT_FAILURE
  }
}

pub fn main() -> ExitCode {
  let args = match BinArgs::try_parse() {
    Ok(args) => args,
    Err(error) => {
      // --help and --version land here too and go to stdout
      let _ = error.print();
      return ExitCode::from(if error.use_stderr() { EXIT_FAILURE } else { EXIT_SUCCESS });
    },
  };

  init_logging(args.options().verbosity);
  ExitCode::from(run(args))
}

// vim:ts=2 sw=2
