use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use serde::Serialize;

use super::checker::{Finding, Mode};
use super::image::Geometry;
use super::violation::Rule;
use super::volume::Volume;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
  /// One `ERROR:` line per violation on stderr
  Text,
  /// Full report on stdout
  Yaml,
}

impl Default for ReportFormat {
  fn default() -> Self {
    Self::Text
  }
}

impl FromStr for ReportFormat {
  type Err = String;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    match raw {
      "text" => Ok(Self::Text),
      "yaml" => Ok(Self::Yaml),
      other => Err(format!("unknown report format '{other}' (expected text or yaml)")),
    }
  }
}

impl fmt::Display for ReportFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Text => write!(f, "text"),
      Self::Yaml => write!(f, "yaml"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
  Passed,
  Failed,
  /// Not (fully) evaluated because an earlier rule stopped the run
  Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
  pub rule: u8,
  pub name: &'static str,
  pub status: RuleStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationRecord {
  pub rule: u8,
  pub message: String,
  pub detail: String,
}

/// Everything one run found out about one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
  pub image: String,
  pub sha256: String,
  pub geometry: Geometry,
  pub mode: &'static str,
  pub consistent: bool,
  pub rules: Vec<RuleOutcome>,
  pub violations: Vec<ViolationRecord>,
}

impl Report {
  pub fn new(image: &str, volume: &Volume, mode: Mode, findings: &[Finding]) -> Self {
    let first_failed = findings.iter().map(|finding| finding.rule).min();

    let rules = Rule::ALL
      .iter()
      .map(|&rule| RuleOutcome {
        rule: rule.number(),
        name: rule.name(),
        status: Self::status(rule, mode, first_failed, findings),
      })
      .collect();

    let violations = findings
      .iter()
      .map(|finding| ViolationRecord {
        rule: finding.rule.number(),
        message: finding.violation.to_string(),
        detail: finding.violation.detail(),
      })
      .collect();

    Self {
      image: image.to_owned(),
      sha256: volume.view().sha256(),
      geometry: *volume.geometry(),
      mode: match mode {
        Mode::FailFast => "fail-fast",
        Mode::Aggregate => "aggregate",
      },
      consistent: findings.is_empty(),
      rules,
      violations,
    }
  }

  fn status(rule: Rule, mode: Mode, first_failed: Option<Rule>, findings: &[Finding]) -> RuleStatus {
    if findings.iter().any(|finding| finding.rule == rule) {
      return RuleStatus::Failed;
    }

    match (mode, first_failed) {
      (Mode::Aggregate, _) | (_, None) => RuleStatus::Passed,
      // Reference-count rules share one loop over the inodes
      (Mode::FailFast, Some(failed)) if failed.needs_reference_counts() && rule.needs_reference_counts() => {
        RuleStatus::Skipped
      },
      (Mode::FailFast, Some(failed)) if rule < failed => RuleStatus::Passed,
      (Mode::FailFast, Some(_)) => RuleStatus::Skipped,
    }
  }

  pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(self)
  }

  /// The `ERROR:` lines the text format prints.
  pub fn diagnostics(&self) -> Vec<String> {
    self
      .violations
      .iter()
      .map(|record| format!("ERROR: {}", record.message))
      .collect()
  }

  pub fn summary(&self) -> String {
    if self.consistent {
      return format!("{}: consistent", self.image);
    }

    let failed = self
      .violations
      .iter()
      .map(|record| record.rule)
      .sorted()
      .dedup()
      .join(", ");
    format!("{}: {} violation(s) in rule(s) {failed}", self.image, self.violations.len())
  }
}


// vim:ts=2 sw=2
