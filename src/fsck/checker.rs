use tracing::debug;

use super::layout::ROOT_INO;
use super::refcount::REFERENCE_RULES;
use super::rules::STRUCTURAL_RULES;
use super::violation::{Rule, Violation};
use super::volume::Volume;
use super::walker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  /// Stop at the first violation
  FailFast,
  /// Run every rule and collect what fires
  Aggregate,
}

impl Default for Mode {
  fn default() -> Self {
    Self::FailFast
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
  pub rule: Rule,
  pub violation: Violation,
}

#[derive(Debug)]
pub struct Checker<'a> {
  volume: &'a Volume,
  mode: Mode,
}

impl<'a> Checker<'a> {
  pub fn new(volume: &'a Volume, mode: Mode) -> Self {
    Self { volume, mode }
  }

  /// Runs the structural passes, then the walk, then the reference-count
  /// rules. In fail-fast mode at most one finding comes back.
  pub fn run(&self) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (rule, check) in STRUCTURAL_RULES {
      debug!(rule = rule.number(), name = rule.name(), "running structural pass");
      if let Err(violation) = check(self.volume) {
        if self.record(&mut findings, rule, violation) {
          return findings;
        }
      }
    }

    let counts = walker::walk(self.volume);
    debug!(rules = REFERENCE_RULES.len(), "checking reference counts");

    for (inum, inode) in self.volume.inodes().iter().skip(ROOT_INO as usize) {
      let references = counts.get(inum);
      for (rule, check) in REFERENCE_RULES {
        if let Err(violation) = check(inum, inode, references) {
          if self.record(&mut findings, rule, violation) {
            return findings;
          }
        }
      }
    }

    findings
  }

  /// Returns whether checking should stop.
  fn record(&self, findings: &mut Vec<Finding>, rule: Rule, violation: Violation) -> bool {
    debug!(rule = rule.number(), detail = %violation.detail(), "{violation}");
    findings.push(Finding { rule, violation });

    self.mode == Mode::FailFast
  }
}

/// First-fault check of an already opened volume.
pub fn check(volume: &Volume) -> Result<(), Violation> {
  match Checker::new(volume, Mode::FailFast).run().into_iter().next() {
    Some(finding) => Err(finding.violation),
    None => Ok(()),
  }
}


// vim:ts=2 sw=2
