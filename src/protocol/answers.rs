//! Bookkeeping for queries whose answers arrive asynchronously.

use std::collections::BTreeMap;

/// Default number of lines to wait for outstanding answers.
pub const DEFAULT_ANSWER_GUARD: u32 = 120;

/// Whether an answer line was expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerStatus {
  Expected,
  /// Nobody asked, or more answers than queries arrived.
  Unexpected,
}

/// Tracks outstanding queries.
///
/// While answers are pending the dispatcher holds back notifications. If
/// answers stop arriving the guard forgets them after a bounded number of
/// lines so notifications cannot starve.
#[derive(Debug, Clone)]
pub struct AnswerCoordinator {
  pending: BTreeMap<String, u32>,
  lines_waiting: u32,
  guard: u32,
}

impl AnswerCoordinator {
  pub fn new(guard: u32) -> Self {
    Self {
      pending: BTreeMap::new(),
      lines_waiting: 0,
      guard: guard.max(1),
    }
  }

  /// Answer names compare case-insensitively.
  fn key(name: &str) -> String {
    name.to_ascii_uppercase()
  }

  /// Record that an answer for `name` is expected.
  pub fn ask(&mut self, name: &str) {
    *self.pending.entry(Self::key(name)).or_insert(0) += 1;
    log::debug!("Query {} issued, {} pending", name, self.pending());
  }

  /// Number of answers still expected.
  pub fn pending(&self) -> u32 {
    self.pending.values().sum()
  }

  pub fn is_waiting(&self) -> bool {
    !self.pending.is_empty()
  }

  /// Account for an answer line.
  pub fn on_answer(&mut self, name: &str) -> AnswerStatus {
    let key = Self::key(name);
    let Some(count) = self.pending.get_mut(&key) else {
      log::warn!("Answer {} arrived but was never asked for", name);
      return AnswerStatus::Unexpected;
    };
    *count -= 1;
    if *count == 0 {
      self.pending.remove(&key);
    }
    if self.pending.is_empty() {
      self.lines_waiting = 0;
    }
    AnswerStatus::Expected
  }

  /// A query failed without saying which one. Forget one pending answer.
  pub fn on_failed_answer(&mut self) -> AnswerStatus {
    let Some(key) = self.pending.keys().next().cloned() else {
      log::warn!("Error answer arrived with nothing pending");
      return AnswerStatus::Unexpected;
    };
    log::debug!("Query {} failed", key);
    self.on_answer(&key)
  }

  /// Count a non-answer line. Returns true when the guard gave up waiting.
  pub fn on_other_line(&mut self) -> bool {
    if self.pending.is_empty() {
      return false;
    }
    self.lines_waiting += 1;
    if self.lines_waiting < self.guard {
      return false;
    }
    log::warn!(
      "No answer for {:?} after {} lines, giving up on them",
      self.pending.keys().collect::<Vec<_>>(),
      self.lines_waiting
    );
    self.reset();
    true
  }

  pub fn reset(&mut self) {
    self.pending.clear();
    self.lines_waiting = 0;
  }
}

impl Default for AnswerCoordinator {
  fn default() -> Self {
    Self::new(DEFAULT_ANSWER_GUARD)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_answers_decrement_pending() {
    let mut answers = AnswerCoordinator::default();
    answers.ask("switch_audio");
    answers.ask("length");
    assert_eq!(answers.pending(), 2);
    assert_eq!(answers.on_answer("SWITCH_AUDIO"), AnswerStatus::Expected);
    assert_eq!(answers.pending(), 1);
    assert_eq!(answers.on_answer("length"), AnswerStatus::Expected);
    assert!(!answers.is_waiting());
  }

  #[test]
  fn test_unexpected_answer_leaves_count_alone() {
    let mut answers = AnswerCoordinator::default();
    answers.ask("length");
    assert_eq!(answers.on_answer("switch_video"), AnswerStatus::Unexpected);
    assert_eq!(answers.pending(), 1);
    assert_eq!(answers.on_answer("length"), AnswerStatus::Expected);
    assert_eq!(answers.on_answer("length"), AnswerStatus::Unexpected);
    assert_eq!(answers.pending(), 0);
  }

  #[test]
  fn test_failed_answer_consumes_one_pending() {
    let mut answers = AnswerCoordinator::default();
    assert_eq!(answers.on_failed_answer(), AnswerStatus::Unexpected);
    answers.ask("switch_video");
    assert_eq!(answers.on_failed_answer(), AnswerStatus::Expected);
    assert!(!answers.is_waiting());
  }

  #[test]
  fn test_guard_resets_after_bounded_lines() {
    let mut answers = AnswerCoordinator::new(5);
    answers.ask("length");
    for _ in 0..4 {
      assert!(!answers.on_other_line());
      assert_eq!(answers.pending(), 1);
    }
    assert!(answers.on_other_line());
    assert_eq!(answers.pending(), 0);
    assert!(!answers.on_other_line());
  }
}
