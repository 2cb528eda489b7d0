//! Ordered line classification.
//!
//! A classifier is a priority-ordered list of `(pattern kind, regex)` rules.
//! The first matching rule wins, so specific shapes must come before the
//! catch-alls that would otherwise swallow them (`ID_VID_0_LANG=` before
//! `ID_<NAME>=`).

use regex::{Captures, Regex};
use std::fmt::Debug;
use std::str::FromStr;
use thiserror::Error;

/// A line matched a pattern but one of its fields was unusable.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LineError {
  #[error("Invalid {field} in line: {line}")]
  InvalidField { field: &'static str, line: String },
}

/// Priority-ordered line patterns.
pub struct Classifier<P> {
  rules: Vec<(P, Regex)>,
}

impl<P: Copy + Debug> Classifier<P> {
  /// Compile rules in priority order.
  pub fn new(rules: &[(P, &str)]) -> Result<Self, regex::Error> {
    let rules = rules
      .iter()
      .map(|(pattern, source)| Ok((*pattern, Regex::new(source)?)))
      .collect::<Result<Vec<_>, regex::Error>>()?;
    Ok(Self { rules })
  }

  /// First rule matching `line`.
  pub fn classify<'l>(&self, line: &'l str) -> Option<(P, Captures<'l>)> {
    self
      .rules
      .iter()
      .find_map(|(pattern, regex)| regex.captures(line).map(|caps| (*pattern, caps)))
  }

  /// Rule kinds in priority order.
  pub fn patterns(&self) -> impl Iterator<Item = P> + '_ {
    self.rules.iter().map(|(pattern, _)| *pattern)
  }
}

/// Capture group `index` as text, empty if the group did not participate.
pub fn text<'c>(caps: &'c Captures<'_>, index: usize) -> &'c str {
  caps.get(index).map_or("", |m| m.as_str())
}

/// Capture group `index` parsed as `T`.
pub fn field<T: FromStr>(caps: &Captures<'_>, index: usize, name: &'static str) -> Result<T, LineError> {
  text(caps, index).trim().parse().map_err(|_| LineError::InvalidField {
    field: name,
    line: text(caps, 0).to_string(),
  })
}

/// Capture group `index` parsed as seconds.
pub fn seconds(caps: &Captures<'_>, index: usize, name: &'static str) -> Result<f64, LineError> {
  super::timing::parse_seconds(text(caps, index)).ok_or_else(|| LineError::InvalidField {
    field: name,
    line: text(caps, 0).to_string(),
  })
}

/// `yes`/`no` flag as printed by mpv.
pub fn flag(caps: &Captures<'_>, index: usize) -> bool {
  text(caps, index) == "yes"
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  enum Shape {
    Specific,
    Generic,
  }

  #[test]
  fn test_first_matching_rule_wins() {
    let classifier = Classifier::new(&[
      (Shape::Specific, r"^ID_VID_(\d+)_(LANG|NAME)=(.*)$"),
      (Shape::Generic, r"^ID_([A-Z0-9_]+)=(.*)$"),
    ])
    .unwrap();

    let (shape, caps) = classifier.classify("ID_VID_0_LANG=en").unwrap();
    assert_eq!(shape, Shape::Specific);
    assert_eq!(text(&caps, 3), "en");

    let (shape, _) = classifier.classify("ID_LENGTH=12.00").unwrap();
    assert_eq!(shape, Shape::Generic);
    assert!(classifier.classify("unrelated").is_none());
  }

  #[test]
  fn test_field_errors_carry_line() {
    let classifier = Classifier::new(&[(Shape::Specific, r"^ID_AID_(\w+)_LANG=(.*)$")]).unwrap();
    let (_, caps) = classifier.classify("ID_AID_x_LANG=en").unwrap();
    let err = field::<i32>(&caps, 1, "audio id").unwrap_err();
    assert_eq!(
      err,
      LineError::InvalidField {
        field: "audio id",
        line: "ID_AID_x_LANG=en".into()
      }
    );
  }
}
