//! Disc titles and chapters.

use serde::Serialize;
use std::collections::BTreeMap;

/// Upper bound for an announced title count.
pub const MAX_TITLES: u32 = 999;

/// One chapter of a file or a disc title.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
  pub name: String,
  /// Start time in seconds.
  pub start: f64,
  /// End time in seconds, when the backend reports one.
  pub end: Option<f64>,
}

/// Chapters keyed by backend id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChapterTable {
  chapters: BTreeMap<u32, Chapter>,
}

impl ChapterTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.chapters.len()
  }

  pub fn is_empty(&self) -> bool {
    self.chapters.is_empty()
  }

  pub fn get(&self, id: u32) -> Option<&Chapter> {
    self.chapters.get(&id)
  }

  pub fn iter(&self) -> impl Iterator<Item = (u32, &Chapter)> {
    self.chapters.iter().map(|(id, chapter)| (*id, chapter))
  }

  fn entry(&mut self, id: u32) -> (bool, &mut Chapter) {
    let created = !self.chapters.contains_key(&id);
    (created, self.chapters.entry(id).or_default())
  }

  pub fn update_name(&mut self, id: u32, name: &str) -> bool {
    let (created, chapter) = self.entry(id);
    if chapter.name == name {
      return created;
    }
    chapter.name = name.to_string();
    true
  }

  pub fn update_start(&mut self, id: u32, start: f64) -> bool {
    let (created, chapter) = self.entry(id);
    if chapter.start == start {
      return created;
    }
    chapter.start = start;
    true
  }

  pub fn update_end(&mut self, id: u32, end: f64) -> bool {
    let (created, chapter) = self.entry(id);
    if chapter.end == Some(end) {
      return created;
    }
    chapter.end = Some(end);
    true
  }
}

/// A navigable unit of disc media.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleInfo {
  /// Length in seconds.
  pub duration: Option<f64>,
  pub chapter_count: u32,
  pub angle_count: u32,
  pub chapters: ChapterTable,
}

/// Disc titles plus the title-set bookkeeping some backends need.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleTable {
  titles: BTreeMap<u32, TitleInfo>,
  selected: Option<u32>,
  /// Number of video title sets on the disc.
  vts_count: Option<u32>,
  /// Title set the backend last reported as playing.
  selected_vts: Option<u32>,
}

impl TitleTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.titles.len()
  }

  pub fn is_empty(&self) -> bool {
    self.titles.is_empty()
  }

  pub fn get(&self, id: u32) -> Option<&TitleInfo> {
    self.titles.get(&id)
  }

  pub fn iter(&self) -> impl Iterator<Item = (u32, &TitleInfo)> {
    self.titles.iter().map(|(id, title)| (*id, title))
  }

  pub fn selected(&self) -> Option<u32> {
    self.selected
  }

  pub fn vts_count(&self) -> Option<u32> {
    self.vts_count
  }

  pub fn selected_vts(&self) -> Option<u32> {
    self.selected_vts
  }

  fn entry(&mut self, id: u32) -> (bool, &mut TitleInfo) {
    let created = !self.titles.contains_key(&id);
    (created, self.titles.entry(id).or_default())
  }

  /// Make sure a title exists. Returns true if it was created.
  pub fn ensure(&mut self, id: u32) -> bool {
    self.entry(id).0
  }

  /// Create titles `1..=count`. Counts above [`MAX_TITLES`] are clamped.
  pub fn ensure_count(&mut self, count: u32) -> bool {
    if count > MAX_TITLES {
      log::warn!("Ignoring titles beyond {} of {} announced", MAX_TITLES, count);
    }
    let mut created = false;
    for id in 1..=count.min(MAX_TITLES) {
      created |= self.ensure(id);
    }
    created
  }

  pub fn update_duration(&mut self, id: u32, duration: f64) -> bool {
    let (created, title) = self.entry(id);
    if title.duration == Some(duration) {
      return created;
    }
    title.duration = Some(duration);
    true
  }

  pub fn update_chapter_count(&mut self, id: u32, count: u32) -> bool {
    let (created, title) = self.entry(id);
    if title.chapter_count == count {
      return created;
    }
    title.chapter_count = count;
    true
  }

  pub fn update_angle_count(&mut self, id: u32, count: u32) -> bool {
    let (created, title) = self.entry(id);
    if title.angle_count == count {
      return created;
    }
    title.angle_count = count;
    true
  }

  /// Mutable access to a title's chapters, creating the title if needed.
  pub fn chapters_mut(&mut self, id: u32) -> &mut ChapterTable {
    &mut self.entry(id).1.chapters
  }

  pub fn select(&mut self, id: u32) -> bool {
    self.ensure(id);
    if self.selected == Some(id) {
      return false;
    }
    self.selected = Some(id);
    true
  }

  pub fn set_vts_count(&mut self, count: u32) -> bool {
    if self.vts_count == Some(count) {
      return false;
    }
    self.vts_count = Some(count);
    true
  }

  pub fn select_vts(&mut self, vts: u32) -> bool {
    if self.selected_vts == Some(vts) {
      return false;
    }
    self.selected_vts = Some(vts);
    true
  }

  /// Title whose length is closest to `duration`, within `tolerance` seconds.
  ///
  /// Titles sharing a length cannot be told apart; the lowest id wins.
  pub fn title_by_duration(&self, duration: f64, tolerance: f64) -> Option<u32> {
    let mut best: Option<(u32, f64)> = None;
    for (id, title) in &self.titles {
      let Some(length) = title.duration else {
        continue;
      };
      let diff = (length - duration).abs();
      if diff > tolerance {
        continue;
      }
      match best {
        Some((_, best_diff)) if best_diff <= diff => {}
        _ => best = Some((*id, diff)),
      }
    }
    best.map(|(id, _)| id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_title_updates_report_changes() {
    let mut titles = TitleTable::new();
    assert!(titles.update_duration(1, 120.5));
    assert!(!titles.update_duration(1, 120.5));
    assert!(titles.update_chapter_count(1, 12));
    assert!(!titles.update_chapter_count(1, 12));
    assert!(titles.update_angle_count(1, 1));
    assert!(titles.select(1));
    assert!(!titles.select(1));
    assert_eq!(titles.len(), 1);
  }

  #[test]
  fn test_title_by_duration_picks_closest() {
    let mut titles = TitleTable::new();
    titles.update_duration(1, 3600.0);
    titles.update_duration(2, 95.0);
    titles.update_duration(3, 95.6);
    assert_eq!(titles.title_by_duration(95.5, 1.0), Some(3));
    assert_eq!(titles.title_by_duration(3599.2, 1.0), Some(1));
    assert_eq!(titles.title_by_duration(500.0, 1.0), None);
  }

  #[test]
  fn test_title_by_duration_ambiguity_prefers_lowest_id() {
    let mut titles = TitleTable::new();
    titles.update_duration(4, 60.0);
    titles.update_duration(2, 60.0);
    assert_eq!(titles.title_by_duration(60.0, 0.5), Some(2));
  }

  #[test]
  fn test_title_count_is_clamped() {
    let mut titles = TitleTable::new();
    assert!(titles.ensure_count(3));
    assert!(!titles.ensure_count(3));
    assert_eq!(titles.len(), 3);

    assert!(titles.ensure_count(4_000_000_000));
    assert_eq!(titles.len(), MAX_TITLES as usize);
  }
}
