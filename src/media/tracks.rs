//! Track tables for video, audio and subtitle streams.
//!
//! Every mutation reports whether it changed anything so the dispatcher can
//! decide on notifications without diffing state itself.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Which kind of stream a track table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackKind {
  Video,
  Audio,
  Subtitle,
}

/// Where a subtitle track comes from.
///
/// MPlayer numbers each origin separately, so the origin is part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubtitleOrigin {
  /// Image subtitles muxed into the stream (vobsub).
  Embedded,
  /// Text or image subtitles reported by the demuxer.
  Demuxer,
  /// Subtitles loaded from an external file.
  File,
}

/// Key of a subtitle track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubtitleId {
  pub origin: SubtitleOrigin,
  pub id: i32,
}

impl SubtitleId {
  pub fn new(origin: SubtitleOrigin, id: i32) -> Self {
    Self { origin, id }
  }
}

/// Information about one track.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
  pub lang: String,
  pub name: String,
  /// External file the track was loaded from (subtitles only).
  pub filename: Option<PathBuf>,
}

impl TrackInfo {
  /// Human readable label, falling back from name to language.
  pub fn display_name(&self) -> &str {
    if !self.name.is_empty() {
      &self.name
    } else {
      &self.lang
    }
  }
}

/// Result of selecting a track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectOutcome {
  /// The id was unknown and an empty entry had to be created.
  pub added: bool,
  /// The selection differs from before.
  pub changed: bool,
}

/// Tracks of one kind, keyed by backend id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(bound = "K: Serialize")]
pub struct TrackTable<K> {
  #[serde(serialize_with = "serialize_entries")]
  tracks: BTreeMap<K, TrackInfo>,
  selected: Option<K>,
}

/// Struct keys are not valid JSON object keys, so tables serialize as a list.
fn serialize_entries<K: Serialize, S: Serializer>(
  tracks: &BTreeMap<K, TrackInfo>,
  serializer: S,
) -> Result<S::Ok, S::Error> {
  serializer.collect_seq(tracks.iter())
}

impl<K> Default for TrackTable<K> {
  fn default() -> Self {
    Self {
      tracks: BTreeMap::new(),
      selected: None,
    }
  }
}

impl<K: Ord + Copy> TrackTable<K> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.tracks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tracks.is_empty()
  }

  pub fn get(&self, id: K) -> Option<&TrackInfo> {
    self.tracks.get(&id)
  }

  pub fn contains(&self, id: K) -> bool {
    self.tracks.contains_key(&id)
  }

  /// Tracks in ascending id order.
  pub fn iter(&self) -> impl Iterator<Item = (K, &TrackInfo)> {
    self.tracks.iter().map(|(id, info)| (*id, info))
  }

  /// Currently selected id, `None` when nothing is selected.
  pub fn selected(&self) -> Option<K> {
    self.selected
  }

  /// Make sure a track exists. Returns true if it was created.
  pub fn ensure(&mut self, id: K) -> bool {
    if self.tracks.contains_key(&id) {
      return false;
    }
    self.tracks.insert(id, TrackInfo::default());
    true
  }

  /// Set the language of a track, creating it if needed.
  pub fn update_lang(&mut self, id: K, lang: &str) -> bool {
    let created = self.ensure(id);
    let track = self.tracks.entry(id).or_default();
    if track.lang == lang {
      return created;
    }
    track.lang = lang.to_string();
    true
  }

  /// Set the display name of a track, creating it if needed.
  pub fn update_name(&mut self, id: K, name: &str) -> bool {
    let created = self.ensure(id);
    let track = self.tracks.entry(id).or_default();
    if track.name == name {
      return created;
    }
    track.name = name.to_string();
    true
  }

  /// Set language and name at once.
  pub fn update(&mut self, id: K, lang: &str, name: &str) -> bool {
    let lang_changed = self.update_lang(id, lang);
    let name_changed = self.update_name(id, name);
    lang_changed || name_changed
  }

  /// Record the external file a track was loaded from.
  pub fn set_filename(&mut self, id: K, filename: PathBuf) -> bool {
    let created = self.ensure(id);
    let track = self.tracks.entry(id).or_default();
    if track.filename.as_ref() == Some(&filename) {
      return created;
    }
    track.filename = Some(filename);
    true
  }

  /// Select a track. Unknown ids get an empty entry so the selection always
  /// points into the table.
  pub fn select(&mut self, id: K) -> SelectOutcome {
    let added = self.ensure(id);
    let changed = self.selected != Some(id);
    self.selected = Some(id);
    SelectOutcome { added, changed }
  }

  /// Clear the selection.
  pub fn deselect(&mut self) -> bool {
    self.selected.take().is_some()
  }

  pub fn remove(&mut self, id: K) -> bool {
    if self.tracks.remove(&id).is_none() {
      return false;
    }
    if self.selected == Some(id) {
      self.selected = None;
    }
    true
  }

  /// Find the first track matching a predicate on its key.
  pub fn find(&self, mut pred: impl FnMut(K) -> bool) -> Option<K> {
    self.tracks.keys().copied().find(|id| pred(*id))
  }
}

impl TrackTable<SubtitleId> {
  /// Look up a subtitle by its raw backend id, ignoring the origin.
  pub fn find_by_raw_id(&self, id: i32) -> Option<SubtitleId> {
    self.find(|key| key.id == id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_update_is_idempotent() {
    let mut table = TrackTable::<i32>::new();
    assert!(table.update(1, "en", "English"));
    assert!(table.select(1).changed);

    let before = table.clone();
    assert!(!table.update(1, "en", "English"));
    assert!(!table.update_lang(1, "en"));
    assert!(!table.update_name(1, "English"));
    assert!(!table.select(1).changed);
    assert_eq!(table.get(1), before.get(1));
    assert_eq!(table.selected(), before.selected());
    assert_eq!(table.len(), 1);
  }

  #[test]
  fn test_select_unknown_inserts_entry() {
    let mut table = TrackTable::<i32>::new();
    let outcome = table.select(7);
    assert!(outcome.added);
    assert!(outcome.changed);
    assert!(table.contains(7));
    assert_eq!(table.selected(), Some(7));
  }

  #[test]
  fn test_remove_clears_selection() {
    let mut table = TrackTable::<i32>::new();
    table.update(3, "de", "");
    table.select(3);
    assert!(table.remove(3));
    assert_eq!(table.selected(), None);
    assert!(!table.remove(3));
  }

  #[test]
  fn test_non_contiguous_ids_are_ordered() {
    let mut table = TrackTable::<i32>::new();
    table.update_lang(9, "fr");
    table.update_lang(2, "en");
    table.update_lang(5, "es");
    let ids: Vec<i32> = table.iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec![2, 5, 9]);
  }

  #[test]
  fn test_subtitle_origins_do_not_collide() {
    let mut table = TrackTable::<SubtitleId>::new();
    table.update_lang(SubtitleId::new(SubtitleOrigin::Demuxer, 0), "en");
    table.set_filename(
      SubtitleId::new(SubtitleOrigin::File, 0),
      PathBuf::from("movie.srt"),
    );
    assert_eq!(table.len(), 2);
    assert_eq!(
      table.find_by_raw_id(0).map(|key| key.origin),
      Some(SubtitleOrigin::Demuxer)
    );
  }

  #[test]
  fn test_display_name_falls_back_to_lang() {
    let info = TrackInfo {
      lang: "ja".into(),
      ..Default::default()
    };
    assert_eq!(info.display_name(), "ja");
  }
}
