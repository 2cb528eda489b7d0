//! Time parsing and normalization shared by both backends.
//!
//! Backends report absolute stream timestamps. The shell only ever sees gui
//! time: zero-based, rollover corrected.

/// MPEG-TS presentation timestamps are 33 bits at 90 kHz.
pub const MPEGTS_ROLLOVER: f64 = 8_589_934_592.0 / 90_000.0;

/// Parse a number of seconds as printed by a backend.
///
/// Accepts a decimal comma, a leading sign and `[[hh:]mm:]ss` clock forms.
pub fn parse_seconds(text: &str) -> Option<f64> {
  let text = text.trim();
  if text.is_empty() {
    return None;
  }
  if text.contains(':') {
    return parse_clock(text);
  }
  let value: f64 = text.replace(',', ".").parse().ok()?;
  value.is_finite().then_some(value)
}

/// Parse `hh:mm:ss.fff` or `mm:ss.fff`.
pub fn parse_clock(text: &str) -> Option<f64> {
  let (negative, text) = match text.strip_prefix('-') {
    Some(rest) => (true, rest),
    None => (false, text),
  };
  let mut total = 0.0;
  let mut parts = 0;
  for part in text.split(':') {
    let value: f64 = part.replace(',', ".").parse().ok()?;
    total = total * 60.0 + value;
    parts += 1;
  }
  if parts > 3 {
    return None;
  }
  Some(if negative { -total } else { total })
}

/// CD timecode `mm:ss:ff` with 75 frames per second.
pub fn msf_to_seconds(msf: &str) -> Option<f64> {
  let mut fields = msf.trim().split(':');
  let minutes: u32 = fields.next()?.parse().ok()?;
  let seconds: u32 = fields.next()?.parse().ok()?;
  let frames: u32 = fields.next()?.parse().ok()?;
  if fields.next().is_some() {
    return None;
  }
  Some(f64::from(minutes) * 60.0 + f64::from(seconds) + f64::from(frames) / 75.0)
}

/// Backend timestamp to zero-based gui time.
pub fn to_gui_time(backend_time: f64, start_offset: f64) -> f64 {
  (backend_time - start_offset).max(0.0)
}

/// Gui time back to a backend timestamp.
pub fn to_backend_time(gui_time: f64, start_offset: f64) -> f64 {
  gui_time + start_offset
}

/// Detects timestamp wraparound and unwraps it.
#[derive(Debug, Clone)]
pub struct RolloverTracker {
  modulus: f64,
  threshold: f64,
  wraps: u32,
  last_raw: Option<f64>,
}

impl RolloverTracker {
  /// A jump of more than half the modulus counts as a wrap.
  pub fn new(modulus: f64) -> Self {
    Self {
      modulus,
      threshold: modulus / 2.0,
      wraps: 0,
      last_raw: None,
    }
  }

  pub fn mpegts() -> Self {
    Self::new(MPEGTS_ROLLOVER)
  }

  pub fn wraps(&self) -> u32 {
    self.wraps
  }

  /// Unwrap a raw timestamp.
  pub fn correct(&mut self, raw: f64) -> f64 {
    if let Some(last) = self.last_raw {
      if last - raw > self.threshold {
        self.wraps += 1;
        log::debug!("Timestamp rollover detected ({} -> {}), wraps={}", last, raw, self.wraps);
      } else if raw - last > self.threshold && self.wraps > 0 {
        self.wraps -= 1;
        log::debug!("Timestamp went back across rollover, wraps={}", self.wraps);
      }
    }
    self.last_raw = Some(raw);
    raw + f64::from(self.wraps) * self.modulus
  }

  /// Wrap an unwrapped timestamp again for sending to the backend.
  pub fn to_raw(&self, unwrapped: f64) -> f64 {
    if unwrapped >= self.modulus {
      unwrapped.rem_euclid(self.modulus)
    } else {
      unwrapped
    }
  }

  pub fn reset(&mut self) {
    self.wraps = 0;
    self.last_raw = None;
  }
}

/// Schedules periodic duration re-queries.
///
/// The first query happens after one second of playback, then the interval
/// grows fourfold after each query.
#[derive(Debug, Clone)]
pub struct DurationProbe {
  next_at: Option<f64>,
  interval: f64,
}

impl DurationProbe {
  const FIRST_INTERVAL: f64 = 1.0;
  const GROWTH: f64 = 4.0;

  pub fn new() -> Self {
    Self {
      next_at: Some(Self::FIRST_INTERVAL),
      interval: Self::FIRST_INTERVAL,
    }
  }

  /// Never fires. Used for backends that report duration themselves.
  pub fn disabled() -> Self {
    Self {
      next_at: None,
      interval: Self::FIRST_INTERVAL,
    }
  }

  /// Whether a query is due at `position`; advances the schedule if so.
  pub fn due(&mut self, position: f64) -> bool {
    match self.next_at {
      Some(next) if position >= next => {
        self.interval *= Self::GROWTH;
        self.next_at = Some(position + self.interval);
        true
      }
      _ => false,
    }
  }
}

impl Default for DurationProbe {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_seconds_forms() {
    assert_eq!(parse_seconds("12.5"), Some(12.5));
    assert_eq!(parse_seconds("12,5"), Some(12.5));
    assert_eq!(parse_seconds("-0.2"), Some(-0.2));
    assert_eq!(parse_seconds("1:02:03.5"), Some(3723.5));
    assert_eq!(parse_seconds("02:03"), Some(123.0));
    assert_eq!(parse_seconds("abc"), None);
    assert_eq!(parse_seconds(""), None);
    assert_eq!(parse_seconds("inf"), None);
  }

  #[test]
  fn test_msf() {
    assert_eq!(msf_to_seconds("03:20:00"), Some(200.0));
    assert_eq!(msf_to_seconds("00:01:75"), Some(2.0));
    assert_eq!(msf_to_seconds("bad"), None);
  }

  #[test]
  fn test_gui_backend_conversion() {
    assert_eq!(to_gui_time(1010.0, 1000.0), 10.0);
    assert_eq!(to_gui_time(999.9, 1000.0), 0.0);
    assert_eq!(to_backend_time(10.0, 1000.0), 1010.0);
  }

  #[test]
  fn test_rollover_keeps_position_non_negative() {
    let start = MPEGTS_ROLLOVER - 30.0;
    let mut tracker = RolloverTracker::mpegts();
    let mut raw = start;
    let mut last_gui = 0.0;
    for _ in 0..120 {
      raw += 0.5;
      if raw >= MPEGTS_ROLLOVER {
        raw -= MPEGTS_ROLLOVER;
      }
      let gui = to_gui_time(tracker.correct(raw), start);
      assert!(gui >= 0.0);
      assert!(gui >= last_gui);
      last_gui = gui;
    }
    assert_eq!(tracker.wraps(), 1);
    assert!((last_gui - 60.0).abs() < 1e-6);
  }

  #[test]
  fn test_rollover_to_raw() {
    let tracker = RolloverTracker::mpegts();
    let raw = tracker.to_raw(MPEGTS_ROLLOVER + 5.0);
    assert!((raw - 5.0).abs() < 1e-6);
    assert_eq!(tracker.to_raw(100.0), 100.0);
  }

  #[test]
  fn test_small_backward_seek_is_not_rollover() {
    let mut tracker = RolloverTracker::mpegts();
    tracker.correct(500.0);
    assert_eq!(tracker.correct(20.0), 20.0);
    assert_eq!(tracker.wraps(), 0);
  }

  #[test]
  fn test_duration_probe_backs_off() {
    let mut probe = DurationProbe::new();
    assert!(!probe.due(0.5));
    assert!(probe.due(1.0));
    assert!(!probe.due(4.0));
    assert!(probe.due(5.0));
    assert!(!probe.due(20.0));
    assert!(probe.due(21.0));

    let mut disabled = DurationProbe::disabled();
    assert!(!disabled.due(1000.0));
  }
}
