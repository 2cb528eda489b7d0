//! Frame back-step emulation.
//!
//! Backends without a native back-step seek to `origin - step` while paused
//! and look at the next reported position. Keyframe-aligned seeks often land
//! at or after the origin, so the offset doubles on each retry until the
//! position lands before the target or the floor is reached.

/// Step used when the frame rate is unknown or implausible.
pub const FALLBACK_STEP: f64 = 0.1;
/// Frame rates above this are treated as bogus.
pub const MAX_PLAUSIBLE_FPS: f64 = 70.0;
/// Seeks issued for one back-step before giving up.
pub const MAX_ATTEMPTS: u32 = 8;

const TOLERANCE: f64 = 0.001;

/// Duration of one frame at `fps`.
pub fn frame_duration(fps: f64) -> f64 {
  if fps > 0.0 && fps <= MAX_PLAUSIBLE_FPS {
    1.0 / fps
  } else {
    FALLBACK_STEP
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BackStep {
  #[default]
  Idle,
  /// A seek was sent; the next status line decides whether to retry.
  AwaitingRetry {
    origin: f64,
    target: f64,
    step: f64,
    attempt: u32,
  },
  Done,
}

impl BackStep {
  /// Start a back-step from `origin`. Returns the first seek target.
  pub fn start(&mut self, origin: f64, fps: f64, floor: f64) -> Option<f64> {
    if origin <= floor {
      log::debug!("Already at {:.3}s, nothing to step back to", origin);
      *self = BackStep::Done;
      return None;
    }
    let step = frame_duration(fps);
    let target = (origin - step).max(floor);
    *self = if target <= floor {
      BackStep::Done
    } else {
      BackStep::AwaitingRetry {
        origin,
        target,
        step,
        attempt: 1,
      }
    };
    Some(target)
  }

  /// Feed a reported position. Returns the next seek target, if any.
  pub fn on_status(&mut self, reported: f64, paused: bool, floor: f64) -> Option<f64> {
    let BackStep::AwaitingRetry {
      origin,
      target,
      step,
      attempt,
    } = *self
    else {
      return None;
    };

    if !paused {
      log::debug!("Playback resumed, abandoning frame back-step");
      *self = BackStep::Idle;
      return None;
    }
    if reported < target + TOLERANCE {
      *self = BackStep::Done;
      return None;
    }
    if attempt >= MAX_ATTEMPTS {
      log::warn!(
        "Frame back-step from {:.3}s stuck at {:.3}s after {} seeks",
        origin,
        reported,
        attempt
      );
      *self = BackStep::Done;
      return None;
    }

    let attempt = attempt + 1;
    let offset = step * f64::from(1u32 << (attempt - 1));
    let next = (origin - offset).max(floor);
    if next <= floor {
      *self = BackStep::Done;
      return Some(floor);
    }
    log::debug!("Back-step landed at {:.3}s, retrying at {:.3}s", reported, next);
    *self = BackStep::AwaitingRetry {
      origin,
      target: next,
      step,
      attempt,
    };
    Some(next)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
  }

  #[test]
  fn test_frame_duration() {
    assert!(close(frame_duration(25.0), 0.04));
    assert_eq!(frame_duration(0.0), FALLBACK_STEP);
    assert_eq!(frame_duration(1000.0), FALLBACK_STEP);
  }

  #[test]
  fn test_offset_doubles_until_position_drops() {
    let mut state = BackStep::default();
    let first = state.start(10.0, 25.0, 0.0).unwrap();
    assert!(close(first, 9.96));

    // keyframe snapped back to the origin
    let second = state.on_status(10.0, true, 0.0).unwrap();
    assert!(close(second, 9.92));
    let third = state.on_status(10.0, true, 0.0).unwrap();
    assert!(close(third, 9.84));

    assert_eq!(state.on_status(9.8, true, 0.0), None);
    assert_eq!(state, BackStep::Done);
  }

  #[test]
  fn test_clamps_to_floor_and_finishes() {
    let mut state = BackStep::default();
    assert_eq!(state.start(0.05, 25.0, 0.0).map(|t| close(t, 0.01)), Some(true));
    assert_eq!(state.on_status(0.05, true, 0.0), Some(0.0));
    assert_eq!(state, BackStep::Done);

    let mut state = BackStep::default();
    assert_eq!(state.start(0.0, 25.0, 0.0), None);
  }

  #[test]
  fn test_unpause_abandons() {
    let mut state = BackStep::default();
    state.start(10.0, 25.0, 0.0);
    assert_eq!(state.on_status(10.0, false, 0.0), None);
    assert_eq!(state, BackStep::Idle);
  }

  #[test]
  fn test_gives_up_after_max_attempts() {
    let mut state = BackStep::default();
    state.start(100.0, 25.0, 0.0);
    let mut seeks = 1;
    while state.on_status(100.0, true, 0.0).is_some() {
      seeks += 1;
    }
    assert_eq!(seeks, MAX_ATTEMPTS);
    assert_eq!(state, BackStep::Done);
  }
}
