//! Title boundary countdown.
//!
//! Crossing from one disc title into the next leaves MPlayer with stale
//! title, duration and track state. Close to the end of a title the session
//! quits on its own and reports end of file instead.

use std::time::{Duration, Instant};

/// Quit this long before the title ends.
pub const FIRE_MARGIN: Duration = Duration::from_millis(500);
/// Arm the timer once this many seconds remain.
pub const ARM_WINDOW: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TitleCountdown {
  #[default]
  Idle,
  Armed {
    deadline: Instant,
  },
  Fired,
}

impl TitleCountdown {
  /// Re-evaluate with `remaining` seconds left in the title. Returns true
  /// when the session should end now.
  pub fn arm(&mut self, remaining: f64, paused: bool, now: Instant) -> bool {
    if *self == TitleCountdown::Fired {
      return false;
    }
    if paused || !remaining.is_finite() {
      *self = TitleCountdown::Idle;
      return false;
    }
    let margin = FIRE_MARGIN.as_secs_f64();
    if remaining <= margin {
      *self = TitleCountdown::Fired;
      return true;
    }
    *self = if remaining <= ARM_WINDOW {
      TitleCountdown::Armed {
        deadline: now + Duration::from_secs_f64(remaining - margin),
      }
    } else {
      TitleCountdown::Idle
    };
    false
  }

  pub fn disarm(&mut self) {
    if let TitleCountdown::Armed { .. } = self {
      *self = TitleCountdown::Idle;
    }
  }

  pub fn deadline(&self) -> Option<Instant> {
    match self {
      TitleCountdown::Armed { deadline } => Some(*deadline),
      _ => None,
    }
  }

  /// Returns true when the armed deadline has passed.
  pub fn on_timer(&mut self, now: Instant) -> bool {
    match *self {
      TitleCountdown::Armed { deadline } if now >= deadline => {
        *self = TitleCountdown::Fired;
        true
      }
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fires_immediately_inside_margin() {
    let mut countdown = TitleCountdown::default();
    assert!(countdown.arm(0.4, false, Instant::now()));
    assert_eq!(countdown, TitleCountdown::Fired);
    assert!(!countdown.arm(0.1, false, Instant::now()));
  }

  #[test]
  fn test_arms_inside_window_and_fires_on_deadline() {
    let now = Instant::now();
    let mut countdown = TitleCountdown::default();
    assert!(!countdown.arm(30.0, false, now));
    assert_eq!(countdown.deadline(), None);

    assert!(!countdown.arm(3.0, false, now));
    let deadline = countdown.deadline().unwrap();
    assert_eq!(deadline, now + Duration::from_millis(2500));
    assert!(!countdown.on_timer(now + Duration::from_secs(1)));
    assert!(countdown.on_timer(deadline));
    assert_eq!(countdown, TitleCountdown::Fired);
  }

  #[test]
  fn test_pause_disarms() {
    let now = Instant::now();
    let mut countdown = TitleCountdown::default();
    countdown.arm(3.0, false, now);
    assert!(!countdown.arm(3.0, true, now));
    assert_eq!(countdown.deadline(), None);
  }
}
