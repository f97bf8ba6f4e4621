//! Wall-clock playback position for locally driven media.
//!
//! The position is kept as a baseline plus an optional running anchor, so
//! reading it never requires a tick from the caller.

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PlaybackClock {
  /// Position accumulated up to `anchor` (or the frozen position while paused).
  baseline_secs: f64,
  anchor: Option<Instant>,
  duration_secs: f64,
  ended_reported: bool,
}

impl PlaybackClock {
  pub fn new(duration_secs: f64) -> Self {
    Self { baseline_secs: 0.0, anchor: None, duration_secs: duration_secs.max(0.0), ended_reported: false }
  }

  pub fn duration(&self) -> f64 {
    self.duration_secs
  }

  pub fn is_running(&self) -> bool {
    self.anchor.is_some()
  }

  pub fn position_at(&self, now: Instant) -> f64 {
    let raw = match self.anchor {
      Some(anchor) => self.baseline_secs + now.saturating_duration_since(anchor).as_secs_f64(),
      None => self.baseline_secs,
    };
    raw.min(self.duration_secs)
  }

  pub fn play_at(&mut self, now: Instant) {
    if self.anchor.is_none() {
      if self.baseline_secs >= self.duration_secs {
        self.baseline_secs = 0.0;
      }
      self.anchor = Some(now);
      self.ended_reported = false;
    }
  }

  pub fn pause_at(&mut self, now: Instant) {
    if self.anchor.is_some() {
      self.baseline_secs = self.position_at(now);
      self.anchor = None;
    }
  }

  pub fn seek_at(&mut self, secs: f64, now: Instant) {
    self.baseline_secs = secs.clamp(0.0, self.duration_secs);
    if self.anchor.is_some() {
      self.anchor = Some(now);
    }
    self.ended_reported = false;
  }

  /// Reports the end of media once per run; the clock stops at the end.
  pub fn take_ended_at(&mut self, now: Instant) -> bool {
    if self.ended_reported || !self.is_running() || self.duration_secs <= 0.0 {
      return false;
    }
    if self.position_at(now) >= self.duration_secs {
      self.pause_at(now);
      self.ended_reported = true;
      return true;
    }
    false
  }

  pub fn position(&self) -> f64 {
    self.position_at(Instant::now())
  }

  pub fn play(&mut self) {
    self.play_at(Instant::now());
  }

  pub fn pause(&mut self) {
    self.pause_at(Instant::now());
  }

  pub fn seek(&mut self, secs: f64) {
    self.seek_at(secs, Instant::now());
  }

  pub fn take_ended(&mut self) -> bool {
    self.take_ended_at(Instant::now())
  }
}
