//! Progress bar geometry for the paused video view.
//!
//! The bar spans the middle 80% of the drawing area at 90% of its height.
//! Coordinates are terminal cells as `f64`, so pointer hits can be tested
//! against the handle's radius.

use ratatui::layout::Rect;

use crate::constants::constants;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBar {
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub handle_radius: f64,
}

impl ProgressBar {
  pub fn layout(area: Rect) -> Self {
    let (w, h) = (f64::from(area.width), f64::from(area.height));
    Self {
      x: f64::from(area.x) + (w * 0.1).floor(),
      y: f64::from(area.y) + (h * 0.9).floor(),
      width: (w * 0.8).floor().max(1.0),
      handle_radius: f64::from(constants().progress_handle_radius),
    }
  }

  /// Handle centre for a playback fraction.
  pub fn handle_x(&self, progress: f64) -> f64 {
    self.x + progress.clamp(0.0, 1.0) * self.width
  }

  /// True when the pointer lies within the handle radius.
  pub fn hit_handle(&self, px: f64, py: f64, progress: f64) -> bool {
    let dx = px - self.handle_x(progress);
    let dy = py - self.y;
    (dx * dx + dy * dy).sqrt() <= self.handle_radius
  }

  /// Playback fraction under pointer column `px`, clamped to the bar.
  pub fn fraction_at(&self, px: f64) -> f64 {
    ((px - self.x) / self.width).clamp(0.0, 1.0)
  }

  /// Cell rectangle covered by the bar track.
  pub fn track_rect(&self) -> Rect {
    Rect::new(self.x as u16, self.y as u16, self.width as u16, 1)
  }
}

/// `M:SS` from seconds, flooring fractions. Negative or non-finite input reads as zero.
pub fn format_time(secs: f64) -> String {
  let total = if secs.is_finite() && secs > 0.0 { secs.floor() as u64 } else { 0 };
  format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bar() -> ProgressBar {
    ProgressBar::layout(Rect::new(0, 0, 100, 40))
  }

  #[test]
  fn layout_matches_proportions() {
    let b = bar();
    assert_eq!(b.x, 10.0);
    assert_eq!(b.y, 36.0);
    assert_eq!(b.width, 80.0);
    assert_eq!(b.track_rect(), Rect::new(10, 36, 80, 1));
  }

  #[test]
  fn layout_offsets_by_area_origin() {
    let b = ProgressBar::layout(Rect::new(5, 2, 50, 20));
    assert_eq!(b.x, 10.0);
    assert_eq!(b.y, 20.0);
    assert_eq!(b.width, 40.0);
  }

  #[test]
  fn handle_follows_progress() {
    let b = bar();
    assert_eq!(b.handle_x(0.0), 10.0);
    assert_eq!(b.handle_x(0.5), 50.0);
    assert_eq!(b.handle_x(2.0), 90.0);
  }

  #[test]
  fn hit_test_uses_radius() {
    let b = bar();
    assert!(b.hit_handle(50.0, 36.0, 0.5));
    assert!(b.hit_handle(51.0, 37.0, 0.5));
    assert!(!b.hit_handle(53.0, 36.0, 0.5));
    assert!(!b.hit_handle(50.0, 30.0, 0.5));
  }

  #[test]
  fn fraction_is_clamped() {
    let b = bar();
    assert_eq!(b.fraction_at(30.0), 0.25);
    assert_eq!(b.fraction_at(0.0), 0.0);
    assert_eq!(b.fraction_at(200.0), 1.0);
  }

  #[test]
  fn format_time_pads_seconds() {
    assert_eq!(format_time(0.0), "0:00");
    assert_eq!(format_time(65.9), "1:05");
    assert_eq!(format_time(600.0), "10:00");
    assert_eq!(format_time(-3.0), "0:00");
    assert_eq!(format_time(f64::NAN), "0:00");
  }
}
