//! Application constants loaded from `constants.ron` at compile time.
//!
//! Embedded with `include_str!` and parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Glyph grid
  pub sample_stride: u32,
  pub font_size_min: f32,
  pub font_size_max: f32,
  pub highlight_rgb: (u8, u8, u8),

  // Refresh loop
  pub refresh_fps: u32,

  // Playback
  pub music_volume: f32,
  pub end_message_ms: u64,
  pub progress_handle_radius: f32,

  // Speech
  pub speech_rate: f32,
  pub speech_pitch: f32,
  pub speech_volume: f32,

  // Highlight persistence
  pub highlight_store_key: String,

  // Frame extraction
  pub frame_extract_fps: f64,
  pub frame_extract_width: u32,

  // Status line
  pub error_dismiss_secs: u64,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed the constants test fails.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
