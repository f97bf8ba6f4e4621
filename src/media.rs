//! Collaborator interfaces for the media outputs the controller drives.
//!
//! The controller never decodes, mixes or synthesises anything itself; it only
//! issues these calls and polls these signals once per refresh.

use anyhow::Result;
use image::RgbaImage;
use std::sync::Arc;

use crate::constants::constants;

/// A seekable, clocked media output (video picture or audio track).
pub trait MediaTrack {
  fn play(&mut self);
  fn pause(&mut self);
  fn seek(&mut self, secs: f64);
  fn current_time(&self) -> f64;
  fn duration(&self) -> f64;
  fn set_volume(&mut self, level: f32);
  /// True exactly once after playback runs off the end of the media.
  fn take_ended(&mut self) -> bool;
}

/// A media track that also exposes the decoded picture at its current position.
pub trait VideoSource: MediaTrack {
  /// RGBA snapshot of the current frame, or `None` while no frame is decoded yet.
  fn snapshot(&mut self) -> Option<Arc<RgbaImage>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
  pub name: String,
  /// BCP-47-ish language tag as reported by the engine, e.g. `en-US` or `en_GB`.
  pub lang: String,
}

/// Prefer the first English voice, else the first voice at all.
pub fn pick_voice(voices: &[Voice]) -> Option<Voice> {
  voices.iter().find(|v| v.lang.to_lowercase().starts_with("en")).or_else(|| voices.first()).cloned()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechOptions {
  /// 1.0 is the engine's normal speaking rate.
  pub rate: f32,
  /// 1.0 is the engine's normal pitch.
  pub pitch: f32,
  /// 0.0..=1.0
  pub volume: f32,
  pub voice: Option<Voice>,
}

impl Default for SpeechOptions {
  fn default() -> Self {
    let c = constants();
    Self { rate: c.speech_rate, pitch: c.speech_pitch, volume: c.speech_volume, voice: None }
  }
}

/// Identifies one speak request; completions for older tokens are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtteranceToken(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
  Ended,
  Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechEvent {
  pub token: UtteranceToken,
  pub outcome: SpeechOutcome,
}

/// Text-to-speech output. At most one utterance is audible at a time.
pub trait SpeechSynth {
  /// Start speaking `text`. Implementations cancel any outstanding utterance first.
  fn speak(&mut self, text: &str, options: &SpeechOptions) -> Result<UtteranceToken>;
  fn cancel(&mut self);
  fn pause(&mut self);
  fn resume(&mut self);
  fn voices(&self) -> Vec<Voice>;
  /// Completions observed since the last poll.
  fn poll_events(&mut self) -> Vec<SpeechEvent>;
}
