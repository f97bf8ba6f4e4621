//! Playback state machine.
//!
//! Transitions are a pure function of `(state, event)` producing the next
//! state plus a list of [`Command`]s. [`PlaybackController`] owns the state and
//! the collaborators, applies the commands, and hands UI-facing [`Notice`]s
//! back to the caller.

use image::RgbaImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::media::{MediaTrack, SpeechOptions, SpeechOutcome, SpeechSynth, UtteranceToken, VideoSource, pick_voice};
use crate::segments::SegmentIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
  Menu,
  Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
  /// Video with its music track audible.
  #[default]
  MusicVideo,
  /// Muted video with caption segments read aloud.
  Narration,
}

impl PlaybackMode {
  pub fn label(self) -> &'static str {
    match self {
      PlaybackMode::MusicVideo => "MV",
      PlaybackMode::Narration => "NARRATION",
    }
  }

  pub fn toggled(self) -> Self {
    match self {
      PlaybackMode::MusicVideo => PlaybackMode::Narration,
      PlaybackMode::Narration => PlaybackMode::MusicVideo,
    }
  }

  pub fn config_name(self) -> &'static str {
    match self {
      PlaybackMode::MusicVideo => "mv",
      PlaybackMode::Narration => "narration",
    }
  }

  pub fn from_config(s: &str) -> Self {
    match s.to_lowercase().as_str() {
      "narration" => PlaybackMode::Narration,
      _ => PlaybackMode::MusicVideo,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
  pub view: ViewMode,
  pub mode: PlaybackMode,
  pub paused: bool,
  /// Always a valid index into the caption segments.
  pub current_segment: usize,
  /// A progress-bar drag is in progress.
  pub scrubbing: bool,
  /// Narration session active (set on narrated start, cleared on stop).
  pub narrating: bool,
  /// Last seek target during the current drag; equal targets are not re-sent.
  pub last_scrub_secs: Option<f64>,
}

impl PlaybackState {
  pub fn new(mode: PlaybackMode) -> Self {
    Self {
      view: ViewMode::Menu,
      mode,
      paused: false,
      current_segment: 0,
      scrubbing: false,
      narrating: false,
      last_scrub_secs: None,
    }
  }

  /// The search panel shows in the menu and whenever video playback is paused.
  pub fn search_visible(&self) -> bool {
    self.view == ViewMode::Menu || self.paused
  }

  pub fn progress_bar_visible(&self) -> bool {
    self.view == ViewMode::Video && self.paused
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
  Start,
  TogglePause,
  SwitchMode,
  ScrubBegin,
  /// Seek to `fraction` (clamped to 0..=1) of the video duration.
  Scrub { fraction: f64 },
  ScrubEnd,
  VideoEnded,
  /// Refresh with the live video clock.
  Tick { time_secs: f64 },
}

/// Read-only inputs a transition may consult.
pub struct TransitionContext<'a> {
  pub segments: &'a SegmentIndex,
  pub duration_secs: f64,
  pub music_volume: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
  Video,
  Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
  PlaybackEnded,
  ModeSwitched(PlaybackMode),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
  Play(Output),
  Pause(Output),
  Seek(Output, f64),
  Volume(Output, f32),
  /// Cancel any utterance and read the given segment from its start.
  Speak { segment: usize },
  PauseSpeech,
  ResumeSpeech,
  CancelSpeech,
  Notify(Notice),
}

/// Compute the next state and the side effects for `event`.
pub fn transition(state: &PlaybackState, event: Event, ctx: &TransitionContext<'_>) -> (PlaybackState, Vec<Command>) {
  let mut next = state.clone();
  let mut cmds = Vec::new();
  match event {
    Event::Start => start(&mut next, &mut cmds, ctx),
    Event::TogglePause => toggle_pause(&mut next, &mut cmds),
    Event::SwitchMode => switch_mode(&mut next, &mut cmds),
    Event::ScrubBegin => {
      if next.progress_bar_visible() {
        next.scrubbing = true;
        next.last_scrub_secs = None;
      }
    }
    Event::Scrub { fraction } => scrub(&mut next, &mut cmds, fraction, ctx),
    Event::ScrubEnd => {
      next.scrubbing = false;
      next.last_scrub_secs = None;
    }
    Event::VideoEnded => video_ended(&mut next, &mut cmds),
    Event::Tick { time_secs } => tick(&mut next, &mut cmds, time_secs, ctx),
  }
  (next, cmds)
}

fn start(next: &mut PlaybackState, cmds: &mut Vec<Command>, ctx: &TransitionContext<'_>) {
  if next.view == ViewMode::Video {
    debug!("playback: start ignored, already playing");
    return;
  }
  next.view = ViewMode::Video;
  next.current_segment = 0;
  next.paused = false;
  next.scrubbing = false;
  next.last_scrub_secs = None;
  cmds.push(Command::Seek(Output::Video, 0.0));
  cmds.push(Command::Seek(Output::Audio, 0.0));
  cmds.push(Command::Play(Output::Video));
  cmds.push(Command::Volume(Output::Video, 0.0));

  match next.mode {
    PlaybackMode::MusicVideo => {
      cmds.push(Command::Play(Output::Audio));
      cmds.push(Command::Volume(Output::Audio, ctx.music_volume));
    }
    PlaybackMode::Narration => {
      cmds.push(Command::Pause(Output::Audio));
      next.narrating = true;
      cmds.push(Command::Speak { segment: next.current_segment });
    }
  }

  // Playback always opens paused on its first frame.
  toggle_pause(next, cmds);
}

fn toggle_pause(next: &mut PlaybackState, cmds: &mut Vec<Command>) {
  if next.view != ViewMode::Video {
    debug!("playback: pause toggle ignored in menu");
    return;
  }
  next.paused = !next.paused;

  if next.paused {
    cmds.push(Command::Pause(Output::Video));
    match next.mode {
      PlaybackMode::MusicVideo => cmds.push(Command::Pause(Output::Audio)),
      PlaybackMode::Narration => cmds.push(Command::PauseSpeech),
    }
  } else {
    next.scrubbing = false;
    next.last_scrub_secs = None;
    cmds.push(Command::Play(Output::Video));
    match next.mode {
      PlaybackMode::MusicVideo => cmds.push(Command::Play(Output::Audio)),
      PlaybackMode::Narration => {
        cmds.push(Command::ResumeSpeech);
        if next.narrating {
          cmds.push(Command::Speak { segment: next.current_segment });
        }
      }
    }
  }
}

fn stop_outputs(cmds: &mut Vec<Command>) {
  cmds.push(Command::Pause(Output::Video));
  cmds.push(Command::Pause(Output::Audio));
  cmds.push(Command::CancelSpeech);
}

fn switch_mode(next: &mut PlaybackState, cmds: &mut Vec<Command>) {
  if next.view != ViewMode::Menu {
    debug!("playback: mode switch only available from the menu");
    return;
  }
  next.mode = next.mode.toggled();
  next.paused = false;
  next.current_segment = 0;
  next.scrubbing = false;
  next.narrating = false;
  next.last_scrub_secs = None;
  stop_outputs(cmds);
  cmds.push(Command::Notify(Notice::ModeSwitched(next.mode)));
}

fn scrub(next: &mut PlaybackState, cmds: &mut Vec<Command>, fraction: f64, ctx: &TransitionContext<'_>) {
  if next.view != ViewMode::Video {
    return;
  }
  let target = fraction.clamp(0.0, 1.0) * ctx.duration_secs;
  if next.scrubbing {
    if next.last_scrub_secs == Some(target) {
      return;
    }
    next.last_scrub_secs = Some(target);
  }

  cmds.push(Command::Seek(Output::Video, target));
  match next.mode {
    PlaybackMode::MusicVideo => cmds.push(Command::Seek(Output::Audio, target)),
    PlaybackMode::Narration => {
      if next.narrating && next.paused {
        next.current_segment = ctx.segments.segment_at(target).0;
      }
    }
  }
}

fn video_ended(next: &mut PlaybackState, cmds: &mut Vec<Command>) {
  if next.view != ViewMode::Video {
    return;
  }
  next.view = ViewMode::Menu;
  next.paused = false;
  next.scrubbing = false;
  next.narrating = false;
  next.last_scrub_secs = None;
  stop_outputs(cmds);
  cmds.push(Command::Notify(Notice::PlaybackEnded));
}

fn tick(next: &mut PlaybackState, cmds: &mut Vec<Command>, time_secs: f64, ctx: &TransitionContext<'_>) {
  if next.view != ViewMode::Video {
    return;
  }
  let (idx, _) = ctx.segments.segment_at(time_secs);
  if idx == next.current_segment {
    return;
  }
  next.current_segment = idx;
  if next.mode == PlaybackMode::Narration && next.narrating && !next.paused {
    cmds.push(Command::Speak { segment: idx });
  }
}

/// Owns the playback state and drives the video, audio and speech outputs.
///
/// Every collaborator is optional; commands aimed at a missing one are dropped.
pub struct PlaybackController {
  state: PlaybackState,
  video: Option<Box<dyn VideoSource>>,
  audio: Option<Box<dyn MediaTrack>>,
  speech: Option<Box<dyn SpeechSynth>>,
  speech_options: SpeechOptions,
  utterance: Option<UtteranceToken>,
  music_volume: f32,
}

impl PlaybackController {
  pub fn new(
    mode: PlaybackMode,
    video: Option<Box<dyn VideoSource>>,
    audio: Option<Box<dyn MediaTrack>>,
    speech: Option<Box<dyn SpeechSynth>>,
  ) -> Self {
    let voice = speech.as_ref().and_then(|s| pick_voice(&s.voices()));
    if let Some(ref v) = voice {
      info!(voice = %v.name, lang = %v.lang, "speech: voice selected");
    }
    Self {
      state: PlaybackState::new(mode),
      video,
      audio,
      speech,
      speech_options: SpeechOptions { voice, ..SpeechOptions::default() },
      utterance: None,
      music_volume: constants().music_volume,
    }
  }

  pub fn state(&self) -> &PlaybackState {
    &self.state
  }

  pub fn mode(&self) -> PlaybackMode {
    self.state.mode
  }

  pub fn view(&self) -> ViewMode {
    self.state.view
  }

  pub fn is_paused(&self) -> bool {
    self.state.paused
  }

  pub fn current_segment(&self) -> usize {
    self.state.current_segment
  }

  pub fn search_visible(&self) -> bool {
    self.state.search_visible()
  }

  pub fn progress_bar_visible(&self) -> bool {
    self.state.progress_bar_visible()
  }

  pub fn position(&self) -> f64 {
    self.video.as_ref().map_or(0.0, |v| v.current_time())
  }

  pub fn duration(&self) -> f64 {
    self.video.as_ref().map_or(0.0, |v| v.duration())
  }

  /// Playback position as a fraction of the duration, 0 when the duration is unknown.
  pub fn progress(&self) -> f64 {
    let duration = self.duration();
    if duration > 0.0 { (self.position() / duration).clamp(0.0, 1.0) } else { 0.0 }
  }

  pub fn snapshot(&mut self) -> Option<Arc<RgbaImage>> {
    self.video.as_mut().and_then(|v| v.snapshot())
  }

  pub fn start(&mut self, segments: &SegmentIndex) -> Vec<Notice> {
    self.dispatch(Event::Start, segments)
  }

  pub fn toggle_pause(&mut self, segments: &SegmentIndex) -> Vec<Notice> {
    self.dispatch(Event::TogglePause, segments)
  }

  pub fn switch_playback_mode(&mut self, segments: &SegmentIndex) -> Vec<Notice> {
    self.dispatch(Event::SwitchMode, segments)
  }

  pub fn scrub(&mut self, fraction: f64, segments: &SegmentIndex) -> Vec<Notice> {
    self.dispatch(Event::Scrub { fraction }, segments)
  }

  pub fn on_video_ended(&mut self, segments: &SegmentIndex) -> Vec<Notice> {
    self.dispatch(Event::VideoEnded, segments)
  }

  /// Feed one event through the transition table and apply its effects.
  pub fn dispatch(&mut self, event: Event, segments: &SegmentIndex) -> Vec<Notice> {
    let ctx = TransitionContext { segments, duration_secs: self.duration(), music_volume: self.music_volume };
    let (next, cmds) = transition(&self.state, event, &ctx);
    if next.view != self.state.view || next.paused != self.state.paused || next.mode != self.state.mode {
      info!(?event, view = ?next.view, mode = next.mode.label(), paused = next.paused, "playback: state changed");
    }
    if next.current_segment != self.state.current_segment
      && let Some(seg) = segments.get(next.current_segment)
    {
      info!(segment = next.current_segment, at = %seg.time_label(), title = %seg.title, "playback: switched segment");
    }
    self.state = next;

    let mut notices = Vec::new();
    for cmd in cmds {
      self.apply(cmd, segments, &mut notices);
    }
    notices
  }

  /// Per-refresh housekeeping: end-of-media, speech completions and the live
  /// segment lookup from the video clock.
  pub fn refresh(&mut self, segments: &SegmentIndex) -> Vec<Notice> {
    let mut notices = Vec::new();
    if self.video.as_mut().is_some_and(|v| v.take_ended()) {
      notices.extend(self.on_video_ended(segments));
    }
    self.poll_speech();
    if self.state.view == ViewMode::Video {
      let time_secs = self.position();
      notices.extend(self.dispatch(Event::Tick { time_secs }, segments));
    }
    notices
  }

  fn track(&mut self, output: Output) -> Option<&mut (dyn MediaTrack + 'static)> {
    match output {
      Output::Video => self.video.as_deref_mut().map(|v| v as &mut (dyn MediaTrack + 'static)),
      Output::Audio => self.audio.as_deref_mut(),
    }
  }

  fn apply(&mut self, cmd: Command, segments: &SegmentIndex, notices: &mut Vec<Notice>) {
    match cmd {
      Command::Play(out) => {
        if let Some(t) = self.track(out) {
          t.play();
        }
      }
      Command::Pause(out) => {
        if let Some(t) = self.track(out) {
          t.pause();
        }
      }
      Command::Seek(out, secs) => {
        if let Some(t) = self.track(out) {
          t.seek(secs);
        }
      }
      Command::Volume(out, level) => {
        if let Some(t) = self.track(out) {
          t.set_volume(level);
        }
      }
      Command::Speak { segment } => self.speak_segment(segment, segments),
      Command::PauseSpeech => {
        if let Some(s) = self.speech.as_mut() {
          s.pause();
        }
      }
      Command::ResumeSpeech => {
        if let Some(s) = self.speech.as_mut() {
          s.resume();
        }
      }
      Command::CancelSpeech => {
        if let Some(s) = self.speech.as_mut() {
          s.cancel();
        }
        self.utterance = None;
      }
      Command::Notify(notice) => notices.push(notice),
    }
  }

  fn speak_segment(&mut self, idx: usize, segments: &SegmentIndex) {
    let Some(speech) = self.speech.as_mut() else {
      debug!("speech: synthesis not available");
      return;
    };
    speech.cancel();
    self.utterance = None;

    let Some(seg) = segments.get(idx) else { return };
    if seg.content.is_empty() {
      return;
    }
    match speech.speak(&seg.content, &self.speech_options) {
      Ok(token) => {
        self.utterance = Some(token);
        info!(segment = idx, at = %seg.time_label(), title = %seg.title, "speech: started speaking segment");
      }
      Err(e) => warn!(segment = idx, err = %e, "speech: playback failed"),
    }
  }

  fn poll_speech(&mut self) {
    let Some(speech) = self.speech.as_mut() else { return };
    for event in speech.poll_events() {
      if self.utterance != Some(event.token) {
        debug!(token = event.token.0, "speech: discarding stale completion");
        continue;
      }
      self.utterance = None;
      match event.outcome {
        SpeechOutcome::Ended => debug!(token = event.token.0, "speech: playback ended"),
        SpeechOutcome::Failed(msg) => warn!(token = event.token.0, err = %msg, "speech: synthesis error"),
      }
    }
  }
}
