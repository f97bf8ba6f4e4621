use image::RgbaImage;
use ratatui::layout::Rect;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::Config;
use crate::constants::constants;
use crate::controller::{Event, Notice, PlaybackController, ViewMode};
use crate::display::ColorMode;
use crate::glyph::{GlyphGrid, GlyphRenderer, PixelFrame, RendererSettings, Surface};
use crate::graphics::{fit_cells, scale_for_cells};
use crate::highlight::HighlightIndex;
use crate::progress::ProgressBar;
use crate::segments::{SegmentIndex, TextSegment};

pub const END_MESSAGE: &str = "Video ended. Returning to menu...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
  Normal,
  /// Typing into the search box.
  Search,
}

pub struct App {
  pub segments: SegmentIndex,
  pub highlights: HighlightIndex,
  pub renderer: GlyphRenderer,
  pub controller: PlaybackController,
  pub color_mode: ColorMode,
  pub input_mode: InputMode,
  pub search_input: String,
  /// Cursor position within the search input (char index).
  pub search_cursor: usize,
  /// Horizontal scroll offset for the search input.
  pub search_scroll: usize,
  pub last_error: Option<String>,
  /// Informational message, lower priority than errors.
  pub info_message: Option<String>,
  pub should_quit: bool,
  /// Area the glyph grid was last drawn into; the progress bar lives inside it.
  pub video_area: Option<Rect>,
  /// Latest unsampled drag position.
  pending_drag: Option<(u16, u16)>,
  frame: Option<Arc<RgbaImage>>,
  /// Frame resampled to the cell grid, keyed by its source and target cells.
  scaled: Option<(Arc<RgbaImage>, Rect, RgbaImage)>,
  end_notice_until: Option<Instant>,
  config: Config,
  prefs_path: Option<PathBuf>,
  /// When the last error was set, used for auto-dismiss.
  error_time: Option<Instant>,
  info_time: Option<Instant>,
}

impl App {
  pub fn new(
    segments: SegmentIndex,
    highlights: HighlightIndex,
    controller: PlaybackController,
    color_mode: ColorMode,
    config: Config,
    prefs_path: Option<PathBuf>,
  ) -> Self {
    Self {
      segments,
      highlights,
      renderer: GlyphRenderer::new(RendererSettings::default()),
      controller,
      color_mode,
      input_mode: InputMode::Normal,
      search_input: String::new(),
      search_cursor: 0,
      search_scroll: 0,
      last_error: None,
      info_message: None,
      should_quit: false,
      video_area: None,
      pending_drag: None,
      frame: None,
      scaled: None,
      end_notice_until: None,
      config,
      prefs_path,
      error_time: None,
      info_time: None,
    }
  }

  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  pub fn set_info(&mut self, msg: String) {
    self.info_message = Some(msg);
    self.info_time = Some(Instant::now());
  }

  pub fn expire_messages(&mut self) {
    let ttl = Duration::from_secs(constants().error_dismiss_secs);
    if let Some(t) = self.error_time
      && t.elapsed() >= ttl
    {
      self.clear_error();
    }
    if let Some(t) = self.info_time
      && t.elapsed() >= ttl
    {
      self.info_message = None;
      self.info_time = None;
    }
  }

  /// One refresh: sample the drag, poll the collaborators and grab the frame.
  pub fn tick(&mut self) {
    self.expire_messages();
    self.apply_pending_drag();
    let notices = self.controller.refresh(&self.segments);
    self.handle_notices(notices);
    if self.controller.view() == ViewMode::Video {
      if let Some(frame) = self.controller.snapshot() {
        self.frame = Some(frame);
      }
    } else {
      self.frame = None;
      self.scaled = None;
    }
    if let Some(until) = self.end_notice_until
      && Instant::now() >= until
    {
      self.end_notice_until = None;
    }
  }

  fn handle_notices(&mut self, notices: Vec<Notice>) {
    for notice in notices {
      match notice {
        Notice::PlaybackEnded => {
          info!("app: playback ended");
          self.input_mode = InputMode::Normal;
          self.pending_drag = None;
          self.end_notice_until = Some(Instant::now() + Duration::from_millis(constants().end_message_ms));
        }
        Notice::ModeSwitched(mode) => {
          self.set_info(format!("Mode: {}", mode.label()));
          self.config.playback_mode = Some(mode.config_name().to_string());
          if let Some(ref path) = self.prefs_path {
            self.config.save_to(path);
          }
        }
      }
    }
  }

  /// The end-of-video message replaces the menu until it expires.
  pub fn end_notice_visible(&self) -> bool {
    self.end_notice_until.is_some()
  }

  pub fn start(&mut self) {
    self.end_notice_until = None;
    let notices = self.controller.start(&self.segments);
    self.handle_notices(notices);
  }

  pub fn switch_mode(&mut self) {
    let notices = self.controller.switch_playback_mode(&self.segments);
    self.handle_notices(notices);
  }

  pub fn toggle_pause(&mut self) {
    let notices = self.controller.toggle_pause(&self.segments);
    self.handle_notices(notices);
  }

  pub fn current_segment(&self) -> Option<&TextSegment> {
    self.segments.get(self.controller.current_segment())
  }

  pub fn submit_search(&mut self) {
    let term = self.search_input.trim().to_string();
    let outcome = self.highlights.submit(&term);
    if term.is_empty() {
      return;
    }
    if outcome.matched {
      let noun = if outcome.count == 1 { "match" } else { "matches" };
      self.set_info(format!("Highlighted '{}' ({} {noun})", term, outcome.count));
    } else {
      self.set_info(format!("No exact matches for '{}'", term));
    }
  }

  pub fn clear_search(&mut self) {
    self.search_input.clear();
    self.search_cursor = 0;
    self.search_scroll = 0;
    self.highlights.clear_current();
  }

  pub fn clear_all_highlights(&mut self) {
    self.clear_search();
    self.highlights.clear_all();
    self.set_info("All highlights cleared".to_string());
  }

  pub fn progress_bar(&self) -> Option<ProgressBar> {
    if !self.controller.progress_bar_visible() {
      return None;
    }
    self.video_area.map(ProgressBar::layout)
  }

  pub fn pointer_down(&mut self, col: u16, row: u16) {
    let Some(bar) = self.progress_bar() else { return };
    if bar.hit_handle(f64::from(col), f64::from(row), self.controller.progress()) {
      debug!(col, row, "app: scrub grabbed");
      self.controller.dispatch(Event::ScrubBegin, &self.segments);
      self.pending_drag = Some((col, row));
    }
  }

  pub fn pointer_drag(&mut self, col: u16, row: u16) {
    if self.controller.state().scrubbing {
      self.pending_drag = Some((col, row));
    }
  }

  pub fn pointer_up(&mut self) {
    if self.controller.state().scrubbing {
      self.apply_pending_drag();
      self.controller.dispatch(Event::ScrubEnd, &self.segments);
    }
    self.pending_drag = None;
  }

  /// Drags are sampled once per refresh, not per mouse event.
  fn apply_pending_drag(&mut self) {
    let Some((col, _)) = self.pending_drag.take() else { return };
    if !self.controller.state().scrubbing {
      return;
    }
    if let Some(bar) = self.progress_bar() {
      let fraction = bar.fraction_at(f64::from(col));
      let notices = self.controller.scrub(fraction, &self.segments);
      self.handle_notices(notices);
    }
  }

  /// Rasterise the current frame into the largest aspect-correct cell block inside `area`.
  pub fn glyph_grid(&mut self, area: Rect) -> Option<(Rect, GlyphGrid)> {
    let frame = self.frame.clone()?;
    let cells = fit_cells(frame.width(), frame.height(), area);
    if cells.is_empty() {
      return None;
    }
    let stride = self.renderer.settings().stride;
    let fresh = matches!(&self.scaled, Some((src, rect, _)) if Arc::ptr_eq(src, &frame) && *rect == cells);
    if !fresh {
      self.scaled = Some((frame.clone(), cells, scale_for_cells(&frame, cells, stride)));
    }
    let (_, _, scaled) = self.scaled.as_ref()?;

    let text = self.segments.active_text(self.controller.current_segment());
    let highlights = &self.highlights;
    let surface = Surface { width: f32::from(cells.width), height: f32::from(cells.height) };
    let pixels = PixelFrame::new(scaled.width(), scaled.height(), scaled.as_raw());
    let grid = self.renderer.render(pixels, text, |w| highlights.is_highlighted(w), surface)?;
    Some((cells, grid))
  }

  #[cfg(test)]
  pub(crate) fn set_frame(&mut self, frame: RgbaImage) {
    self.frame = Some(Arc::new(frame));
  }
}
