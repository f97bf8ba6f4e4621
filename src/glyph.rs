//! Frame → glyph grid rasterisation.
//!
//! Every refresh the current video frame is sampled on a fixed stride. Each
//! sample becomes one glyph cell: the glyph cycles through the active caption
//! text, the font size follows pixel brightness, and the color is either the
//! brightness as gray or the highlight color when the caption word under the
//! cell is highlighted. Nothing is carried over between calls.

use image::RgbaImage;
use tracing::trace;

use crate::constants::constants;

/// Borrowed view of an RGBA8 pixel buffer, row-major, 4 bytes per pixel.
#[derive(Debug, Clone, Copy)]
pub struct PixelFrame<'a> {
  pub width: u32,
  pub height: u32,
  pub data: &'a [u8],
}

impl<'a> PixelFrame<'a> {
  pub fn new(width: u32, height: u32, data: &'a [u8]) -> Self {
    Self { width, height, data }
  }

  /// A frame is usable once it has pixels and the buffer covers every one of them.
  pub fn is_available(&self) -> bool {
    let needed = self.width as usize * self.height as usize * 4;
    needed > 0 && self.data.len() >= needed
  }

  fn rgb(&self, x: u32, y: u32) -> (u8, u8, u8) {
    let idx = (x as usize + y as usize * self.width as usize) * 4;
    (self.data[idx], self.data[idx + 1], self.data[idx + 2])
  }
}

impl<'a> From<&'a RgbaImage> for PixelFrame<'a> {
  fn from(image: &'a RgbaImage) -> Self {
    Self { width: image.width(), height: image.height(), data: image.as_raw() }
  }
}

/// Output surface the grid is scaled onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
  pub width: f32,
  pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlyphColor {
  Gray(u8),
  Highlight,
}

/// One draw instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphCell {
  pub glyph: char,
  pub font_size: f32,
  pub color: GlyphColor,
  /// Position on the output surface.
  pub x: f32,
  pub y: f32,
}

/// All cells of one refresh, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphGrid {
  pub columns: usize,
  pub rows: usize,
  pub cells: Vec<GlyphCell>,
}

/// A word or whitespace run of the caption text, with its char offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
  pub text: &'a str,
  pub start: usize,
  pub len: usize,
}

/// Split `text` into alternating word and whitespace runs, recording each run's
/// starting char offset. Concatenating the tokens yields `text` again.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
  let mut tokens = Vec::new();
  let mut run_start_byte = 0;
  let mut run_start_char = 0;
  let mut run_is_space: Option<bool> = None;

  for (char_idx, (byte_idx, ch)) in text.char_indices().enumerate() {
    let is_space = ch.is_whitespace();
    match run_is_space {
      Some(prev) if prev != is_space => {
        tokens.push(Token {
          text: &text[run_start_byte..byte_idx],
          start: run_start_char,
          len: char_idx - run_start_char,
        });
        run_start_byte = byte_idx;
        run_start_char = char_idx;
      }
      _ => {}
    }
    run_is_space = Some(is_space);
  }

  if run_is_space.is_some() {
    let total = text.chars().count();
    tokens.push(Token { text: &text[run_start_byte..], start: run_start_char, len: total - run_start_char });
  }
  tokens
}

/// Drop everything that isn't a word character (letters, digits, underscore).
pub fn strip_non_word(token: &str) -> String {
  token.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererSettings {
  pub stride: u32,
  pub font_size_min: f32,
  pub font_size_max: f32,
}

impl Default for RendererSettings {
  fn default() -> Self {
    let c = constants();
    Self { stride: c.sample_stride.max(1), font_size_min: c.font_size_min, font_size_max: c.font_size_max }
  }
}

#[derive(Debug, Clone, Default)]
pub struct GlyphRenderer {
  settings: RendererSettings,
}

impl GlyphRenderer {
  pub fn new(settings: RendererSettings) -> Self {
    Self { settings: RendererSettings { stride: settings.stride.max(1), ..settings } }
  }

  pub fn settings(&self) -> &RendererSettings {
    &self.settings
  }

  /// Linear brightness → font size mapping over the configured range.
  pub fn font_size_for(&self, brightness: f32) -> f32 {
    let RendererSettings { font_size_min, font_size_max, .. } = self.settings;
    font_size_min + (brightness / 255.0) * (font_size_max - font_size_min)
  }

  /// Rasterise `frame` against `text`.
  ///
  /// Returns `None` when the frame has no pixels yet or the text is empty; the
  /// caller simply skips drawing for this refresh.
  pub fn render<F>(&self, frame: PixelFrame<'_>, text: &str, is_highlighted: F, surface: Surface) -> Option<GlyphGrid>
  where
    F: Fn(&str) -> bool,
  {
    if !frame.is_available() {
      trace!(width = frame.width, height = frame.height, "glyph: frame not available, skipping");
      return None;
    }
    let glyphs: Vec<char> = text.chars().collect();
    if glyphs.is_empty() {
      trace!("glyph: empty caption text, skipping");
      return None;
    }

    // Per-char highlight flags, resolved once per call.
    let mut highlighted = vec![false; glyphs.len()];
    for token in tokenize(text) {
      let clean = strip_non_word(token.text);
      if !clean.is_empty() && is_highlighted(clean.as_str()) {
        highlighted[token.start..token.start + token.len].fill(true);
      }
    }

    let stride = self.settings.stride;
    let columns = frame.width.div_ceil(stride) as usize;
    let rows = frame.height.div_ceil(stride) as usize;
    let mut cells = Vec::with_capacity(columns * rows);

    let mut char_index = 0usize;
    let mut global_char_index = 0usize;
    for y in (0..frame.height).step_by(stride as usize) {
      for x in (0..frame.width).step_by(stride as usize) {
        let (r, g, b) = frame.rgb(x, y);
        let brightness = (f32::from(r) + f32::from(g) + f32::from(b)) / 3.0;
        let glyph = glyphs[char_index % glyphs.len()];
        // The lookup cursor never wraps: samples past the end of the text own no token.
        let lit = highlighted.get(global_char_index).copied().unwrap_or(false);
        let color = if lit { GlyphColor::Highlight } else { GlyphColor::Gray(brightness.round() as u8) };

        cells.push(GlyphCell {
          glyph,
          font_size: self.font_size_for(brightness),
          color,
          x: x as f32 / frame.width as f32 * surface.width,
          y: y as f32 / frame.height as f32 * surface.height,
        });

        char_index += 1;
        global_char_index += 1;
      }
    }

    Some(GlyphGrid { columns, rows, cells })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn settings() -> RendererSettings {
    RendererSettings { stride: 2, font_size_min: 30.0, font_size_max: 34.0 }
  }

  fn solid(width: u32, height: u32, rgb: (u8, u8, u8)) -> Vec<u8> {
    (0..width * height).flat_map(|_| [rgb.0, rgb.1, rgb.2, 255]).collect()
  }

  const SURFACE: Surface = Surface { width: 100.0, height: 50.0 };

  #[test]
  fn tokenize_records_offsets() {
    let tokens = tokenize("Hello  big\nworld");
    let parts: Vec<(&str, usize, usize)> = tokens.iter().map(|t| (t.text, t.start, t.len)).collect();
    assert_eq!(parts, vec![("Hello", 0, 5), ("  ", 5, 2), ("big", 7, 3), ("\n", 10, 1), ("world", 11, 5)]);
  }

  #[test]
  fn tokenize_leading_whitespace_and_multibyte() {
    let tokens = tokenize(" é日 x");
    let parts: Vec<(&str, usize, usize)> = tokens.iter().map(|t| (t.text, t.start, t.len)).collect();
    assert_eq!(parts, vec![(" ", 0, 1), ("é日", 1, 2), (" ", 3, 1), ("x", 4, 1)]);
    assert!(tokenize("").is_empty());
  }

  #[test]
  fn strip_non_word_keeps_word_chars() {
    assert_eq!(strip_non_word("world!"), "world");
    assert_eq!(strip_non_word("\"it's\""), "its");
    assert_eq!(strip_non_word("--"), "");
    assert_eq!(strip_non_word("snake_case42"), "snake_case42");
  }

  #[test]
  fn cell_count_matches_sample_points() {
    let renderer = GlyphRenderer::new(settings());
    let data = solid(5, 3, (10, 10, 10));
    let grid = renderer.render(PixelFrame::new(5, 3, &data), "abc", |_| false, SURFACE).unwrap();
    assert_eq!(grid.columns, 3);
    assert_eq!(grid.rows, 2);
    assert_eq!(grid.cells.len(), 6);
  }

  #[test]
  fn font_size_and_gray_follow_brightness() {
    let renderer = GlyphRenderer::new(settings());
    let black = solid(2, 2, (0, 0, 0));
    let white = solid(2, 2, (255, 255, 255));
    let dark = renderer.render(PixelFrame::new(2, 2, &black), "a", |_| false, SURFACE).unwrap();
    let bright = renderer.render(PixelFrame::new(2, 2, &white), "a", |_| false, SURFACE).unwrap();
    assert_eq!(dark.cells[0].font_size, 30.0);
    assert_eq!(dark.cells[0].color, GlyphColor::Gray(0));
    assert_eq!(bright.cells[0].font_size, 34.0);
    assert_eq!(bright.cells[0].color, GlyphColor::Gray(255));
  }

  #[test]
  fn brightness_is_channel_mean() {
    let renderer = GlyphRenderer::new(settings());
    let data = solid(1, 1, (30, 60, 90));
    let grid = renderer.render(PixelFrame::new(1, 1, &data), "a", |_| false, SURFACE).unwrap();
    assert_eq!(grid.cells[0].color, GlyphColor::Gray(60));
    assert!((grid.cells[0].font_size - renderer.font_size_for(60.0)).abs() < f32::EPSILON);
  }

  #[test]
  fn glyphs_cycle_through_text() {
    let renderer = GlyphRenderer::new(settings());
    let data = solid(8, 4, (0, 0, 0));
    let grid = renderer.render(PixelFrame::new(8, 4, &data), "abc", |_| false, SURFACE).unwrap();
    let glyphs: String = grid.cells.iter().map(|c| c.glyph).collect();
    assert_eq!(glyphs, "abcabcab");
  }

  #[test]
  fn positions_scale_to_surface() {
    let renderer = GlyphRenderer::new(settings());
    let data = solid(4, 4, (0, 0, 0));
    let grid = renderer.render(PixelFrame::new(4, 4, &data), "a", |_| false, SURFACE).unwrap();
    let coords: Vec<(f32, f32)> = grid.cells.iter().map(|c| (c.x, c.y)).collect();
    assert_eq!(coords, vec![(0.0, 0.0), (50.0, 0.0), (0.0, 25.0), (50.0, 25.0)]);
  }

  #[test]
  fn highlighted_word_cells_turn_highlight_color() {
    let renderer = GlyphRenderer::new(RendererSettings { stride: 1, ..settings() });
    let data = solid(11, 1, (100, 100, 100));
    let grid = renderer.render(PixelFrame::new(11, 1, &data), "Hi, world!", |w| w == "world", SURFACE).unwrap();
    let lit: Vec<bool> = grid.cells.iter().map(|c| c.color == GlyphColor::Highlight).collect();
    // "Hi," " " "world!" then one sample past the end of the text.
    assert_eq!(lit, vec![false, false, false, false, true, true, true, true, true, true, false]);
  }

  #[test]
  fn highlight_lookup_does_not_wrap() {
    let renderer = GlyphRenderer::new(RendererSettings { stride: 1, ..settings() });
    let data = solid(6, 1, (0, 0, 0));
    let grid = renderer.render(PixelFrame::new(6, 1, &data), "ab", |_| true, SURFACE).unwrap();
    let lit: Vec<bool> = grid.cells.iter().map(|c| c.color == GlyphColor::Highlight).collect();
    assert_eq!(lit, vec![true, true, false, false, false, false]);
    let glyphs: String = grid.cells.iter().map(|c| c.glyph).collect();
    assert_eq!(glyphs, "ababab");
  }

  #[test]
  fn punctuation_only_token_is_never_highlighted() {
    let renderer = GlyphRenderer::new(RendererSettings { stride: 1, ..settings() });
    let data = solid(3, 1, (0, 0, 0));
    let grid = renderer.render(PixelFrame::new(3, 1, &data), "...", |_| true, SURFACE).unwrap();
    assert!(grid.cells.iter().all(|c| c.color != GlyphColor::Highlight));
  }

  #[test]
  fn render_is_repeatable() {
    let renderer = GlyphRenderer::new(settings());
    let data = solid(6, 6, (12, 200, 40));
    let frame = PixelFrame::new(6, 6, &data);
    let first = renderer.render(frame, "one two", |w| w == "two", SURFACE);
    let second = renderer.render(frame, "one two", |w| w == "two", SURFACE);
    assert_eq!(first, second);
  }

  #[test]
  fn missing_pixels_skip_the_refresh() {
    let renderer = GlyphRenderer::new(settings());
    assert!(renderer.render(PixelFrame::new(0, 0, &[]), "abc", |_| false, SURFACE).is_none());
    let short = vec![0u8; 7];
    assert!(renderer.render(PixelFrame::new(2, 2, &short), "abc", |_| false, SURFACE).is_none());
  }

  #[test]
  fn empty_text_skips_the_refresh() {
    let renderer = GlyphRenderer::new(settings());
    let data = solid(2, 2, (0, 0, 0));
    assert!(renderer.render(PixelFrame::new(2, 2, &data), "", |_| false, SURFACE).is_none());
  }

  #[test]
  fn frame_from_rgba_image() {
    let image = RgbaImage::from_pixel(3, 2, image::Rgba([9, 9, 9, 255]));
    let frame = PixelFrame::from(&image);
    assert_eq!((frame.width, frame.height), (3, 2));
    assert!(frame.is_available());
  }
}
