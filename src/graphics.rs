use image::{
  RgbaImage,
  imageops::{self, FilterType},
};
use ratatui::{
  buffer::Buffer,
  layout::Rect,
  style::{Modifier, Style},
  widgets::Widget,
};
use unicode_width::UnicodeWidthChar;

use crate::display::ColorMode;
use crate::glyph::GlyphGrid;

/// Terminal cells are roughly twice as tall as they are wide.
const CELL_ASPECT: f32 = 2.0;

/// Largest block of cells inside `area` that shows an `img_w`×`img_h` picture
/// without distortion, centred.
pub fn fit_cells(img_w: u32, img_h: u32, area: Rect) -> Rect {
  if img_w == 0 || img_h == 0 || area.is_empty() {
    return Rect { width: 0, height: 0, ..area };
  }
  let aspect = img_w as f32 / img_h as f32;
  let mut cols = f32::from(area.width);
  let mut rows = (cols / aspect / CELL_ASPECT).round();
  if rows > f32::from(area.height) {
    rows = f32::from(area.height);
    cols = (rows * aspect * CELL_ASPECT).round().min(f32::from(area.width));
  }
  let (cols, rows) = (cols.max(1.0) as u16, rows.max(1.0) as u16);
  Rect {
    x: area.x + (area.width - cols) / 2,
    y: area.y + (area.height - rows) / 2,
    width: cols,
    height: rows,
  }
}

/// Resample so that one stride-spaced sample lands on each cell.
pub fn scale_for_cells(image: &RgbaImage, cells: Rect, stride: u32) -> RgbaImage {
  let w = (u32::from(cells.width) * stride).max(1);
  let h = (u32::from(cells.height) * stride).max(1);
  imageops::resize(image, w, h, FilterType::Triangle)
}

/// Characters that would break a one-glyph-per-cell grid are replaced.
pub fn cell_symbol(c: char) -> char {
  if c.is_whitespace() || c.is_control() {
    ' '
  } else if c.width() == Some(1) {
    c
  } else {
    '·'
  }
}

// --- Glyph Widget ---

pub struct GlyphWidget<'a> {
  pub grid: &'a GlyphGrid,
  pub color_mode: ColorMode,
  pub highlight_rgb: (u8, u8, u8),
  /// Cells above this font size render bold.
  pub bold_above: f32,
}

impl Widget for GlyphWidget<'_> {
  fn render(self, area: Rect, buf: &mut Buffer) {
    if area.is_empty() {
      return;
    }
    for cell in &self.grid.cells {
      let (cx, cy) = (cell.x.round(), cell.y.round());
      if cx < 0.0 || cy < 0.0 || cx >= f32::from(area.width) || cy >= f32::from(area.height) {
        continue;
      }
      let mut style = Style::default().fg(self.color_mode.color_for(cell.color, self.highlight_rgb));
      if cell.font_size > self.bold_above {
        style = style.add_modifier(Modifier::BOLD);
      }
      if let Some(target) = buf.cell_mut((area.x + cx as u16, area.y + cy as u16)) {
        target.set_char(cell_symbol(cell.glyph)).set_style(style);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::glyph::{GlyphCell, GlyphColor};
  use ratatui::style::Color;

  #[test]
  fn fit_wide_image_letterboxes() {
    assert_eq!(fit_cells(64, 32, Rect::new(0, 0, 40, 20)), Rect::new(0, 5, 40, 10));
  }

  #[test]
  fn fit_tall_image_pillarboxes() {
    assert_eq!(fit_cells(32, 64, Rect::new(0, 0, 40, 20)), Rect::new(10, 0, 20, 20));
  }

  #[test]
  fn fit_degenerate_inputs() {
    assert!(fit_cells(0, 10, Rect::new(0, 0, 40, 20)).is_empty());
    assert!(fit_cells(10, 10, Rect::new(3, 3, 0, 0)).is_empty());
  }

  #[test]
  fn scaled_frame_matches_cells() {
    let img = RgbaImage::new(64, 32);
    let scaled = scale_for_cells(&img, Rect::new(0, 0, 40, 10), 4);
    assert_eq!(scaled.dimensions(), (160, 40));
  }

  #[test]
  fn cell_symbol_keeps_grid_single_width() {
    assert_eq!(cell_symbol('a'), 'a');
    assert_eq!(cell_symbol('\n'), ' ');
    assert_eq!(cell_symbol('日'), '·');
  }

  #[test]
  fn widget_paints_cells() {
    let grid = GlyphGrid {
      columns: 2,
      rows: 1,
      cells: vec![
        GlyphCell { glyph: 'H', font_size: 30.0, color: GlyphColor::Gray(40), x: 0.0, y: 0.0 },
        GlyphCell { glyph: 'i', font_size: 34.0, color: GlyphColor::Highlight, x: 1.0, y: 0.0 },
      ],
    };
    let area = Rect::new(0, 0, 2, 1);
    let mut buf = Buffer::empty(area);
    GlyphWidget { grid: &grid, color_mode: ColorMode::TrueColor, highlight_rgb: (255, 0, 0), bold_above: 32.0 }
      .render(area, &mut buf);

    assert_eq!(buf[(0, 0)].symbol(), "H");
    assert_eq!(buf[(0, 0)].fg, Color::Rgb(40, 40, 40));
    assert!(!buf[(0, 0)].modifier.contains(Modifier::BOLD));
    assert_eq!(buf[(1, 0)].symbol(), "i");
    assert_eq!(buf[(1, 0)].fg, Color::Rgb(255, 0, 0));
    assert!(buf[(1, 0)].modifier.contains(Modifier::BOLD));
  }
}
