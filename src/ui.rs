use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, BorderType, Clear, Padding, Paragraph},
};

use crate::app::{App, END_MESSAGE, InputMode};
use crate::constants::constants;
use crate::controller::{PlaybackMode, ViewMode};
use crate::graphics::GlyphWidget;
use crate::progress::format_time;

const PLACEHOLDER: &str = "Search for a full word or phrase...";
const PAUSED_MESSAGE: &str = "Paused — Press SPACE to Resume";

struct Palette {
  bg: Color,
  fg: Color,
  accent: Color,
  muted: Color,
  border: Color,
  error: Color,
  key_fg: Color,
  key_bg: Color,
}

const PALETTE: Palette = Palette {
  bg: Color::Black,
  fg: Color::Gray,
  accent: Color::LightRed,
  muted: Color::DarkGray,
  border: Color::DarkGray,
  error: Color::Red,
  key_fg: Color::Black,
  key_bg: Color::Gray,
};

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// Horizontal scroll that keeps `cursor_col` inside a `width`-column input.
/// A zero-width input is treated as one column wide.
fn scroll_to_cursor(cursor_col: usize, scroll: usize, width: usize) -> usize {
  let width = width.max(1);
  if cursor_col < scroll {
    cursor_col
  } else if cursor_col >= scroll + width {
    cursor_col + 1 - width
  } else {
    scroll
  }
}

fn menu_label(mode: PlaybackMode) -> &'static str {
  match mode {
    PlaybackMode::MusicVideo => "Press ▶ Start MV mode",
    PlaybackMode::Narration => "Press ▶ Start Narration Mode",
  }
}

fn centered_line(area: Rect, row: u16) -> Rect {
  Rect { y: area.y + row.min(area.height.saturating_sub(1)), height: 1, ..area }
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  frame.render_widget(Block::default().style(Style::default().bg(PALETTE.bg)), frame.area());

  let search_h = if app.controller.search_visible() { 4 } else { 0 };
  let [header_area, main_area, search_area, status_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(search_h),
    Constraint::Length(1),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, app, header_area);
  match app.controller.view() {
    ViewMode::Menu => {
      app.video_area = None;
      render_menu(frame, app, main_area);
    }
    ViewMode::Video => render_video(frame, app, main_area),
  }
  if search_h > 0 {
    render_search(frame, app, search_area);
  }
  render_status(frame, app, status_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let left = Line::from(Span::styled(" ▦ glyphreel ", Style::default().fg(PALETTE.accent).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let right_text = format!("{} · v{} ", app.color_mode.label(), env!("CARGO_PKG_VERSION"));
  let width = right_text.chars().count() as u16;
  let right = Line::from(Span::styled(right_text, Style::default().fg(PALETTE.muted)));
  let right_area = Rect { x: area.x + area.width.saturating_sub(width), width: width.min(area.width), ..area };
  frame.render_widget(right, right_area);
}

fn render_menu(frame: &mut Frame, app: &App, area: Rect) {
  let block = Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(PALETTE.border));
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let text = if app.end_notice_visible() {
    vec![Line::from(Span::styled(END_MESSAGE, Style::default().fg(PALETTE.fg)))]
  } else {
    let mut lines = vec![
      Line::from(Span::styled(
        menu_label(app.controller.mode()),
        Style::default().fg(PALETTE.accent).add_modifier(Modifier::BOLD),
      )),
      Line::from(""),
      Line::from(Span::styled(
        format!("{} caption segments loaded", app.segments.len()),
        Style::default().fg(PALETTE.muted),
      )),
    ];
    // Chapter list, as much as fits below the header lines.
    let room = (inner.height as usize).saturating_sub(lines.len() + 1);
    if room > 0 {
      lines.push(Line::from(""));
      for seg in app.segments.iter().filter(|s| !s.title.is_empty()).take(room - 1) {
        let label = truncate_str(&format!("[{}] {}", seg.time_label(), seg.title), inner.width as usize);
        lines.push(Line::from(Span::styled(label, Style::default().fg(PALETTE.muted))));
      }
    }
    lines
  };
  let top = inner.height.saturating_sub(text.len() as u16) / 2;
  let text_area = Rect { y: inner.y + top, height: inner.height.saturating_sub(top), ..inner };
  frame.render_widget(Paragraph::new(text).alignment(Alignment::Center), text_area);
}

fn render_video(frame: &mut Frame, app: &mut App, area: Rect) {
  app.video_area = Some(area);
  let c = constants();
  if let Some((cells, grid)) = app.glyph_grid(area) {
    let bold_above = (c.font_size_min + c.font_size_max) / 2.0;
    let widget = GlyphWidget { grid: &grid, color_mode: app.color_mode, highlight_rgb: c.highlight_rgb, bold_above };
    frame.render_widget(widget, cells);
  }

  let mode_info = Line::from(Span::styled(
    format!(" mode: {} ", app.controller.mode().label()),
    Style::default().fg(PALETTE.fg).bg(PALETTE.bg),
  ));
  frame.render_widget(mode_info, centered_line(area, 0));

  if let Some(seg) = app.current_segment() {
    let label = truncate_str(&format!(" [{}] {} ", seg.time_label(), seg.title), area.width as usize);
    let seg_info = Line::from(Span::styled(label, Style::default().fg(PALETTE.muted).bg(PALETTE.bg)));
    frame.render_widget(seg_info, centered_line(area, 1));
  }

  if app.controller.is_paused() {
    render_paused_overlay(frame, app, area);
  }
}

fn render_paused_overlay(frame: &mut Frame, app: &App, area: Rect) {
  let width = (PAUSED_MESSAGE.chars().count() as u16 + 4).min(area.width);
  let msg_area = Rect {
    x: area.x + (area.width.saturating_sub(width)) / 2,
    y: area.y + area.height / 2,
    width,
    height: 1.min(area.height),
  };
  frame.render_widget(Clear, msg_area);
  frame.render_widget(
    Paragraph::new(PAUSED_MESSAGE)
      .alignment(Alignment::Center)
      .style(Style::default().fg(PALETTE.fg).bg(PALETTE.bg).add_modifier(Modifier::BOLD)),
    msg_area,
  );

  let Some(bar) = app.progress_bar() else { return };
  let track = bar.track_rect().intersection(area);
  if track.is_empty() {
    return;
  }
  let progress = app.controller.progress();
  let filled = ((progress * f64::from(track.width)).round() as u16).min(track.width);
  let handle_col = (bar.handle_x(progress).round() as u16).clamp(track.x, track.right().saturating_sub(1));

  let buf = frame.buffer_mut();
  for x in track.x..track.right() {
    let (symbol, color) = if x < track.x + filled { ("━", PALETTE.accent) } else { ("─", PALETTE.muted) };
    if let Some(cell) = buf.cell_mut((x, track.y)) {
      cell.set_symbol(symbol).set_style(Style::default().fg(color).bg(PALETTE.bg));
    }
  }
  if let Some(cell) = buf.cell_mut((handle_col, track.y)) {
    cell.set_symbol("●").set_style(Style::default().fg(PALETTE.fg).bg(PALETTE.bg));
  }

  if track.y + 1 < area.bottom() {
    let times = format!("{} / {}", format_time(app.controller.position()), format_time(app.controller.duration()));
    let times_area = Rect { y: track.y + 1, height: 1, ..track };
    frame.render_widget(
      Paragraph::new(times).alignment(Alignment::Center).style(Style::default().fg(PALETTE.muted).bg(PALETTE.bg)),
      times_area,
    );
  }
}

fn render_search(frame: &mut Frame, app: &mut App, area: Rect) {
  let focused = app.input_mode == InputMode::Search;
  let border_color = if focused { PALETTE.accent } else { PALETTE.border };
  let title = match app.highlights.current_term() {
    Some(term) => format!(" Search · last: {} ", truncate_str(term, 24)),
    None => " Search ".to_string(),
  };
  let block = Block::bordered()
    .title(title)
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&app.search_input, app.search_cursor);
  app.search_scroll = scroll_to_cursor(cursor_col, app.search_scroll, inner_w);

  let input_line = if app.search_input.is_empty() {
    Line::from(Span::styled(PLACEHOLDER, Style::default().fg(PALETTE.muted)))
  } else {
    let visible: String = app
      .search_input
      .chars()
      .scan(0usize, |col, c| {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        let start = *col;
        *col += w;
        Some((start, *col, c))
      })
      .skip_while(|(_, end, _)| *end <= app.search_scroll)
      .take_while(|(start, _, _)| *start < app.search_scroll + inner_w)
      .map(|(_, _, c)| c)
      .collect();
    Line::from(Span::styled(visible, Style::default().fg(PALETTE.fg)))
  };

  let words = app.highlights.words();
  let words_line = if words.is_empty() {
    Line::from(Span::styled("No highlighted words yet", Style::default().fg(PALETTE.muted)))
  } else {
    Line::from(vec![
      Span::styled("Highlighted words: ", Style::default().fg(PALETTE.muted)),
      Span::styled(truncate_str(&words.join(", "), inner_w.saturating_sub(19)), Style::default().fg(PALETTE.accent)),
    ])
  };

  frame.render_widget(Paragraph::new(vec![input_line, words_line]).block(block), area);

  if focused {
    let cursor_x = area.x + 2 + cursor_col.saturating_sub(app.search_scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let (text, style) = if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(PALETTE.error))
  } else if let Some(info) = &app.info_message {
    (format!(" ℹ  {}", info), Style::default().fg(PALETTE.fg))
  } else if app.controller.view() == ViewMode::Video {
    let state = if app.controller.is_paused() { "⏸" } else { "▶" };
    (
      format!(
        " {} {} / {}",
        state,
        format_time(app.controller.position()),
        format_time(app.controller.duration())
      ),
      Style::default().fg(PALETTE.muted),
    )
  } else {
    (" Ready".to_string(), Style::default().fg(PALETTE.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let keys: Vec<(&str, &str)> = match (app.input_mode, app.controller.view()) {
    (InputMode::Search, _) => vec![("Enter", "Highlight"), ("Esc", "Clear"), ("^x", "Clear all")],
    (InputMode::Normal, ViewMode::Menu) => {
      vec![("Enter", "Start"), ("m", "Switch mode"), ("/", "Search"), ("^x", "Clear all"), ("q", "Quit")]
    }
    (InputMode::Normal, ViewMode::Video) => {
      let mut k = vec![("Space", if app.controller.is_paused() { "Resume" } else { "Pause" })];
      if app.controller.search_visible() {
        k.push(("/", "Search"));
        k.push(("drag ●", "Scrub"));
      }
      k.push(("q", "Quit"));
      k
    }
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(PALETTE.key_fg).bg(PALETTE.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(PALETTE.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);
}
