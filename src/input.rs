use ratatui::crossterm::event::{self, KeyCode, KeyModifiers, MouseButton, MouseEventKind};

use crate::app::{App, InputMode};
use crate::controller::ViewMode;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

// --- Event Handling ---

pub fn handle_key_event(app: &mut App, key: event::KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return;
  }

  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('x') {
    app.clear_all_highlights();
    return;
  }

  match app.input_mode {
    InputMode::Normal => handle_normal_key(app, key),
    InputMode::Search => handle_search_key(app, key),
  }
}

fn handle_normal_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Char('q') => {
      app.should_quit = true;
    }
    KeyCode::Enter | KeyCode::Char('s') => {
      if app.controller.view() == ViewMode::Menu {
        app.clear_error();
        app.start();
      }
    }
    KeyCode::Char('m') => {
      app.switch_mode();
    }
    KeyCode::Char(' ') => {
      app.toggle_pause();
    }
    KeyCode::Char('/') => {
      if app.controller.search_visible() {
        app.input_mode = InputMode::Search;
        app.search_cursor = app.search_input.chars().count();
      }
    }
    KeyCode::Esc => {
      app.clear_search();
    }
    _ => {}
  }
}

fn handle_search_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(&app.search_input, app.search_cursor);
      app.search_input.insert(byte_idx, c);
      app.search_cursor += 1;
    }
    KeyCode::Backspace => {
      if app.search_cursor > 0 {
        app.search_cursor -= 1;
        let byte_idx = char_to_byte_index(&app.search_input, app.search_cursor);
        app.search_input.remove(byte_idx);
      }
    }
    KeyCode::Delete => {
      if app.search_cursor < app.search_input.chars().count() {
        let byte_idx = char_to_byte_index(&app.search_input, app.search_cursor);
        app.search_input.remove(byte_idx);
      }
    }
    KeyCode::Left => {
      app.search_cursor = app.search_cursor.saturating_sub(1);
    }
    KeyCode::Right => {
      if app.search_cursor < app.search_input.chars().count() {
        app.search_cursor += 1;
      }
    }
    KeyCode::Home => {
      app.search_cursor = 0;
    }
    KeyCode::End => {
      app.search_cursor = app.search_input.chars().count();
    }
    KeyCode::Enter => {
      app.submit_search();
      app.input_mode = InputMode::Normal;
    }
    KeyCode::Esc => {
      app.clear_search();
      app.input_mode = InputMode::Normal;
    }
    _ => {}
  }
}

pub fn handle_mouse_event(app: &mut App, mouse: event::MouseEvent) {
  match mouse.kind {
    MouseEventKind::Down(MouseButton::Left) => app.pointer_down(mouse.column, mouse.row),
    MouseEventKind::Drag(MouseButton::Left) => app.pointer_drag(mouse.column, mouse.row),
    MouseEventKind::Up(MouseButton::Left) => app.pointer_up(),
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::controller::{PlaybackController, PlaybackMode};
  use crate::display::ColorMode;
  use crate::highlight::{HighlightIndex, MemoryStore};
  use crate::segments::SegmentIndex;
  use ratatui::crossterm::event::{KeyEvent, KeyModifiers, MouseEvent};
  use ratatui::layout::Rect;

  fn app() -> App {
    let segments = SegmentIndex::parse("[0:00] Intro\nHello world\n[1:30] Verse\nSecond part");
    let highlights = HighlightIndex::load(segments.full_text(), Box::new(MemoryStore::default()), "videoTextHighlights");
    let controller = PlaybackController::new(PlaybackMode::MusicVideo, None, None, None);
    App::new(segments, highlights, controller, ColorMode::TrueColor, Config::default(), None)
  }

  fn press(app: &mut App, code: KeyCode) {
    handle_key_event(app, KeyEvent::new(code, KeyModifiers::NONE));
  }

  fn type_str(app: &mut App, s: &str) {
    for c in s.chars() {
      press(app, KeyCode::Char(c));
    }
  }

  // --- char_to_byte_index ---

  #[test]
  fn char_to_byte_ascii() {
    assert_eq!(char_to_byte_index("hello", 0), 0);
    assert_eq!(char_to_byte_index("hello", 3), 3);
    assert_eq!(char_to_byte_index("hello", 5), 5); // past end
  }

  #[test]
  fn char_to_byte_multibyte() {
    let s = "aé日"; // a=1 byte, é=2 bytes, 日=3 bytes
    assert_eq!(char_to_byte_index(s, 0), 0);
    assert_eq!(char_to_byte_index(s, 1), 1);
    assert_eq!(char_to_byte_index(s, 2), 3);
    assert_eq!(char_to_byte_index(s, 3), 6);
  }

  #[test]
  fn char_to_byte_empty() {
    assert_eq!(char_to_byte_index("", 0), 0);
    assert_eq!(char_to_byte_index("", 5), 0);
  }

  // --- key bindings ---

  #[test]
  fn enter_starts_paused_and_space_resumes() {
    let mut app = app();
    press(&mut app, KeyCode::Enter);
    assert_eq!(app.controller.view(), ViewMode::Video);
    assert!(app.controller.is_paused());
    press(&mut app, KeyCode::Char(' '));
    assert!(!app.controller.is_paused());
  }

  #[test]
  fn m_switches_mode_only_in_menu() {
    let mut app = app();
    press(&mut app, KeyCode::Char('m'));
    assert_eq!(app.controller.mode(), PlaybackMode::Narration);
    press(&mut app, KeyCode::Char('s'));
    press(&mut app, KeyCode::Char('m'));
    assert_eq!(app.controller.mode(), PlaybackMode::Narration);
  }

  #[test]
  fn search_typing_and_submit() {
    let mut app = app();
    press(&mut app, KeyCode::Char('/'));
    assert_eq!(app.input_mode, InputMode::Search);
    type_str(&mut app, "wordl");
    press(&mut app, KeyCode::Left);
    press(&mut app, KeyCode::Backspace);
    press(&mut app, KeyCode::End);
    press(&mut app, KeyCode::Backspace);
    type_str(&mut app, "ld");
    assert_eq!(app.search_input, "world");
    press(&mut app, KeyCode::Enter);
    assert_eq!(app.input_mode, InputMode::Normal);
    assert!(app.highlights.is_highlighted("world"));
  }

  #[test]
  fn typing_q_in_search_does_not_quit() {
    let mut app = app();
    press(&mut app, KeyCode::Char('/'));
    type_str(&mut app, "q m");
    assert!(!app.should_quit);
    assert_eq!(app.controller.mode(), PlaybackMode::MusicVideo);
    press(&mut app, KeyCode::Esc);
    assert!(app.search_input.is_empty());
    assert_eq!(app.input_mode, InputMode::Normal);
  }

  #[test]
  fn search_hidden_while_playing() {
    let mut app = app();
    press(&mut app, KeyCode::Enter);
    press(&mut app, KeyCode::Char(' '));
    press(&mut app, KeyCode::Char('/'));
    assert_eq!(app.input_mode, InputMode::Normal);
  }

  #[test]
  fn ctrl_x_clears_all_highlights() {
    let mut app = app();
    app.search_input = "hello".into();
    app.submit_search();
    assert!(!app.highlights.words().is_empty());
    handle_key_event(&mut app, KeyEvent::new(KeyCode::Char('x'), KeyModifiers::CONTROL));
    assert!(app.highlights.words().is_empty());
  }

  #[test]
  fn quit_keys() {
    let mut app = app();
    press(&mut app, KeyCode::Char('q'));
    assert!(app.should_quit);

    let mut app = self::app();
    handle_key_event(&mut app, KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
    assert!(app.should_quit);
  }

  #[test]
  fn mouse_press_on_handle_starts_scrub() {
    let mut app = app();
    press(&mut app, KeyCode::Enter);
    app.video_area = Some(Rect::new(0, 0, 100, 40));
    let ev = |kind| MouseEvent { kind, column: 10, row: 36, modifiers: KeyModifiers::NONE };
    handle_mouse_event(&mut app, ev(MouseEventKind::Down(MouseButton::Left)));
    assert!(app.controller.state().scrubbing);
    handle_mouse_event(&mut app, ev(MouseEventKind::Up(MouseButton::Left)));
    assert!(!app.controller.state().scrubbing);
  }
}
