use clap::ValueEnum;
use ratatui::style::Color;

use crate::glyph::GlyphColor;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliColorMode {
  Auto,
  Truecolor,
  #[value(name = "256")]
  Ansi256,
}

impl CliColorMode {
  pub fn from_config(s: &str) -> Self {
    match s.trim().to_lowercase().as_str() {
      "truecolor" | "24bit" => CliColorMode::Truecolor,
      "256" | "ansi256" => CliColorMode::Ansi256,
      _ => CliColorMode::Auto,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
  /// 24-bit RGB grays.
  TrueColor,
  /// The 24-step grayscale ramp of the xterm 256-color palette.
  Ansi256,
}

impl ColorMode {
  pub fn label(self) -> &'static str {
    match self {
      ColorMode::TrueColor => "truecolor",
      ColorMode::Ansi256 => "256-color",
    }
  }

  /// Terminal color for one glyph cell.
  pub fn color_for(self, color: GlyphColor, highlight: (u8, u8, u8)) -> Color {
    match (self, color) {
      (ColorMode::TrueColor, GlyphColor::Gray(g)) => Color::Rgb(g, g, g),
      (ColorMode::Ansi256, GlyphColor::Gray(g)) => Color::Indexed(gray_ramp_index(g)),
      (ColorMode::TrueColor, GlyphColor::Highlight) => Color::Rgb(highlight.0, highlight.1, highlight.2),
      (ColorMode::Ansi256, GlyphColor::Highlight) => Color::Indexed(196),
    }
  }
}

/// Map 0..=255 onto palette entries 232..=255.
fn gray_ramp_index(gray: u8) -> u8 {
  232 + ((u16::from(gray) * 23 + 127) / 255) as u8
}

/// Detect the richest color mode the terminal advertises.
///
/// - TrueColor: `COLORTERM` is `truecolor` or `24bit`, or a known true-color `TERM_PROGRAM`
/// - Ansi256: fallback
pub fn detect_color_mode() -> ColorMode {
  let colorterm = std::env::var("COLORTERM").unwrap_or_default().to_lowercase();
  if colorterm == "truecolor" || colorterm == "24bit" {
    return ColorMode::TrueColor;
  }

  let term_program = std::env::var("TERM_PROGRAM").unwrap_or_default().to_lowercase();
  if matches!(term_program.as_str(), "iterm.app" | "wezterm" | "ghostty" | "kitty") {
    return ColorMode::TrueColor;
  }

  ColorMode::Ansi256
}

pub fn resolve_color_mode(cli: CliColorMode) -> ColorMode {
  match cli {
    CliColorMode::Auto => detect_color_mode(),
    CliColorMode::Truecolor => ColorMode::TrueColor,
    CliColorMode::Ansi256 => ColorMode::Ansi256,
  }
}
