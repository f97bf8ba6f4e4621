//! Timed caption segments.
//!
//! Caption text is plain text with optional marker lines of the form
//! `[m:ss] Title`. Each marker opens a segment whose content is every
//! following non-marker line up to the next marker.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
  // Safety: the pattern is a literal and is exercised by the tests below.
  Regex::new(r"^\s*\[(\d+):(\d+)\](.*)$").expect("marker pattern must compile")
});

/// One caption unit: start time, inline title and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
  pub start_secs: u32,
  pub title: String,
  pub content: String,
}

impl TextSegment {
  /// `M:SS` label for the segment start, e.g. `1:05`.
  pub fn time_label(&self) -> String {
    format!("{}:{:02}", self.start_secs / 60, self.start_secs % 60)
  }
}

/// Parsed caption segments plus the original source text.
///
/// Never empty: when the source carries no markers, the whole text becomes a
/// single segment starting at zero.
#[derive(Debug, Clone)]
pub struct SegmentIndex {
  segments: Vec<TextSegment>,
  full_text: String,
}

/// Parse a `[minutes:seconds]title` marker line into (start seconds, raw title).
fn parse_marker(line: &str) -> Option<(u32, &str)> {
  let caps = MARKER.captures(line)?;
  let minutes: u32 = caps.get(1)?.as_str().parse().ok()?;
  let seconds: u32 = caps.get(2)?.as_str().parse().ok()?;
  let start = minutes.checked_mul(60)?.checked_add(seconds)?;
  Some((start, caps.get(3).map_or("", |m| m.as_str())))
}

/// Segment under construction: the content lines seen so far.
struct OpenSegment {
  start_secs: u32,
  title: String,
  lines: Vec<String>,
}

impl OpenSegment {
  fn finish(self) -> TextSegment {
    TextSegment { start_secs: self.start_secs, title: self.title, content: self.lines.join("\n").trim().to_string() }
  }
}

impl SegmentIndex {
  pub fn parse(full_text: &str) -> Self {
    let mut segments = Vec::new();
    let mut open: Option<OpenSegment> = None;

    // Split on every '\n' so a trailing newline still counts as a (blank) line.
    for line in full_text.split('\n') {
      let line = line.strip_suffix('\r').unwrap_or(line);
      if let Some((start_secs, title)) = parse_marker(line) {
        if let Some(prev) = open.take() {
          segments.push(prev.finish());
        }
        open = Some(OpenSegment { start_secs, title: title.trim().to_string(), lines: Vec::new() });
      } else if let Some(ref mut seg) = open {
        seg.lines.push(line.to_string());
      }
    }

    // A marker that ends the input with nothing after it is dropped.
    if let Some(last) = open
      && !last.lines.is_empty()
    {
      segments.push(last.finish());
    }

    if segments.is_empty() {
      segments.push(TextSegment { start_secs: 0, title: String::new(), content: full_text.to_string() });
    }

    debug!(segments = segments.len(), "captions: parsed segments");
    Self { segments, full_text: full_text.to_string() }
  }

  /// Resolve the segment active at `time_secs`: the latest-starting segment whose
  /// start is not after `time_secs`, or index 0 when none qualifies.
  pub fn segment_at(&self, time_secs: f64) -> (usize, &TextSegment) {
    let idx = self.segments.iter().rposition(|s| f64::from(s.start_secs) <= time_secs).unwrap_or(0);
    (idx, &self.segments[idx])
  }

  pub fn len(&self) -> usize {
    self.segments.len()
  }

  pub fn get(&self, idx: usize) -> Option<&TextSegment> {
    self.segments.get(idx)
  }

  pub fn iter(&self) -> std::slice::Iter<'_, TextSegment> {
    self.segments.iter()
  }

  /// The complete caption source, used as the search corpus.
  pub fn full_text(&self) -> &str {
    &self.full_text
  }

  /// Text to draw for segment `idx`: its content, or the full source when the
  /// content is empty or the index is out of range.
  pub fn active_text(&self, idx: usize) -> &str {
    match self.segments.get(idx) {
      Some(seg) if !seg.content.is_empty() => &seg.content,
      _ => &self.full_text,
    }
  }
}
