//! Video collaborator backed by frames extracted with ffmpeg.
//!
//! Extraction runs in the background while playback proceeds; a frame that
//! is not on disk yet simply yields no snapshot for that refresh.

use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::clock::PlaybackClock;
use crate::media::{MediaTrack, VideoSource};

fn not_found_hint(tool: &str, e: std::io::Error) -> anyhow::Error {
  if e.kind() == std::io::ErrorKind::NotFound {
    anyhow!("{tool} not found. Install it with: brew install ffmpeg (macOS) or apt install ffmpeg (Linux)")
  } else {
    anyhow!(e).context(format!("Failed to execute {tool}"))
  }
}

/// Parse the bare `format=duration` value printed by ffprobe.
fn parse_duration(stdout: &str) -> Result<f64> {
  let raw = stdout.lines().map(str::trim).find(|l| !l.is_empty()).context("ffprobe printed no duration")?;
  let secs: f64 = raw.parse().with_context(|| format!("ffprobe duration is not a number: {raw}"))?;
  if !secs.is_finite() || secs < 0.0 {
    return Err(anyhow!("ffprobe duration out of range: {secs}"));
  }
  Ok(secs)
}

/// Container duration in seconds, as reported by ffprobe.
pub async fn probe_duration(path: &Path) -> Result<f64> {
  let output = Command::new("ffprobe")
    .args(["-v", "error", "-show_entries", "format=duration", "-of", "default=noprint_wrappers=1:nokey=1"])
    .arg(path)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .output()
    .await
    .map_err(|e| not_found_hint("ffprobe", e))?;

  if !output.status.success() {
    return Err(anyhow!("ffprobe failed for {}: {}", path.display(), String::from_utf8_lossy(&output.stderr).trim()));
  }
  let stdout = String::from_utf8(output.stdout).context("ffprobe output non-UTF8")?;
  parse_duration(&stdout)
}

/// Zero-based frame number shown at `position_secs` for a sequence sampled at `fps`.
fn frame_index(position_secs: f64, fps: f64) -> usize {
  if position_secs <= 0.0 || fps <= 0.0 { 0 } else { (position_secs * fps).floor() as usize }
}

fn frame_file(dir: &Path, index: usize) -> PathBuf {
  // ffmpeg numbers image sequences from 1.
  dir.join(format!("frame_{:06}.png", index + 1))
}

pub struct FrameSequence {
  dir: PathBuf,
  fps: f64,
  clock: PlaybackClock,
  extractor: Option<Child>,
  cached: Option<(usize, Arc<RgbaImage>)>,
}

impl FrameSequence {
  /// Probe `video` and start extracting scaled frames into a private temp directory.
  pub async fn extract(video: &Path, fps: f64, width: u32) -> Result<Self> {
    let duration = probe_duration(video).await?;
    let dir = std::env::temp_dir().join(format!("glyphreel-frames-{}", std::process::id()));
    // Leftovers from a previous crash would be mistaken for fresh frames.
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).context("Failed to create frame directory")?;

    let child = Command::new("ffmpeg")
      .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
      .arg(video)
      .args(["-vf", &format!("fps={fps},scale={width}:-2"), "-an"])
      .arg(dir.join("frame_%06d.png"))
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      // Never drained; piping it would eventually stall ffmpeg.
      .stderr(Stdio::null())
      .kill_on_drop(true)
      .spawn()
      .map_err(|e| not_found_hint("ffmpeg", e))?;

    info!(video = %video.display(), duration, fps, width, "frames: extraction started");
    Ok(Self { dir, fps, clock: PlaybackClock::new(duration), extractor: Some(child), cached: None })
  }

  /// Whether ffmpeg is still writing frames.
  pub fn is_extracting(&mut self) -> bool {
    let Some(child) = self.extractor.as_mut() else { return false };
    match child.try_wait() {
      Ok(None) => true,
      Ok(Some(status)) => {
        if status.success() {
          info!("frames: extraction finished");
        } else {
          warn!(%status, "frames: extraction exited with failure");
        }
        self.extractor = None;
        false
      }
      Err(e) => {
        warn!(err = %e, "frames: could not poll extractor");
        self.extractor = None;
        false
      }
    }
  }

  fn load(&self, index: usize) -> Option<RgbaImage> {
    let path = frame_file(&self.dir, index);
    if !path.exists() {
      return None;
    }
    match image::open(&path) {
      Ok(img) => Some(img.to_rgba8()),
      Err(e) => {
        // Usually a frame ffmpeg is still writing.
        debug!(frame = index, err = %e, "frames: decode failed");
        None
      }
    }
  }
}

impl MediaTrack for FrameSequence {
  fn play(&mut self) {
    self.clock.play();
  }

  fn pause(&mut self) {
    self.clock.pause();
  }

  fn seek(&mut self, secs: f64) {
    self.clock.seek(secs);
  }

  fn current_time(&self) -> f64 {
    self.clock.position()
  }

  fn duration(&self) -> f64 {
    self.clock.duration()
  }

  fn set_volume(&mut self, _level: f32) {
    // Frames carry no audio.
  }

  fn take_ended(&mut self) -> bool {
    self.clock.take_ended()
  }
}

impl VideoSource for FrameSequence {
  fn snapshot(&mut self) -> Option<Arc<RgbaImage>> {
    let index = frame_index(self.clock.position(), self.fps);
    if let Some((cached_index, ref frame)) = self.cached
      && cached_index == index
    {
      return Some(frame.clone());
    }
    match self.load(index) {
      Some(img) => {
        let frame = Arc::new(img);
        self.cached = Some((index, frame.clone()));
        Some(frame)
      }
      None => {
        if self.is_extracting() {
          // Keep showing the last good frame until the requested one lands.
          self.cached.as_ref().map(|(_, f)| f.clone())
        } else {
          None
        }
      }
    }
  }
}

impl Drop for FrameSequence {
  fn drop(&mut self) {
    if let Some(mut child) = self.extractor.take() {
      let _ = child.start_kill();
    }
    let _ = std::fs::remove_dir_all(&self.dir);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_duration_plain_value() {
    assert_eq!(parse_duration("213.480000\n").unwrap(), 213.48);
  }

  #[test]
  fn parse_duration_skips_blank_lines() {
    assert_eq!(parse_duration("\n  \n12.5\n").unwrap(), 12.5);
  }

  #[test]
  fn parse_duration_rejects_na() {
    assert!(parse_duration("N/A\n").is_err());
    assert!(parse_duration("").is_err());
    assert!(parse_duration("-4").is_err());
  }

  #[test]
  fn frame_index_floors_position() {
    assert_eq!(frame_index(0.0, 12.0), 0);
    assert_eq!(frame_index(0.08, 12.0), 0);
    assert_eq!(frame_index(1.0, 12.0), 12);
    assert_eq!(frame_index(2.55, 12.0), 30);
    assert_eq!(frame_index(-1.0, 12.0), 0);
    assert_eq!(frame_index(5.0, 0.0), 0);
  }

  #[test]
  fn frame_file_is_one_based() {
    let dir = Path::new("/tmp/x");
    assert_eq!(frame_file(dir, 0), PathBuf::from("/tmp/x/frame_000001.png"));
    assert_eq!(frame_file(dir, 41), PathBuf::from("/tmp/x/frame_000042.png"));
  }

  #[test]
  fn snapshot_reads_extracted_frames() {
    let dir = tempfile::tempdir().unwrap();
    let img = RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]));
    img.save(frame_file(dir.path(), 0)).unwrap();

    let mut seq = FrameSequence {
      dir: dir.path().to_path_buf(),
      fps: 12.0,
      clock: PlaybackClock::new(10.0),
      extractor: None,
      cached: None,
    };
    let frame = seq.snapshot().expect("first frame");
    assert_eq!(frame.dimensions(), (4, 2));
    assert_eq!(frame.get_pixel(0, 0).0, [10, 20, 30, 255]);

    seq.seek(5.0);
    assert!(seq.snapshot().is_none());
    assert_eq!(seq.current_time(), 5.0);
    assert_eq!(seq.duration(), 10.0);
  }
}
