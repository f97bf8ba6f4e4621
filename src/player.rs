use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::{
  io::AsyncWriteExt,
  net::UnixStream,
  process::{Child, Command},
  sync::mpsc,
  task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::clock::PlaybackClock;
use crate::frames::probe_duration;
use crate::media::MediaTrack;

/// How long the IPC writer keeps retrying while mpv creates its socket.
const CONNECT_ATTEMPTS: u32 = 50;
const CONNECT_BACKOFF: Duration = Duration::from_millis(100);

/// The subset of mpv IPC commands the audio track needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MpvCommand {
  SetPause(bool),
  SeekAbsolute(f64),
  /// mpv volume scale, 0..=100.
  SetVolume(f64),
}

impl MpvCommand {
  pub fn to_json(self) -> Value {
    match self {
      MpvCommand::SetPause(paused) => json!({ "command": ["set_property", "pause", paused] }),
      MpvCommand::SeekAbsolute(secs) => json!({ "command": ["seek", secs, "absolute"] }),
      MpvCommand::SetVolume(volume) => json!({ "command": ["set_property", "volume", volume] }),
    }
  }

  /// One newline-terminated IPC message.
  fn to_line(self) -> String {
    let mut line = self.to_json().to_string();
    line.push('\n');
    line
  }
}

/// mpv flags ahead of the media path. `--keep-open=yes` leaves mpv paused on
/// the last frame at end of file, so later seeks and plays still reach it.
fn mpv_args(socket_path: &Path) -> Vec<String> {
  vec![
    "--no-video".to_string(),
    "--pause".to_string(),
    "--keep-open=yes".to_string(),
    "--no-terminal".to_string(),
    format!("--input-ipc-server={}", socket_path.display()),
  ]
}

async fn connect(socket_path: &Path) -> Result<UnixStream> {
  let mut last_err = None;
  for _ in 0..CONNECT_ATTEMPTS {
    match UnixStream::connect(socket_path).await {
      Ok(stream) => return Ok(stream),
      Err(e) => last_err = Some(e),
    }
    tokio::time::sleep(CONNECT_BACKOFF).await;
  }
  Err(anyhow!("mpv IPC socket never came up: {:?}", last_err)).context("Failed to connect to mpv IPC socket")
}

/// Forward queued commands to mpv until the track is dropped.
async fn ipc_writer(socket_path: PathBuf, mut rx: mpsc::UnboundedReceiver<MpvCommand>) {
  let mut stream = match connect(&socket_path).await {
    Ok(stream) => stream,
    Err(e) => {
      warn!(err = %e, "mpv: IPC unavailable, audio commands dropped");
      return;
    }
  };
  debug!(socket = %socket_path.display(), "mpv: IPC connected");
  while let Some(cmd) = rx.recv().await {
    if let Err(e) = stream.write_all(cmd.to_line().as_bytes()).await {
      warn!(?cmd, err = %e, "mpv: IPC write failed");
      return;
    }
  }
}

/// Audio track played by an `mpv` subprocess, steered over its JSON IPC socket.
///
/// Position is tracked locally with a [`PlaybackClock`] mirroring the
/// commands sent, so reads never wait on mpv.
pub struct MpvTrack {
  child: Option<Child>,
  commands: mpsc::UnboundedSender<MpvCommand>,
  writer: JoinHandle<()>,
  socket_path: PathBuf,
  clock: PlaybackClock,
}

impl MpvTrack {
  /// Launch mpv paused on `path`.
  pub async fn spawn(path: &Path) -> Result<Self> {
    let duration = probe_duration(path).await.context("Failed to probe audio track")?;

    let socket_path = std::env::temp_dir().join(format!("glyphreel-mpv-{}.sock", std::process::id()));
    // Remove stale socket if it exists from a previous crash.
    let _ = std::fs::remove_file(&socket_path);

    let mut cmd = Command::new("mpv");
    cmd.args(mpv_args(&socket_path));
    cmd.arg(path);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    // Send stderr to null: if piped but never drained, the pipe buffer
    // fills and mpv blocks.
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!("mpv not found. Install it with: brew install mpv (macOS) or apt install mpv (Linux)")
      } else {
        anyhow!(e).context("Failed to spawn mpv process")
      }
    })?;

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(ipc_writer(socket_path.clone(), rx));
    info!(audio = %path.display(), duration, "mpv: audio track ready");

    Ok(Self { child: Some(child), commands: tx, writer, socket_path, clock: PlaybackClock::new(duration) })
  }

  fn send(&self, cmd: MpvCommand) {
    if self.commands.send(cmd).is_err() {
      debug!(?cmd, "mpv: IPC writer gone, command dropped");
    }
  }
}

impl MediaTrack for MpvTrack {
  fn play(&mut self) {
    self.clock.play();
    // The clock rewinds to zero when resumed at the end; mpv must follow.
    self.send(MpvCommand::SeekAbsolute(self.clock.position()));
    self.send(MpvCommand::SetPause(false));
  }

  fn pause(&mut self) {
    self.clock.pause();
    self.send(MpvCommand::SetPause(true));
  }

  fn seek(&mut self, secs: f64) {
    self.clock.seek(secs);
    self.send(MpvCommand::SeekAbsolute(self.clock.position()));
  }

  fn current_time(&self) -> f64 {
    self.clock.position()
  }

  fn duration(&self) -> f64 {
    self.clock.duration()
  }

  fn set_volume(&mut self, level: f32) {
    self.send(MpvCommand::SetVolume(f64::from(level.clamp(0.0, 1.0)) * 100.0));
  }

  fn take_ended(&mut self) -> bool {
    self.clock.take_ended()
  }
}

impl Drop for MpvTrack {
  fn drop(&mut self) {
    self.writer.abort();
    if let Some(mut child) = self.child.take() {
      let _ = child.start_kill();
    }
    let _ = std::fs::remove_file(&self.socket_path);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pause_command_json() {
    assert_eq!(MpvCommand::SetPause(true).to_json(), json!({ "command": ["set_property", "pause", true] }));
    assert_eq!(MpvCommand::SetPause(false).to_line(), "{\"command\":[\"set_property\",\"pause\",false]}\n");
  }

  #[test]
  fn seek_command_is_absolute() {
    assert_eq!(MpvCommand::SeekAbsolute(42.5).to_json(), json!({ "command": ["seek", 42.5, "absolute"] }));
  }

  #[test]
  fn volume_command_uses_mpv_scale() {
    assert_eq!(MpvCommand::SetVolume(60.0).to_json(), json!({ "command": ["set_property", "volume", 60.0] }));
  }

  #[test]
  fn mpv_stays_open_at_end_of_file() {
    let args = mpv_args(Path::new("/tmp/glyphreel-mpv-1.sock"));
    assert!(args.contains(&"--keep-open=yes".to_string()));
    assert!(!args.iter().any(|a| a == "--keep-open=no"));
    assert_eq!(args.last().map(String::as_str), Some("--input-ipc-server=/tmp/glyphreel-mpv-1.sock"));
  }

  /// Track wired to a bare channel instead of a running mpv.
  fn detached_track(duration: f64) -> (MpvTrack, mpsc::UnboundedReceiver<MpvCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let track = MpvTrack {
      child: None,
      commands: tx,
      writer: tokio::spawn(async {}),
      socket_path: std::env::temp_dir().join("glyphreel-mpv-test-unused.sock"),
      clock: PlaybackClock::new(duration),
    };
    (track, rx)
  }

  fn drain(rx: &mut mpsc::UnboundedReceiver<MpvCommand>) -> Vec<MpvCommand> {
    let mut out = Vec::new();
    while let Ok(cmd) = rx.try_recv() {
      out.push(cmd);
    }
    out
  }

  #[tokio::test]
  async fn play_from_the_end_rewinds_mpv_too() {
    let (mut track, mut rx) = detached_track(30.0);
    track.seek(30.0);
    drain(&mut rx);

    track.play();
    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 2);
    match sent[0] {
      MpvCommand::SeekAbsolute(secs) => assert!(secs < 1.0, "seek target {secs}"),
      other => panic!("expected a seek first, got {other:?}"),
    }
    assert_eq!(sent[1], MpvCommand::SetPause(false));
    assert!(track.current_time() < 1.0);
  }

  #[tokio::test]
  async fn play_mid_track_keeps_mpv_aligned() {
    let (mut track, mut rx) = detached_track(30.0);
    track.seek(12.0);
    drain(&mut rx);

    track.play();
    let sent = drain(&mut rx);
    match sent.first() {
      Some(MpvCommand::SeekAbsolute(secs)) => assert!((*secs - 12.0).abs() < 0.5, "seek target {secs}"),
      other => panic!("expected a seek first, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn writer_forwards_commands_over_socket() {
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::UnixListener;

    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("mpv.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(ipc_writer(socket.clone(), rx));
    tx.send(MpvCommand::SetPause(false)).unwrap();
    tx.send(MpvCommand::SeekAbsolute(3.0)).unwrap();

    let (stream, _) = listener.accept().await.unwrap();
    let mut lines = BufReader::new(stream).lines();
    let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    let second: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(first, MpvCommand::SetPause(false).to_json());
    assert_eq!(second, MpvCommand::SeekAbsolute(3.0).to_json());

    drop(tx);
    writer.await.unwrap();
  }
}
