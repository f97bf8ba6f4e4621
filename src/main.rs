mod app;
mod clock;
mod config;
mod constants;
mod controller;
mod display;
mod frames;
mod glyph;
mod graphics;
mod highlight;
mod input;
mod logging;
mod media;
mod player;
mod progress;
mod segments;
mod speech;
mod ui;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};
use ratatui::{
  DefaultTerminal,
  crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
  },
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use app::App;
use config::Config;
use constants::constants;
use controller::{PlaybackController, PlaybackMode};
use display::CliColorMode;
use frames::FrameSequence;
use highlight::{HighlightIndex, JsonFileStore, KeyValueStore, MemoryStore};
use media::{MediaTrack, SpeechSynth, VideoSource};
use player::MpvTrack;
use segments::SegmentIndex;
use speech::{CommandSpeech, SpeechEngine};

// --- CLI ---

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliPlaybackMode {
  Mv,
  Narration,
}

impl From<CliPlaybackMode> for PlaybackMode {
  fn from(mode: CliPlaybackMode) -> Self {
    match mode {
      CliPlaybackMode::Mv => PlaybackMode::MusicVideo,
      CliPlaybackMode::Narration => PlaybackMode::Narration,
    }
  }
}

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Video file rendered as a glyph grid
  #[arg(short, long, required_unless_present = "completions")]
  video: Option<PathBuf>,

  /// Caption text with optional `[m:ss] title` marker lines
  #[arg(short, long, required_unless_present = "completions")]
  captions: Option<PathBuf>,

  /// Music track for MV mode (default: the video's own audio)
  #[arg(short, long)]
  audio: Option<PathBuf>,

  /// Playback mode at startup (default: last used)
  #[arg(short, long)]
  mode: Option<CliPlaybackMode>,

  /// Speech engine: 'auto', 'espeak-ng', 'say' or 'none'
  #[arg(long)]
  speech: Option<String>,

  /// Color mode: 'auto', 'truecolor' or '256'
  #[arg(long)]
  color: Option<CliColorMode>,

  /// Print shell completions and exit
  #[arg(long, value_name = "SHELL")]
  completions: Option<clap_complete::Shell>,
}

// --- Startup ---

/// Load every collaborator. Failures that only disable one output are
/// collected as warnings instead of aborting.
async fn build_app(args: Args, warnings: &mut Vec<String>) -> Result<App> {
  let config = Config::load();
  let c = constants();

  let captions_path = args.captions.context("--captions is required")?;
  let video_path = args.video.context("--video is required")?;

  let text = std::fs::read_to_string(&captions_path)
    .with_context(|| format!("Failed to read captions from {}", captions_path.display()))?;
  let segments = SegmentIndex::parse(&text);
  info!(path = %captions_path.display(), segments = segments.len(), "captions loaded");

  let store: Box<dyn KeyValueStore> = match JsonFileStore::in_data_dir() {
    Some(store) => {
      info!(path = %store.path().display(), "highlight store");
      Box::new(store)
    }
    None => {
      warn!("no data directory, highlights will not persist");
      Box::new(MemoryStore::default())
    }
  };
  let highlights = HighlightIndex::load(segments.full_text(), store, c.highlight_store_key.as_str());

  let video: Option<Box<dyn VideoSource>> =
    match FrameSequence::extract(&video_path, c.frame_extract_fps, c.frame_extract_width).await {
      Ok(seq) => Some(Box::new(seq)),
      Err(e) => {
        error!(err = %e, "video unavailable");
        warnings.push(format!("Video: {:#}", e));
        None
      }
    };

  let audio_path = args.audio.unwrap_or_else(|| video_path.clone());
  let audio: Option<Box<dyn MediaTrack>> = match MpvTrack::spawn(&audio_path).await {
    Ok(track) => Some(Box::new(track)),
    Err(e) => {
      warn!(err = %e, "audio unavailable");
      warnings.push(format!("Audio: {:#}", e));
      None
    }
  };

  let engine_name = args.speech.or_else(|| config.speech_engine.clone()).unwrap_or_else(|| "auto".to_string());
  let speech: Option<Box<dyn SpeechSynth>> = match SpeechEngine::from_config(&engine_name) {
    Some(engine) => match CommandSpeech::detect(engine).await {
      Ok(s) => Some(Box::new(s)),
      Err(e) => {
        warn!(err = %e, "speech unavailable");
        warnings.push(format!("Speech: {:#}", e));
        None
      }
    },
    None => {
      info!("speech disabled");
      None
    }
  };

  let mode = args
    .mode
    .map(PlaybackMode::from)
    .or_else(|| config.playback_mode.as_deref().map(PlaybackMode::from_config))
    .unwrap_or_default();
  let color_cli =
    args.color.or_else(|| config.color.as_deref().map(CliColorMode::from_config)).unwrap_or(CliColorMode::Auto);
  let color_mode = display::resolve_color_mode(color_cli);
  info!(mode = mode.label(), color = color_mode.label(), "startup options resolved");

  let controller = PlaybackController::new(mode, video, audio, speech);
  Ok(App::new(segments, highlights, controller, color_mode, config, Config::default_path()))
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(shell) = args.completions {
    clap_complete::generate(shell, &mut Args::command(), "glyphreel", &mut std::io::stdout());
    return Ok(());
  }

  logging::init_logging()?;

  let mut warnings = Vec::new();
  let mut app = build_app(args, &mut warnings).await?;
  if !warnings.is_empty() {
    app.set_error(warnings.join("; "));
  }

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  execute!(std::io::stdout(), EnableMouseCapture).context("Failed to enable mouse capture")?;
  let result = run(&mut terminal, app);
  let _ = execute!(std::io::stdout(), DisableMouseCapture);
  ratatui::restore();
  if let Err(ref e) = result {
    error!(err = %e, "exiting with error");
  }
  result
}

fn run(terminal: &mut DefaultTerminal, mut app: App) -> Result<()> {
  let frame_interval = Duration::from_secs_f64(1.0 / f64::from(constants().refresh_fps.max(1)));

  loop {
    let deadline = Instant::now() + frame_interval;
    app.tick();
    terminal.draw(|frame| ui::ui(frame, &mut app))?;

    // Handle input until the next refresh is due.
    loop {
      let remaining = deadline.saturating_duration_since(Instant::now());
      if remaining.is_zero() || !event::poll(remaining)? {
        break;
      }
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => input::handle_key_event(&mut app, key),
        Event::Mouse(mouse) => input::handle_mouse_event(&mut app, mouse),
        _ => {}
      }
      if app.should_quit {
        break;
      }
    }

    if app.should_quit {
      break;
    }
  }

  info!("quit requested");
  Ok(())
}
