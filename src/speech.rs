//! Text-to-speech through a command-line engine.
//!
//! Each utterance is one engine subprocess. Pause and resume stop and
//! continue that process; completion is observed by polling its exit status.

use anyhow::{Context, Result, anyhow};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::media::{SpeechEvent, SpeechOptions, SpeechOutcome, SpeechSynth, UtteranceToken, Voice};

/// espeak-ng's normal rate in words per minute.
const ESPEAK_BASE_WPM: f32 = 175.0;
/// macOS `say` normal rate in words per minute.
const SAY_BASE_WPM: f32 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEngine {
  EspeakNg,
  Say,
}

impl SpeechEngine {
  /// Platform default: `say` on macOS, espeak-ng elsewhere.
  pub fn platform_default() -> Self {
    if cfg!(target_os = "macos") { SpeechEngine::Say } else { SpeechEngine::EspeakNg }
  }

  /// `None` for "none"/"off", which disables narration audio.
  pub fn from_config(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().as_str() {
      "none" | "off" => None,
      "say" => Some(SpeechEngine::Say),
      "espeak" | "espeak-ng" => Some(SpeechEngine::EspeakNg),
      _ => Some(Self::platform_default()),
    }
  }

  pub fn program(self) -> &'static str {
    match self {
      SpeechEngine::EspeakNg => "espeak-ng",
      SpeechEngine::Say => "say",
    }
  }

  /// Arguments for one utterance; the text itself is written to stdin.
  fn speak_args(self, options: &SpeechOptions) -> Vec<String> {
    let mut args = Vec::new();
    match self {
      SpeechEngine::EspeakNg => {
        args.push("--stdin".to_string());
        args.push(format!("-s{}", (ESPEAK_BASE_WPM * options.rate).round() as u32));
        args.push(format!("-p{}", (50.0 * options.pitch).round().clamp(0.0, 99.0) as u32));
        args.push(format!("-a{}", (100.0 * options.volume).round().clamp(0.0, 200.0) as u32));
        if let Some(ref v) = options.voice {
          args.push(format!("-v{}", v.lang));
        }
      }
      SpeechEngine::Say => {
        // `say` has no pitch or volume flags.
        args.push("-r".to_string());
        args.push(((SAY_BASE_WPM * options.rate).round() as u32).to_string());
        if let Some(ref v) = options.voice {
          args.push("-v".to_string());
          args.push(v.name.clone());
        }
      }
    }
    args
  }

  fn voices_args(self) -> &'static [&'static str] {
    match self {
      SpeechEngine::EspeakNg => &["--voices"],
      SpeechEngine::Say => &["-v", "?"],
    }
  }

  fn parse_voices(self, stdout: &str) -> Vec<Voice> {
    match self {
      SpeechEngine::EspeakNg => parse_espeak_voices(stdout),
      SpeechEngine::Say => parse_say_voices(stdout),
    }
  }
}

/// Parse `espeak-ng --voices`: a header row, then `Pty Language Age/Gender VoiceName File ...`.
fn parse_espeak_voices(stdout: &str) -> Vec<Voice> {
  stdout
    .lines()
    .skip(1)
    .filter_map(|line| {
      let fields: Vec<&str> = line.split_whitespace().collect();
      match fields.as_slice() {
        [_pty, lang, _age, name, ..] => Some(Voice { name: name.to_string(), lang: lang.to_string() }),
        _ => None,
      }
    })
    .collect()
}

/// Parse `say -v ?`: `Name   lang_REGION   # sample sentence`, names may contain spaces.
fn parse_say_voices(stdout: &str) -> Vec<Voice> {
  stdout
    .lines()
    .filter_map(|line| {
      let head = line.split('#').next()?.trim_end();
      let (name, lang) = head.rsplit_once(char::is_whitespace)?;
      let name = name.trim();
      if name.is_empty() || lang.is_empty() {
        return None;
      }
      Some(Voice { name: name.to_string(), lang: lang.to_string() })
    })
    .collect()
}

fn send_signal(child: &Child, signal: libc::c_int) {
  let Some(pid) = child.id() else { return };
  // Safety: `pid` belongs to a child we spawned and have not reaped yet.
  let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
  if rc != 0 {
    debug!(pid, signal, err = %std::io::Error::last_os_error(), "speech: signal failed");
  }
}

struct Utterance {
  token: UtteranceToken,
  child: Child,
}

pub struct CommandSpeech {
  engine: SpeechEngine,
  /// Executable and leading arguments; the engine's own flags follow.
  program: String,
  base_args: Vec<String>,
  voices: Vec<Voice>,
  current: Option<Utterance>,
  next_token: u64,
  paused: bool,
}

impl CommandSpeech {
  /// Query the engine's voice list. Fails when the engine binary is missing.
  pub async fn detect(engine: SpeechEngine) -> Result<Self> {
    let output = Command::new(engine.program())
      .args(engine.voices_args())
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::null())
      .output()
      .await
      .map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
          anyhow!("{} not found. Install espeak-ng (Linux) or use --speech say (macOS)", engine.program())
        } else {
          anyhow!(e).context(format!("Failed to execute {}", engine.program()))
        }
      })?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let voices = engine.parse_voices(&stdout);
    info!(engine = engine.program(), voices = voices.len(), "speech: engine ready");
    Ok(Self::with_program(engine, engine.program(), Vec::new(), voices))
  }

  fn with_program(engine: SpeechEngine, program: &str, base_args: Vec<String>, voices: Vec<Voice>) -> Self {
    Self { engine, program: program.to_string(), base_args, voices, current: None, next_token: 0, paused: false }
  }

  fn spawn(&self, text: &str, options: &SpeechOptions) -> Result<Child> {
    let mut child = Command::new(&self.program)
      .args(&self.base_args)
      .args(self.engine.speak_args(options))
      .stdin(Stdio::piped())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .kill_on_drop(true)
      .spawn()
      .with_context(|| format!("Failed to spawn {}", self.program))?;

    let mut stdin = child.stdin.take().context("Failed to open speech engine stdin")?;
    let text = text.to_string();
    tokio::spawn(async move {
      if let Err(e) = stdin.write_all(text.as_bytes()).await {
        debug!(err = %e, "speech: engine closed stdin early");
      }
      // Dropping stdin sends EOF, which starts synthesis.
    });
    Ok(child)
  }
}

impl SpeechSynth for CommandSpeech {
  fn speak(&mut self, text: &str, options: &SpeechOptions) -> Result<UtteranceToken> {
    self.cancel();
    let child = self.spawn(text, options)?;
    self.next_token += 1;
    let token = UtteranceToken(self.next_token);
    debug!(token = token.0, chars = text.chars().count(), "speech: utterance spawned");
    self.current = Some(Utterance { token, child });
    Ok(token)
  }

  fn cancel(&mut self) {
    if let Some(mut utt) = self.current.take() {
      if let Err(e) = utt.child.start_kill() {
        debug!(token = utt.token.0, err = %e, "speech: kill failed");
      }
    }
    self.paused = false;
  }

  fn pause(&mut self) {
    if let Some(ref utt) = self.current
      && !self.paused
    {
      send_signal(&utt.child, libc::SIGSTOP);
      self.paused = true;
    }
  }

  fn resume(&mut self) {
    if let Some(ref utt) = self.current
      && self.paused
    {
      send_signal(&utt.child, libc::SIGCONT);
    }
    self.paused = false;
  }

  fn voices(&self) -> Vec<Voice> {
    self.voices.clone()
  }

  fn poll_events(&mut self) -> Vec<SpeechEvent> {
    let Some(utt) = self.current.as_mut() else { return Vec::new() };
    let outcome = match utt.child.try_wait() {
      Ok(None) => return Vec::new(),
      Ok(Some(status)) if status.success() => SpeechOutcome::Ended,
      Ok(Some(status)) => SpeechOutcome::Failed(format!("{} exited with {status}", self.program)),
      Err(e) => {
        warn!(err = %e, "speech: could not poll engine");
        SpeechOutcome::Failed(e.to_string())
      }
    };
    let token = utt.token;
    self.current = None;
    vec![SpeechEvent { token, outcome }]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn options(voice: Option<Voice>) -> SpeechOptions {
    SpeechOptions { rate: 0.8, pitch: 1.0, volume: 1.0, voice }
  }

  #[test]
  fn espeak_args_scale_options() {
    let voice = Voice { name: "English_(Great_Britain)".into(), lang: "en-gb".into() };
    let args = SpeechEngine::EspeakNg.speak_args(&options(Some(voice)));
    assert_eq!(args, vec!["--stdin", "-s140", "-p50", "-a100", "-ven-gb"]);
  }

  #[test]
  fn say_args_use_voice_name() {
    let voice = Voice { name: "Bad News".into(), lang: "en_US".into() };
    let args = SpeechEngine::Say.speak_args(&options(Some(voice)));
    assert_eq!(args, vec!["-r", "144", "-v", "Bad News"]);
    assert_eq!(SpeechEngine::Say.speak_args(&options(None)), vec!["-r", "144"]);
  }

  #[test]
  fn parse_espeak_voice_table() {
    let out = "Pty Language       Age/Gender VoiceName          File                 Other Languages\n \
               5  af              --/M      Afrikaans          gmw/af\n \
               2  en-gb           --/M      English_(Great_Britain) gmw/en  (en 2)\n";
    let voices = parse_espeak_voices(out);
    assert_eq!(
      voices,
      vec![
        Voice { name: "Afrikaans".into(), lang: "af".into() },
        Voice { name: "English_(Great_Britain)".into(), lang: "en-gb".into() },
      ]
    );
  }

  #[test]
  fn parse_say_voice_list() {
    let out = "Alex                en_US    # Most people recognize me by my voice.\n\
               Amélie              fr_CA    # Bonjour, je m'appelle Amélie.\n\
               Bad News            en_US    # The light you see at the end of the tunnel.\n\n";
    let voices = parse_say_voices(out);
    assert_eq!(voices.len(), 3);
    assert_eq!(voices[1], Voice { name: "Amélie".into(), lang: "fr_CA".into() });
    assert_eq!(voices[2], Voice { name: "Bad News".into(), lang: "en_US".into() });
  }

  /// Stand-in engine: reads the utterance from stdin, then idles on "slow",
  /// fails on "fail" and otherwise exits cleanly. Engine flags land in `$@`.
  const FAKE_ENGINE: &str = r#"read -r text
case "$text" in
  slow*) exec sleep 30 ;;
  fail*) exit 3 ;;
esac
exit 0"#;

  fn fake_speech() -> CommandSpeech {
    let base_args = vec!["-c".to_string(), FAKE_ENGINE.to_string(), "fake-engine".to_string()];
    CommandSpeech::with_program(SpeechEngine::EspeakNg, "sh", base_args, Vec::new())
  }

  async fn next_events(speech: &mut CommandSpeech) -> Vec<SpeechEvent> {
    for _ in 0..200 {
      let events = speech.poll_events();
      if !events.is_empty() {
        return events;
      }
      tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    panic!("speech engine never finished");
  }

  #[tokio::test]
  async fn new_utterance_cancels_the_previous_one() {
    let mut speech = fake_speech();
    let first = speech.speak("slow first line", &options(None)).unwrap();
    let second = speech.speak("quick second line", &options(None)).unwrap();
    assert_ne!(first, second);

    let events = next_events(&mut speech).await;
    assert_eq!(events, vec![SpeechEvent { token: second, outcome: SpeechOutcome::Ended }]);
    assert!(speech.current.is_none());
    assert!(speech.poll_events().is_empty());
  }

  #[tokio::test]
  async fn pause_and_resume_track_the_running_utterance() {
    let mut speech = fake_speech();
    speech.pause();
    assert!(!speech.paused, "nothing to pause without an utterance");

    let token = speech.speak("slow line", &options(None)).unwrap();
    speech.pause();
    assert!(speech.paused);
    speech.pause();
    assert!(speech.paused);
    speech.resume();
    assert!(!speech.paused);
    assert!(speech.poll_events().is_empty());

    speech.pause();
    speech.cancel();
    assert!(!speech.paused);
    assert!(speech.current.is_none());
    assert!(speech.poll_events().is_empty());
    assert_eq!(token, UtteranceToken(1));
  }

  #[tokio::test]
  async fn engine_failure_is_reported_once() {
    let mut speech = fake_speech();
    let token = speech.speak("fail loudly", &options(None)).unwrap();
    let events = next_events(&mut speech).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].token, token);
    assert!(matches!(events[0].outcome, SpeechOutcome::Failed(_)));
    assert!(speech.poll_events().is_empty());
  }

  #[test]
  fn engine_from_config() {
    assert_eq!(SpeechEngine::from_config("say"), Some(SpeechEngine::Say));
    assert_eq!(SpeechEngine::from_config("espeak-ng"), Some(SpeechEngine::EspeakNg));
    assert_eq!(SpeechEngine::from_config("OFF"), None);
    assert_eq!(SpeechEngine::from_config("auto"), Some(SpeechEngine::platform_default()));
  }
}
