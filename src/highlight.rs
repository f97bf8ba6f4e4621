//! Highlighted-word search over the caption corpus.
//!
//! A search term is matched as a whole word, case-insensitively, against the
//! full caption text. Terms that match at least once are remembered (lowercased)
//! and persisted through a [`KeyValueStore`] so they survive restarts.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use regex::RegexBuilder;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Minimal string key-value persistence, the shape of browser local storage.
pub trait KeyValueStore {
  fn get(&self, key: &str) -> Option<String>;
  fn set(&mut self, key: &str, value: &str) -> Result<()>;
  fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-process store. Used for tests and when no data directory is available.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
  entries: BTreeMap<String, String>,
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Option<String> {
    self.entries.get(key).cloned()
  }

  fn set(&mut self, key: &str, value: &str) -> Result<()> {
    self.entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&mut self, key: &str) -> Result<()> {
    self.entries.remove(key);
    Ok(())
  }
}

/// Store backed by a single JSON object file (`{"key": "value", ...}`).
///
/// The whole file is rewritten on every mutation; an unreadable file reads as empty.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
  path: PathBuf,
}

impl JsonFileStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// Store at `<data dir>/store.json` for this application, if a home directory exists.
  pub fn in_data_dir() -> Option<Self> {
    ProjectDirs::from("", "", "glyphreel").map(|dirs| Self::new(dirs.data_dir().join("store.json")))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn read_all(&self) -> BTreeMap<String, String> {
    let Ok(content) = std::fs::read_to_string(&self.path) else {
      return BTreeMap::new();
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
      warn!(path = %self.path.display(), err = %e, "store: unreadable store file, starting empty");
      BTreeMap::new()
    })
  }

  fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent).context("Failed to create store directory")?;
    }
    let content = serde_json::to_string_pretty(entries).context("Failed to serialize store")?;
    std::fs::write(&self.path, content).with_context(|| format!("Failed to write {}", self.path.display()))
  }
}

impl KeyValueStore for JsonFileStore {
  fn get(&self, key: &str) -> Option<String> {
    self.read_all().remove(key)
  }

  fn set(&mut self, key: &str, value: &str) -> Result<()> {
    let mut entries = self.read_all();
    entries.insert(key.to_string(), value.to_string());
    self.write_all(&entries)
  }

  fn remove(&mut self, key: &str) -> Result<()> {
    let mut entries = self.read_all();
    if entries.remove(key).is_some() {
      self.write_all(&entries)?;
    }
    Ok(())
  }
}

/// Result of a search submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
  pub matched: bool,
  pub count: usize,
}

impl MatchOutcome {
  const NONE: MatchOutcome = MatchOutcome { matched: false, count: 0 };
}

/// Count whole-word, case-insensitive occurrences of the literal `term` in `corpus`.
/// Word boundaries are Unicode-aware, so accented letters count as word characters.
pub fn count_whole_word(corpus: &str, term: &str) -> usize {
  let pattern = format!(r"\b{}\b", regex::escape(term));
  match RegexBuilder::new(&pattern).case_insensitive(true).build() {
    Ok(re) => re.find_iter(corpus).count(),
    Err(e) => {
      warn!(term = %term, err = %e, "search: failed to build pattern");
      0
    }
  }
}

/// The set of highlighted words plus the in-progress search term.
pub struct HighlightIndex {
  /// Lowercased words in insertion order; no duplicates.
  words: Vec<String>,
  current_term: Option<String>,
  corpus: String,
  store: Box<dyn KeyValueStore>,
  store_key: String,
}

impl HighlightIndex {
  /// Build the index over `corpus`, seeding the word set from `store`.
  /// Missing or corrupt persisted data yields an empty set.
  pub fn load(corpus: impl Into<String>, store: Box<dyn KeyValueStore>, store_key: impl Into<String>) -> Self {
    let store_key = store_key.into();
    let words = match store.get(&store_key) {
      Some(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(saved) => {
          let mut words: Vec<String> = Vec::with_capacity(saved.len());
          for w in saved.into_iter().map(|w| w.to_lowercase()) {
            if !words.contains(&w) {
              words.push(w);
            }
          }
          info!(count = words.len(), "search: highlight history loaded");
          words
        }
        Err(e) => {
          warn!(err = %e, "search: corrupt highlight history, ignoring");
          Vec::new()
        }
      },
      None => Vec::new(),
    };
    Self { words, current_term: None, corpus: corpus.into(), store, store_key }
  }

  /// Submit a search term. Empty input clears the current term.
  pub fn submit(&mut self, term: &str) -> MatchOutcome {
    let term = term.trim();
    if term.is_empty() {
      self.clear_current();
      return MatchOutcome::NONE;
    }

    self.current_term = Some(term.to_string());
    let count = count_whole_word(&self.corpus, term);
    if count == 0 {
      info!(term = %term, "search: no exact matches");
      return MatchOutcome::NONE;
    }

    info!(term = %term, count, "search: found exact matches");
    let word = term.to_lowercase();
    if !self.words.contains(&word) {
      self.words.push(word);
      self.persist();
    }
    MatchOutcome { matched: true, count }
  }

  pub fn is_highlighted(&self, token: &str) -> bool {
    if self.words.is_empty() {
      return false;
    }
    let token = token.to_lowercase();
    self.words.iter().any(|w| *w == token)
  }

  /// Forget the in-progress term; remembered words stay.
  pub fn clear_current(&mut self) {
    self.current_term = None;
    debug!("search: current term cleared");
  }

  /// Forget every remembered word and drop the persisted copy.
  pub fn clear_all(&mut self) {
    self.words.clear();
    self.current_term = None;
    if let Err(e) = self.store.remove(&self.store_key) {
      warn!(err = %e, "search: failed to clear highlight history");
    }
    info!("search: all highlights cleared");
  }

  pub fn words(&self) -> &[String] {
    &self.words
  }

  pub fn current_term(&self) -> Option<&str> {
    self.current_term.as_deref()
  }

  fn persist(&mut self) {
    let payload = match serde_json::to_string(&self.words) {
      Ok(p) => p,
      Err(e) => {
        warn!(err = %e, "search: failed to serialize highlight history");
        return;
      }
    };
    match self.store.set(&self.store_key, &payload) {
      Ok(()) => debug!(words = ?self.words, "search: highlight history saved"),
      Err(e) => warn!(err = %e, "search: failed to save highlight history"),
    }
  }
}
