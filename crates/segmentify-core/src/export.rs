//! History exporter. Turns a user's history window into a CSV artifact.
//!
//! Artifacts live under a root directory at
//! `{user_id}/{from}/{to}/history.csv`. Exporting the same key again replaces
//! the previous file. Rows are `user_id,slug,operation,timestamp` with an
//! RFC 3339 UTC timestamp and no header row.

use std::{
  fmt,
  path::{Path, PathBuf},
  sync::atomic::{AtomicU64, Ordering},
};

use chrono::SecondsFormat;
use serde::Serialize;

use crate::{
  Error, Result,
  history::{HistoryEvent, HistoryWindow, sort_chronologically},
  membership::UserId,
  store::SegmentStore,
};

pub const ARTIFACT_FILE_NAME: &str = "history.csv";

/// Disambiguates temporary files of concurrent exports for the same key.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

// ─── Locator ─────────────────────────────────────────────────────────────────

/// Path of an artifact relative to the exporter root, always `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ArtifactLocator(String);

impl ArtifactLocator {
  pub fn for_window(user_id: UserId, window: &HistoryWindow) -> Self {
    Self(format!(
      "{user_id}/{}/{}/{ARTIFACT_FILE_NAME}",
      window.from().format("%Y-%m-%d"),
      window.to().format("%Y-%m-%d"),
    ))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ArtifactLocator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── Exporter ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HistoryExporter {
  root: PathBuf,
}

impl HistoryExporter {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  /// Filesystem path of the artifact behind `locator`.
  pub fn resolve(&self, locator: &ArtifactLocator) -> PathBuf {
    locator
      .as_str()
      .split('/')
      .fold(self.root.clone(), |path, part| path.join(part))
  }

  /// Query `store` for the window, sort the events and persist them.
  ///
  /// `NoHistoryData` from the store is returned unchanged and no file is
  /// written.
  pub async fn export<S: SegmentStore>(
    &self,
    store: &S,
    user_id: UserId,
    window: HistoryWindow,
  ) -> Result<ArtifactLocator> {
    let mut events = store
      .history(user_id, window)
      .await
      .map_err(Into::<Error>::into)?;
    sort_chronologically(&mut events);

    let body = encode_csv(&events)?;
    let locator = ArtifactLocator::for_window(user_id, &window);
    self.write_artifact(&locator, &body).await?;

    tracing::info!(
      user_id,
      events = events.len(),
      artifact = %locator,
      "exported segment history"
    );
    Ok(locator)
  }

  /// Write through a temporary sibling and rename, so readers never observe
  /// a half-written artifact.
  async fn write_artifact(&self, locator: &ArtifactLocator, body: &[u8]) -> Result<()> {
    let path = self.resolve(locator);
    let dir = path.parent().unwrap_or(&self.root).to_path_buf();
    tokio::fs::create_dir_all(&dir).await?;

    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = dir.join(format!(".{ARTIFACT_FILE_NAME}.{}.{seq}.tmp", std::process::id()));
    tokio::fs::write(&tmp, body).await?;
    if let Err(e) = tokio::fs::rename(&tmp, &path).await {
      if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
        tracing::warn!(path = %tmp.display(), error = %cleanup, "failed to remove temporary artifact");
      }
      return Err(e.into());
    }
    Ok(())
  }
}

/// Serialise events as headerless CSV rows, in the given order.
pub fn encode_csv(events: &[HistoryEvent]) -> Result<Vec<u8>> {
  let mut writer = csv::WriterBuilder::new()
    .has_headers(false)
    .from_writer(Vec::new());
  for event in events {
    writer.write_record([
      event.user_id.to_string(),
      event.slug.clone(),
      event.operation.to_string(),
      event.at.to_rfc3339_opts(SecondsFormat::Secs, true),
    ])?;
  }
  writer
    .into_inner()
    .map_err(|e| Error::Io(e.into_error()))
}
