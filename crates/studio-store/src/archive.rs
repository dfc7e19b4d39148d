// ABOUTME: Local archive of raw provider outputs, one file per provider per aggregation round.
// ABOUTME: Failed outcomes are archived too, with their error, so every round is inspectable.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use studio_core::AggregationResult;
use ulid::Ulid;

use crate::StoreError;

/// Writes to `<root>/<key>/<provider>-<timestamp>-<round>.md`, where the
/// round id keeps rounds within the same second apart.
pub struct RawArchive {
    root: PathBuf,
}

impl RawArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Archive every outcome of one round. Returns the written paths in
    /// provider order.
    pub fn store(&self, key: &str, result: &AggregationResult) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.root.join(key);
        fs::create_dir_all(&dir)?;
        let stamp = format!(
            "{}-{}",
            Utc::now().format("%Y%m%d-%H%M%S"),
            Ulid::new().to_string().to_lowercase()
        );

        let mut written = Vec::with_capacity(result.len());
        for outcome in result.outcomes() {
            let path = dir.join(format!("{}-{stamp}.md", outcome.provider_id));
            let content = match &outcome.error {
                Some(error) => format!("ERROR: {error}\n"),
                None => outcome.text.clone(),
            };

            let tmp = path.with_extension("tmp");
            let mut file = File::create(&tmp)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            drop(file);
            fs::rename(&tmp, &path)?;

            written.push(path);
        }

        tracing::debug!(key, files = written.len(), dir = %dir.display(), "raw outputs archived");
        Ok(written)
    }
}
