//! Descriptor discovery
//!
//! Each descriptor file is named `{itemId}.{extension}` and contains calls of the
//! form `addappid(<depotId>, <flag>, "<hex key>")`. Only the first argument of each
//! call is kept. Files whose stem is not purely decimal are not items and are
//! skipped without comment.

use crate::error::{Error, Result};
use crate::types::{DepotId, Item, ItemId};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DEPOT_CALL_PATTERN: &str = r#"addappid\s*\(\s*(\d+)\s*,\s*\d+\s*,\s*"[a-fA-F0-9]+""#;

/// Scans a directory of descriptor files into [`Item`]s
#[derive(Clone, Debug)]
pub struct DescriptorScanner {
    pattern: Regex,
    extension: String,
}

impl DescriptorScanner {
    /// Create a scanner for files with the given extension (without the dot)
    pub fn new(extension: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(DEPOT_CALL_PATTERN).map_err(|e| Error::Config {
            message: format!("invalid depot pattern: {e}"),
            key: None,
        })?;
        Ok(Self {
            pattern,
            extension: extension.into(),
        })
    }

    /// Extract unique depot ids from descriptor content, in order of first appearance
    ///
    /// Captures that do not fit in a `u64` are ignored.
    pub fn extract_depot_ids(&self, content: &str) -> Vec<DepotId> {
        let mut seen = HashSet::new();
        self.pattern
            .captures_iter(content)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<DepotId>().ok())
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Item id encoded in a descriptor file name, if the name qualifies
    pub fn item_id_from_path(&self, path: &Path) -> Option<ItemId> {
        let ext = path.extension()?.to_str()?;
        if ext != self.extension {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        // Ids are positive and written without leading zeros
        if stem.is_empty() || stem.starts_with('0') || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok()
    }

    /// List every item in `dir`, sorted by id
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if `dir` does not exist or is not a directory.
    /// An empty directory yields an empty list; deciding whether that is fatal is up
    /// to the caller.
    pub async fn scan(&self, dir: &Path) -> Result<Vec<Item>> {
        match tokio::fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::NotFound(format!(
                    "descriptor path {} is not a directory",
                    dir.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "descriptor directory {} does not exist",
                    dir.display()
                )));
            }
            Err(e) => return Err(Error::Io(e)),
        }

        let mut candidates: Vec<(ItemId, PathBuf)> = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(id) = self.item_id_from_path(&path) else {
                continue;
            };
            if !entry.file_type().await?.is_file() {
                continue;
            }
            candidates.push((id, path));
        }
        candidates.sort_by_key(|(id, _)| *id);

        let mut items = Vec::with_capacity(candidates.len());
        for (id, path) in candidates {
            let depots = match tokio::fs::read(&path).await {
                Ok(bytes) => self.extract_depot_ids(&String::from_utf8_lossy(&bytes)),
                Err(e) => {
                    warn!(item = %id, path = %path.display(), error = %e, "failed to read descriptor");
                    Vec::new()
                }
            };
            debug!(item = %id, depots = depots.len(), "parsed descriptor");
            items.push(Item {
                id,
                name: None,
                descriptor: path,
                depots,
            });
        }

        info!(dir = %dir.display(), items = items.len(), "descriptor scan complete");
        Ok(items)
    }
}
