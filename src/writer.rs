//! Persistence of fetched manifests under two output roots

use crate::error::{Error, Result};
use crate::types::{DepotId, ManifestId};
use crate::utils::write_atomic;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the artifact for a (depot, manifest) pair
pub fn artifact_file_name(depot: DepotId, manifest: &ManifestId) -> String {
    format!("{depot}_{manifest}.manifest")
}

/// Writes every artifact to both a primary and a secondary root
///
/// Both copies are byte-identical. Roots are created on demand and an existing file
/// with the same name is replaced.
#[derive(Clone, Debug)]
pub struct DualWriter {
    primary: PathBuf,
    secondary: PathBuf,
}

impl DualWriter {
    /// Create a writer for the given roots
    pub fn new(primary: impl Into<PathBuf>, secondary: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    /// Primary output root
    pub fn primary(&self) -> &Path {
        &self.primary
    }

    /// Secondary output root
    pub fn secondary(&self) -> &Path {
        &self.secondary
    }

    /// Write `bytes` as `{depot}_{manifest}.manifest` under both roots
    ///
    /// The primary copy is written first. A failure on the secondary leaves the
    /// primary copy in place.
    ///
    /// # Errors
    /// Returns [`Error::Persistence`] naming the first path that could not be
    /// created or written, or the would-be path when `manifest` is not
    /// [plain](ManifestId::is_plain) (nothing is written then).
    pub async fn write(
        &self,
        depot: DepotId,
        manifest: &ManifestId,
        bytes: &[u8],
    ) -> Result<[PathBuf; 2]> {
        let file_name = artifact_file_name(depot, manifest);
        if !manifest.is_plain() {
            return Err(Error::Persistence {
                path: self.primary.join(&file_name),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("manifest id {manifest:?} is not a plain file name component"),
                ),
            });
        }
        let primary = Self::write_one(&self.primary, &file_name, bytes).await?;
        let secondary = Self::write_one(&self.secondary, &file_name, bytes).await?;
        Ok([primary, secondary])
    }

    async fn write_one(root: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| Error::Persistence {
                path: root.to_path_buf(),
                source,
            })?;

        let path = root.join(file_name);
        write_atomic(&path, bytes)
            .await
            .map_err(|source| Error::Persistence {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), bytes = bytes.len(), "wrote manifest");
        Ok(path)
    }
}
