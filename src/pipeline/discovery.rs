//! Descriptor discovery for runs and listings

use super::Pipeline;
use crate::error::{Error, Result};
use crate::types::{Event, Item};
use tokio_util::sync::CancellationToken;
use tracing::warn;

impl Pipeline {
    /// Scan the configured descriptor directory
    ///
    /// # Errors
    /// - [`Error::NotFound`] if the directory is missing
    /// - [`Error::NoItems`] if it contains no descriptors
    pub async fn discover(&self) -> Result<Vec<Item>> {
        let dir = &self.config.scan.descriptor_dir;
        let items = self.scanner.scan(dir).await?;
        if items.is_empty() {
            return Err(Error::NoItems(format!(
                "no .{} descriptors in {}",
                self.config.scan.extension,
                dir.display()
            )));
        }

        for item in items.iter().filter(|i| i.depots.is_empty()) {
            warn!(item = %item.id, "descriptor references no depots");
        }
        self.emit(Event::ScanComplete { items: items.len() });
        Ok(items)
    }

    /// [`discover`](Self::discover), then fill in display names from the store
    ///
    /// Lookups run one at a time. If `cancel` fires, the remaining items keep
    /// `name: None` and the partial list is returned.
    pub async fn discover_with_names(&self, cancel: &CancellationToken) -> Result<Vec<Item>> {
        let mut items = self.discover().await?;
        for item in &mut items {
            let name = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                name = self.names.lookup(item.id) => Some(name),
            };
            match name {
                Some(name) => item.name = Some(name),
                None => break,
            }
        }
        Ok(items)
    }
}
