//! Acquisition pipeline split into focused submodules.
//!
//! The `Pipeline` struct and its methods are organized by stage:
//! - [`discovery`] - Descriptor scanning and name lookup for listings
//! - [`run`] - Item selection, cooldowns and the per-item / per-depot loop

mod discovery;
mod run;


use crate::config::Config;
use crate::error::Result;
use crate::names::NameLookup;
use crate::resolver::VersionResolver;
use crate::retrieval::ManifestFetcher;
use crate::scanner::DescriptorScanner;
use crate::types::Event;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the event channel; slow subscribers lag instead of blocking the run
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Sequential acquisition pipeline (cloneable - all components are cheap to clone)
#[derive(Clone)]
pub struct Pipeline {
    /// Configuration shared by all stages
    pub(crate) config: Arc<Config>,
    /// Descriptor discovery
    pub(crate) scanner: DescriptorScanner,
    /// Info service client
    pub(crate) resolver: VersionResolver,
    /// Manifest service client with retry budget
    pub(crate) fetcher: ManifestFetcher,
    /// Store service client for display names
    pub(crate) names: NameLookup,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl Pipeline {
    /// Validate `config` and build every stage from it
    ///
    /// # Errors
    /// Returns [`crate::Error::Config`] for unusable settings, or a network error if
    /// an HTTP client cannot be created.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let scanner = DescriptorScanner::new(config.scan.extension.clone())?;
        let resolver = VersionResolver::new(&config.services)?;
        let fetcher = ManifestFetcher::new(&config.services, config.retry.clone())?;
        let names = NameLookup::new(&config.services)?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            scanner,
            resolver,
            fetcher,
            names,
            event_tx,
        })
    }

    /// Subscribe to pipeline events
    ///
    /// Events emitted before the call are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configuration the pipeline was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
