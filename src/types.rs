//! Core types and events for manifest-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Create a new identifier
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the inner u64 value
            pub fn get(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

numeric_id!(
    /// Identifier of a top-level item (one descriptor file)
    ItemId
);

numeric_id!(
    /// Identifier of a depot referenced by an item's descriptor
    DepotId
);

/// Public manifest identifier ("gid") of a depot, treated as an opaque string
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub String);

impl ManifestId {
    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty and ASCII alphanumeric only, so it is safe inside a file name
    pub fn is_plain(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_alphanumeric())
    }
}

impl From<&str> for ManifestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ManifestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ManifestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display name used when the store lookup yields nothing
pub fn placeholder_name(id: ItemId) -> String {
    format!("AppID {id}")
}

/// An item discovered from a descriptor file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Item identifier, taken from the descriptor file name
    pub id: ItemId,
    /// Display name, filled in lazily by [`crate::names::NameLookup`]
    pub name: Option<String>,
    /// Descriptor file the item was discovered from
    pub descriptor: PathBuf,
    /// Unique depot ids in order of first appearance in the descriptor
    pub depots: Vec<DepotId>,
}

impl Item {
    /// Name to show to users, falling back to the placeholder
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| placeholder_name(self.id))
    }
}

/// Explicit description of one run, produced by whatever selection front-end is in use
#[derive(Clone)]
pub struct RunRequest {
    /// Items to process, in processing order
    pub item_ids: Vec<ItemId>,
    /// Key for the manifest service
    pub api_key: String,
    /// Output roots overriding the configured ones
    pub roots: Option<[PathBuf; 2]>,
}

impl RunRequest {
    /// Create a request using the configured output roots
    pub fn new(item_ids: Vec<ItemId>, api_key: impl Into<String>) -> Self {
        Self {
            item_ids,
            api_key: api_key.into(),
            roots: None,
        }
    }

    /// Override the configured output roots for this run
    pub fn with_roots(mut self, primary: impl Into<PathBuf>, secondary: impl Into<PathBuf>) -> Self {
        self.roots = Some([primary.into(), secondary.into()]);
        self
    }
}

// The key never ends up in logs
impl std::fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRequest")
            .field("item_ids", &self.item_ids)
            .field("api_key", &"<redacted>")
            .field("roots", &self.roots)
            .finish()
    }
}

/// What happened to a single depot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DepotOutcome {
    /// Manifest fetched and written to both roots
    Stored {
        /// The two written files
        paths: Vec<PathBuf>,
    },
    /// The info service has no public manifest for this depot
    NoVersion,
    /// The retry budget ran out
    Exhausted {
        /// Budget-consuming attempts made
        attempts: u32,
        /// Last status or transport error seen
        last_error: String,
    },
    /// Fetched, but at least one local write failed
    PersistFailed {
        /// Local failure description
        error: String,
    },
}

/// Outcome of one depot within an item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepotReport {
    /// Depot identifier
    pub depot: DepotId,
    /// Resolved manifest, if any
    pub manifest: Option<ManifestId>,
    /// What happened
    pub outcome: DepotOutcome,
}

/// Terminal state of an item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Every depot was visited
    Completed,
    /// The descriptor referenced no depots
    NoDepots,
    /// The info lookup failed; no depot was attempted
    ResolutionFailed {
        /// Failure description
        error: String,
    },
    /// The run was stopped while this item was in progress
    Cancelled,
}

/// Per-item result record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    /// Item identifier
    pub item: ItemId,
    /// Display name at processing time
    pub name: String,
    /// Terminal state
    pub status: ItemStatus,
    /// One entry per depot visited, in processing order
    pub depots: Vec<DepotReport>,
}

impl ItemReport {
    pub(crate) fn new(item: ItemId, name: String) -> Self {
        Self {
            item,
            name,
            status: ItemStatus::Completed,
            depots: Vec::new(),
        }
    }

    /// Depots that were visited
    pub fn attempted(&self) -> usize {
        self.depots.len()
    }

    /// Depots written to both roots
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, DepotOutcome::Stored { .. }))
    }

    /// Depots without a public manifest
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DepotOutcome::NoVersion))
    }

    /// Depots that exhausted retries or failed to persist
    pub fn failed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                DepotOutcome::Exhausted { .. } | DepotOutcome::PersistFailed { .. }
            )
        })
    }

    fn count(&self, pred: impl Fn(&DepotOutcome) -> bool) -> usize {
        self.depots.iter().filter(|d| pred(&d.outcome)).count()
    }
}

/// Aggregated result of a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    /// Per-item reports in processing order
    pub items: Vec<ItemReport>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished or was stopped
    pub finished_at: DateTime<Utc>,
    /// Whether the run was stopped before all items were processed
    pub cancelled: bool,
}

impl RunSummary {
    /// Total depots visited
    pub fn attempted(&self) -> usize {
        self.items.iter().map(ItemReport::attempted).sum()
    }

    /// Total depots written to both roots
    pub fn succeeded(&self) -> usize {
        self.items.iter().map(ItemReport::succeeded).sum()
    }

    /// Total depots without a public manifest
    pub fn skipped(&self) -> usize {
        self.items.iter().map(ItemReport::skipped).sum()
    }

    /// Total depots that failed
    pub fn failed(&self) -> usize {
        self.items.iter().map(ItemReport::failed).sum()
    }
}

/// Why the pipeline is waiting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownKind {
    /// Between two items
    BetweenItems,
    /// Between two depots of the same item
    BetweenDepots,
}

/// Event emitted during a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Descriptor scan finished
    ScanComplete {
        /// Number of items discovered
        items: usize,
    },

    /// Processing of an item started
    ItemStarted {
        /// Item identifier
        item: ItemId,
        /// Display name
        name: String,
        /// Zero-based position in the selection
        index: usize,
        /// Number of selected items
        total: usize,
    },

    /// A depot has no public manifest
    ManifestMissing {
        /// Item identifier
        item: ItemId,
        /// Depot identifier
        depot: DepotId,
    },

    /// The manifest service answered 429; waiting without spending retry budget
    RateLimited {
        /// Depot being fetched
        depot: DepotId,
        /// Backoff before the next request
        delay_ms: u64,
    },

    /// A fetch attempt failed and will be retried
    RetryScheduled {
        /// Depot being fetched
        depot: DepotId,
        /// Budget-consuming attempts so far
        attempt: u32,
        /// Remaining budget
        remaining: u32,
        /// Delay before the next request
        delay_ms: u64,
        /// Failure description
        error: String,
    },

    /// A manifest was written to both roots
    DepotStored {
        /// Item identifier
        item: ItemId,
        /// Depot identifier
        depot: DepotId,
        /// Manifest identifier
        manifest: ManifestId,
    },

    /// A depot failed (exhausted retries or local write failure)
    DepotFailed {
        /// Item identifier
        item: ItemId,
        /// Depot identifier
        depot: DepotId,
        /// Failure description
        error: String,
    },

    /// The pipeline is sleeping
    CooldownStarted {
        /// Why
        kind: CooldownKind,
        /// For how long
        delay_ms: u64,
    },

    /// An item reached a terminal state
    ItemFinished {
        /// Item identifier
        item: ItemId,
        /// Terminal state
        status: ItemStatus,
        /// Depots visited
        attempted: usize,
        /// Depots stored
        succeeded: usize,
        /// Depots without manifest
        skipped: usize,
        /// Depots failed
        failed: usize,
    },

    /// The run is over
    RunFinished {
        /// Total depots stored
        succeeded: usize,
        /// Total depots failed
        failed: usize,
        /// Whether the run was stopped early
        cancelled: bool,
    },
}
