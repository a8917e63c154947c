//! Run execution: selection, item loop, depot loop

use super::Pipeline;
use crate::error::{Error, Result};
use crate::types::{
    CooldownKind, DepotId, DepotOutcome, DepotReport, Event, Item, ItemId, ItemReport,
    ItemStatus, ManifestId, RunRequest, RunSummary,
};
use crate::utils::sleep_or_cancel;
use crate::writer::DualWriter;
use chrono::Utc;
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Keys of this length or shorter are rejected before any request is made
const MIN_API_KEY_LEN: usize = 10;

/// Per-run values threaded through the item and depot loops
struct RunContext<'a> {
    api_key: &'a str,
    writer: &'a DualWriter,
    cancel: &'a CancellationToken,
}

impl Pipeline {
    /// Process the items named in `request`, in request order
    ///
    /// Items are handled one at a time with the inter-item cooldown between them.
    /// Per-item and per-depot failures are recorded in the returned summary and do
    /// not stop the run. If `cancel` fires, the run stops at the next request or
    /// sleep and the partial summary is returned with `cancelled` set.
    ///
    /// # Errors
    /// Only setup failures are returned as errors:
    /// - [`Error::Config`] for a missing or too short API key, or identical roots
    /// - [`Error::NoItems`] for an empty selection or an empty descriptor directory
    /// - [`Error::NotFound`] for a missing descriptor directory or an unknown item id
    pub async fn run(&self, request: RunRequest, cancel: CancellationToken) -> Result<RunSummary> {
        if request.api_key.trim().len() <= MIN_API_KEY_LEN {
            return Err(Error::config(
                format!("API key must be longer than {MIN_API_KEY_LEN} characters"),
                "api_key",
            ));
        }
        if request.item_ids.is_empty() {
            return Err(Error::NoItems("no items selected".into()));
        }

        let writer = match &request.roots {
            Some([primary, secondary]) => DualWriter::new(primary, secondary),
            None => DualWriter::new(
                &self.config.output.primary_root,
                &self.config.output.secondary_root,
            ),
        };
        if writer.primary() == writer.secondary() {
            return Err(Error::config("output roots must differ", "roots"));
        }

        let discovered = self.discover().await?;
        let selected = select_items(discovered, &request.item_ids)?;

        let ctx = RunContext {
            api_key: request.api_key.trim(),
            writer: &writer,
            cancel: &cancel,
        };

        let started_at = Utc::now();
        let total = selected.len();
        let mut items = Vec::with_capacity(total);
        let mut cancelled = false;
        info!(
            items = total,
            primary = %writer.primary().display(),
            secondary = %writer.secondary().display(),
            "starting run"
        );

        for (index, item) in selected.iter().enumerate() {
            if index > 0 {
                let delay = self.config.cooldown.inter_item;
                info!(
                    next = %item.id,
                    seconds = delay.as_secs(),
                    "waiting before next item"
                );
                if self.cooldown(CooldownKind::BetweenItems, delay, &cancel).await.is_err() {
                    cancelled = true;
                    break;
                }
            }

            let name = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                name = self.names.lookup(item.id) => Some(name),
            };
            let report = match name {
                Some(name) => self.process_item(item, name, index, total, &ctx).await,
                None => {
                    let mut report = ItemReport::new(item.id, item.display_name());
                    report.status = ItemStatus::Cancelled;
                    report
                }
            };

            let stopped = report.status == ItemStatus::Cancelled;
            items.push(report);
            if stopped {
                cancelled = true;
                break;
            }
        }

        let summary = RunSummary {
            items,
            started_at,
            finished_at: Utc::now(),
            cancelled,
        };
        info!(
            attempted = summary.attempted(),
            succeeded = summary.succeeded(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            cancelled,
            "run finished"
        );
        self.emit(Event::RunFinished {
            succeeded: summary.succeeded(),
            failed: summary.failed(),
            cancelled,
        });
        Ok(summary)
    }

    /// Resolve and fetch every depot of one item
    ///
    /// Never fails: the outcome is carried in the report status.
    async fn process_item(
        &self,
        item: &Item,
        name: String,
        index: usize,
        total: usize,
        ctx: &RunContext<'_>,
    ) -> ItemReport {
        let mut report = ItemReport::new(item.id, name.clone());
        info!(
            item = %item.id,
            name = %name,
            position = index + 1,
            total,
            depots = item.depots.len(),
            "processing item"
        );
        self.emit(Event::ItemStarted {
            item: item.id,
            name,
            index,
            total,
        });

        if item.depots.is_empty() {
            warn!(item = %item.id, "no depots to fetch");
            report.status = ItemStatus::NoDepots;
            self.finish_item(&report);
            return report;
        }

        let resolved = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(Error::Cancelled),
            resolution = self.resolver.resolve(item.id, &item.depots) => resolution,
        };
        let resolution = match resolved {
            Ok(resolution) => resolution,
            Err(Error::Cancelled) => {
                report.status = ItemStatus::Cancelled;
                self.finish_item(&report);
                return report;
            }
            Err(e) => {
                error!(item = %item.id, error = %e, "skipping item");
                report.status = ItemStatus::ResolutionFailed {
                    error: e.to_string(),
                };
                self.finish_item(&report);
                return report;
            }
        };

        let count = resolution.manifests.len();
        for (position, (depot, manifest)) in resolution.manifests.iter().enumerate() {
            match self
                .process_depot(item.id, *depot, manifest.as_ref(), ctx)
                .await
            {
                Ok(depot_report) => report.depots.push(depot_report),
                Err(_) => {
                    report.status = ItemStatus::Cancelled;
                    break;
                }
            }
            info!(
                item = %item.id,
                attempted = report.attempted(),
                succeeded = report.succeeded(),
                skipped = report.skipped(),
                failed = report.failed(),
                "depot progress"
            );

            if position + 1 < count
                && self
                    .cooldown(
                        CooldownKind::BetweenDepots,
                        self.config.cooldown.inter_depot,
                        ctx.cancel,
                    )
                    .await
                    .is_err()
            {
                report.status = ItemStatus::Cancelled;
                break;
            }
        }

        self.finish_item(&report);
        report
    }

    /// Fetch and store one depot's manifest
    ///
    /// Only cancellation is returned as an error; every other failure becomes a
    /// [`DepotOutcome`].
    async fn process_depot(
        &self,
        item: ItemId,
        depot: DepotId,
        manifest: Option<&ManifestId>,
        ctx: &RunContext<'_>,
    ) -> Result<DepotReport> {
        let Some(manifest) = manifest else {
            info!(item = %item, depot = %depot, "no public manifest, skipping depot");
            self.emit(Event::ManifestMissing { item, depot });
            return Ok(DepotReport {
                depot,
                manifest: None,
                outcome: DepotOutcome::NoVersion,
            });
        };

        let fetched = self
            .fetcher
            .fetch(depot, manifest, ctx.api_key, ctx.cancel, &self.event_tx)
            .await;

        let outcome = match fetched {
            Ok(bytes) => match ctx.writer.write(depot, manifest, &bytes).await {
                Ok(paths) => {
                    info!(item = %item, depot = %depot, manifest = %manifest, "manifest stored");
                    self.emit(Event::DepotStored {
                        item,
                        depot,
                        manifest: manifest.clone(),
                    });
                    DepotOutcome::Stored {
                        paths: paths.to_vec(),
                    }
                }
                Err(e) => {
                    error!(item = %item, depot = %depot, error = %e, "failed to store manifest");
                    DepotOutcome::PersistFailed {
                        error: e.to_string(),
                    }
                }
            },
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(Error::RetrievalExhausted {
                attempts,
                last_error,
                ..
            }) => {
                error!(item = %item, depot = %depot, attempts, error = %last_error, "giving up on depot");
                DepotOutcome::Exhausted {
                    attempts,
                    last_error,
                }
            }
            Err(e) => {
                error!(item = %item, depot = %depot, error = %e, "giving up on depot");
                DepotOutcome::Exhausted {
                    attempts: 0,
                    last_error: e.to_string(),
                }
            }
        };

        match &outcome {
            DepotOutcome::Exhausted { last_error: error, .. }
            | DepotOutcome::PersistFailed { error } => self.emit(Event::DepotFailed {
                item,
                depot,
                error: error.clone(),
            }),
            DepotOutcome::Stored { .. } | DepotOutcome::NoVersion => {}
        }

        Ok(DepotReport {
            depot,
            manifest: Some(manifest.clone()),
            outcome,
        })
    }

    fn finish_item(&self, report: &ItemReport) {
        info!(
            item = %report.item,
            status = ?report.status,
            attempted = report.attempted(),
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed(),
            "item finished"
        );
        self.emit(Event::ItemFinished {
            item: report.item,
            status: report.status.clone(),
            attempted: report.attempted(),
            succeeded: report.succeeded(),
            skipped: report.skipped(),
            failed: report.failed(),
        });
    }

    async fn cooldown(
        &self,
        kind: CooldownKind,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.emit(Event::CooldownStarted {
            kind,
            delay_ms: delay.as_millis() as u64,
        });
        sleep_or_cancel(cancel, delay).await
    }
}

/// Pick the requested items out of the discovered ones, in request order
///
/// Repeated ids are processed once.
fn select_items(discovered: Vec<Item>, requested: &[ItemId]) -> Result<Vec<Item>> {
    let mut seen = HashSet::new();
    let mut selected = Vec::with_capacity(requested.len());
    for id in requested.iter().filter(|id| seen.insert(**id)) {
        let item = discovered
            .iter()
            .find(|item| item.id == *id)
            .ok_or_else(|| Error::NotFound(format!("no descriptor for item {id}")))?;
        selected.push(item.clone());
    }
    Ok(selected)
}
