//! Drives one "region is up" event across every known neighbour.
//!
//! Neighbours the caller has already informed are skipped without a call.
//! Each remaining neighbour gets exactly one announcement; its outcome never
//! affects the others.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::config::NotifierConfig;
use crate::dispatcher::{AnnounceOutcome, NeighbourDispatcher};
use crate::region::{RegionDescriptor, RegionId};
use crate::registry::NeighbourSource;
use crate::transport::{AnnounceTransport, HttpTransport, TransportError};

/// One neighbour that was called, and what came of it.
#[derive(Debug)]
pub struct NeighbourResult {
    pub neighbour: RegionDescriptor,
    pub outcome: AnnounceOutcome,
}

/// Everything that happened in one notification round.
#[derive(Debug)]
pub struct NotificationRound {
    pub region: RegionId,
    /// Called neighbours, in registry order.
    pub results: Vec<NeighbourResult>,
    /// Neighbours skipped because the caller had already informed them.
    pub skipped: Vec<RegionDescriptor>,
    disclosed: Vec<RegionDescriptor>,
}

impl NotificationRound {
    /// Regions disclosed by neighbours, minus those the caller already informed.
    pub fn disclosed(&self) -> &[RegionDescriptor] {
        &self.disclosed
    }

    pub fn into_disclosed(self) -> Vec<RegionDescriptor> {
        self.disclosed
    }

    /// Neighbours that accepted the announcement.
    pub fn reached(&self) -> impl Iterator<Item = &RegionDescriptor> {
        self.results
            .iter()
            .filter(|r| r.outcome.is_informed())
            .map(|r| &r.neighbour)
    }

    /// Neighbours that were called but taught us nothing.
    pub fn unreached(&self) -> impl Iterator<Item = &NeighbourResult> {
        self.results.iter().filter(|r| !r.outcome.is_informed())
    }

    pub fn call_count(&self) -> usize {
        self.results.len()
    }
}

/// Announces a region to its neighbours.
pub struct NeighbourNotifier {
    registry: Arc<dyn NeighbourSource>,
    dispatcher: NeighbourDispatcher,
    config: NotifierConfig,
}

impl NeighbourNotifier {
    pub fn new(
        registry: Arc<dyn NeighbourSource>,
        transport: Arc<dyn AnnounceTransport>,
        config: NotifierConfig,
    ) -> Self {
        let dispatcher = NeighbourDispatcher::new(transport, config.call_timeout());
        Self {
            registry,
            dispatcher,
            config,
        }
    }

    /// Notifier calling neighbours over HTTP.
    pub fn with_http(
        registry: Arc<dyn NeighbourSource>,
        config: NotifierConfig,
    ) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(config.call_timeout())?;
        Ok(Self::new(registry, Arc::new(transport), config))
    }

    /// Tell every neighbour of `local` not in `already_informed` that it is up.
    ///
    /// Returns the regions those neighbours disclosed.
    pub async fn inform_neighbours(
        &self,
        local: &RegionDescriptor,
        already_informed: &HashSet<RegionDescriptor>,
    ) -> Vec<RegionDescriptor> {
        self.notify(local, already_informed).await.into_disclosed()
    }

    /// Like [`inform_neighbours`](Self::inform_neighbours), keeping every per-neighbour outcome.
    #[tracing::instrument(name = "neighbours.notify", skip_all, fields(region = %local.id))]
    pub async fn notify(
        &self,
        local: &RegionDescriptor,
        already_informed: &HashSet<RegionDescriptor>,
    ) -> NotificationRound {
        let neighbours = self.registry.neighbours(&local.id).await;

        let (skipped, to_call): (Vec<RegionDescriptor>, Vec<RegionDescriptor>) = neighbours
            .iter()
            .cloned()
            .partition(|n| already_informed.contains(n));

        if !skipped.is_empty() {
            debug!(skipped = skipped.len(), "Skipping neighbours already informed");
        }

        // buffered() yields in input order whatever the concurrency.
        let results: Vec<NeighbourResult> = stream::iter(to_call)
            .map(|neighbour| async move {
                let outcome = self.dispatcher.announce(&neighbour, local).await;
                NeighbourResult { neighbour, outcome }
            })
            .buffered(self.config.max_concurrent_calls.max(1))
            .collect()
            .await;

        let disclosed = self.aggregate(&results, already_informed);

        info!(
            neighbours = neighbours.len(),
            called = results.len(),
            reached = results.iter().filter(|r| r.outcome.is_informed()).count(),
            disclosed = disclosed.len(),
            "Neighbour notification round complete"
        );

        NotificationRound {
            region: local.id,
            results,
            skipped,
            disclosed,
        }
    }

    fn aggregate(
        &self,
        results: &[NeighbourResult],
        already_informed: &HashSet<RegionDescriptor>,
    ) -> Vec<RegionDescriptor> {
        let mut seen: HashSet<RegionId> = HashSet::new();
        results
            .iter()
            .flat_map(|r| r.outcome.disclosed())
            .filter(|region| !already_informed.contains(*region))
            .filter(|region| !self.config.dedupe_disclosures || seen.insert(region.id))
            .cloned()
            .collect()
    }
}
