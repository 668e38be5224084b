//! Neighbour registry - which regions border which.
//!
//! The notifier only reads from here. Adjacency is written by whatever owns
//! the grid topology; every write swaps a whole neighbour list so a reader
//! always sees the snapshot that was current when it looked.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::StaticNeighbours;
use crate::region::{RegionDescriptor, RegionId};

/// Read surface the notifier depends on.
#[async_trait]
pub trait NeighbourSource: Send + Sync {
    /// Neighbours of `region` in registry order.
    ///
    /// Never fails; an unknown region has no neighbours.
    async fn neighbours(&self, region: &RegionId) -> Arc<[RegionDescriptor]>;
}

/// Thread-safe in-memory neighbour registry.
#[derive(Default)]
pub struct InMemoryNeighbourRegistry {
    neighbours: RwLock<HashMap<RegionId, Arc<[RegionDescriptor]>>>,
}

impl InMemoryNeighbourRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from static configuration.
    ///
    /// Entries whose region id does not parse are skipped.
    pub fn from_config(entries: &[StaticNeighbours]) -> Self {
        let mut table: HashMap<RegionId, Arc<[RegionDescriptor]>> =
            HashMap::with_capacity(entries.len());

        for entry in entries {
            let region = match entry.region.parse::<RegionId>() {
                Ok(id) => id,
                Err(e) => {
                    warn!(
                        region = %entry.region,
                        error = %e,
                        "Skipping neighbour entry with invalid region id"
                    );
                    continue;
                }
            };
            table.insert(region, Arc::from(entry.neighbours.clone()));
        }

        info!(regions = table.len(), "Neighbour registry seeded from config");
        Self {
            neighbours: RwLock::new(table),
        }
    }

    /// Replace the full neighbour list of a region.
    pub async fn set_neighbours(&self, region: RegionId, neighbours: Vec<RegionDescriptor>) {
        debug!(region = %region, count = neighbours.len(), "Setting neighbours");
        self.neighbours
            .write()
            .await
            .insert(region, Arc::from(neighbours));
    }

    /// Add a neighbour, replacing any existing entry with the same identity in place.
    pub async fn add_neighbour(&self, region: RegionId, neighbour: RegionDescriptor) {
        let mut table = self.neighbours.write().await;
        let mut list: Vec<RegionDescriptor> = table
            .get(&region)
            .map(|current| current.to_vec())
            .unwrap_or_default();

        match list.iter_mut().find(|n| **n == neighbour) {
            Some(existing) => *existing = neighbour,
            None => list.push(neighbour),
        }
        table.insert(region, Arc::from(list));
    }

    /// Remove one neighbour from a region's list. Returns whether it was present.
    pub async fn remove_neighbour(&self, region: &RegionId, neighbour: &RegionId) -> bool {
        let mut table = self.neighbours.write().await;
        let Some(current) = table.get(region) else {
            return false;
        };

        let remaining: Vec<RegionDescriptor> = current
            .iter()
            .filter(|n| n.id != *neighbour)
            .cloned()
            .collect();
        if remaining.len() == current.len() {
            return false;
        }
        table.insert(*region, Arc::from(remaining));
        true
    }

    /// Forget a region and all of its neighbours.
    pub async fn remove_region(&self, region: &RegionId) {
        info!(region = %region, "Removing region from neighbour registry");
        self.neighbours.write().await.remove(region);
    }

    /// Regions with a registered neighbour list.
    pub async fn regions(&self) -> Vec<RegionId> {
        self.neighbours.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.neighbours.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl NeighbourSource for InMemoryNeighbourRegistry {
    async fn neighbours(&self, region: &RegionId) -> Arc<[RegionDescriptor]> {
        self.neighbours
            .read()
            .await
            .get(region)
            .cloned()
            .unwrap_or_else(|| Vec::<RegionDescriptor>::new().into())
    }
}
