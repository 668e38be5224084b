//! region-announce: tell a region's neighbours that it is up
//!
//! Loads the local region and a static adjacency table from configuration,
//! announces the region to each neighbour over HTTP and logs which neighbours
//! were reached and which regions they disclosed.
//!
//! ## Configuration
//! - `--config <path>` or NEIGHBOURS_CONFIG: YAML file (see `region_neighbours::config`)
//! - NEIGHBOURS__NOTIFIER__CALL_TIMEOUT_MS, NEIGHBOURS__NOTIFIER__MAX_CONCURRENT_CALLS
//! - NEIGHBOURS_LOG: tracing filter (default: info)

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, warn};

use region_neighbours::config::{Config, ConfigError};
use region_neighbours::utils::bootstrap::{init_tracing, parse_config_path};
use region_neighbours::{InMemoryNeighbourRegistry, NeighbourNotifier};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let local = config
        .local_region
        .clone()
        .ok_or_else(|| ConfigError::Invalid("local_region is not configured".to_string()))?;

    let registry = Arc::new(InMemoryNeighbourRegistry::from_config(&config.neighbours));
    let notifier = NeighbourNotifier::with_http(registry, config.notifier.clone())?;

    info!(region = %local, "Announcing region to neighbours");
    let round = notifier.notify(&local, &HashSet::new()).await;

    for neighbour in round.reached() {
        info!(neighbour = %neighbour, "Neighbour informed");
    }
    for result in round.unreached() {
        if let Some(failure) = result.outcome.failure() {
            warn!(neighbour = %result.neighbour, reason = %failure, "Neighbour not informed");
        }
    }
    for region in round.disclosed() {
        info!(
            region = %region,
            host = %region.external_host,
            port = region.http_port,
            "Region disclosed"
        );
    }

    Ok(())
}
