//! Region neighbour notification.
//!
//! When a region comes up it announces itself to every adjacent region so
//! both sides can hand avatars and objects across their shared border. Each
//! neighbour may answer with further regions it knows about.
//!
//! - [`region`]: region identity and announce-able attributes
//! - [`registry`]: which regions border which
//! - [`dispatcher`]: one announcement call to one neighbour
//! - [`notifier`]: one "region is up" round across all neighbours

pub mod config;
pub mod dispatcher;
pub mod notifier;
pub mod region;
pub mod registry;
pub mod reply;
pub mod transport;
pub mod utils;

pub use dispatcher::{AnnounceFailure, AnnounceOutcome, NeighbourDispatcher};
pub use notifier::{NeighbourNotifier, NeighbourResult, NotificationRound};
pub use region::{DescriptorError, RegionDescriptor, RegionId};
pub use registry::{InMemoryNeighbourRegistry, NeighbourSource};
