//! Announces the local region to one neighbour and reads back what it discloses.
//!
//! Every way a call can go wrong is an [`AnnounceFailure`] scoped to that one
//! neighbour. Nothing here returns an error to the round driving it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::region::{DescriptorError, RegionDescriptor, RegionId};
use crate::reply::{decode_reply, ReplyError};
use crate::transport::{AnnounceTransport, TransportError};

/// Why a neighbour taught us nothing.
#[derive(Debug, thiserror::Error)]
pub enum AnnounceFailure {
    #[error("local region could not be packed: {0}")]
    Serialization(#[from] DescriptorError),

    #[error("neighbour unreachable: {0}")]
    Unreachable(#[from] TransportError),

    #[error("neighbour did not answer within {0:?}")]
    TimedOut(Duration),

    #[error("neighbour sent an empty reply")]
    EmptyReply,

    #[error("neighbour rejected the announcement")]
    Rejected,

    #[error("neighbour reply is malformed: {0}")]
    Malformed(#[from] ReplyError),
}

/// Result of announcing to one neighbour.
#[derive(Debug)]
pub enum AnnounceOutcome {
    /// The neighbour accepted and disclosed these regions.
    Informed(Vec<RegionDescriptor>),
    /// The neighbour accepted, but one disclosed entry could not be read.
    /// Regions before it are kept.
    Truncated {
        disclosed: Vec<RegionDescriptor>,
        key: String,
        error: DescriptorError,
    },
    Failed(AnnounceFailure),
}

impl AnnounceOutcome {
    /// Whether the neighbour accepted the announcement.
    pub fn is_informed(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    pub fn disclosed(&self) -> &[RegionDescriptor] {
        match self {
            Self::Informed(regions) | Self::Truncated { disclosed: regions, .. } => regions,
            Self::Failed(_) => &[],
        }
    }

    pub fn into_disclosed(self) -> Vec<RegionDescriptor> {
        match self {
            Self::Informed(regions) | Self::Truncated { disclosed: regions, .. } => regions,
            Self::Failed(_) => Vec::new(),
        }
    }

    pub fn failure(&self) -> Option<&AnnounceFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Performs one announcement call per neighbour, no retries.
pub struct NeighbourDispatcher {
    transport: Arc<dyn AnnounceTransport>,
    call_timeout: Duration,
}

impl NeighbourDispatcher {
    pub fn new(transport: Arc<dyn AnnounceTransport>, call_timeout: Duration) -> Self {
        Self {
            transport,
            call_timeout,
        }
    }

    /// Announce `local` to `neighbour` and return the regions it disclosed.
    pub async fn announce_to(
        &self,
        neighbour: &RegionDescriptor,
        local: &RegionDescriptor,
    ) -> Vec<RegionDescriptor> {
        self.announce(neighbour, local).await.into_disclosed()
    }

    /// Announce `local` to `neighbour`, keeping the reason when nothing was learned.
    pub async fn announce(
        &self,
        neighbour: &RegionDescriptor,
        local: &RegionDescriptor,
    ) -> AnnounceOutcome {
        let fields = match local.pack() {
            Ok(fields) => fields,
            Err(e) => {
                debug!(region = %local.id, error = %e, "Failed to pack local region");
                return AnnounceOutcome::Failed(e.into());
            }
        };

        let uri = neighbour.announce_uri(&local.id);
        debug!(region = %local.id, neighbour = %neighbour.id, uri = %uri, "Announcing region");

        let body = match tokio::time::timeout(
            self.call_timeout,
            self.transport.post_form(&uri, &fields),
        )
        .await
        {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                debug!(neighbour = %neighbour.id, error = %e, "Neighbour unreachable");
                return AnnounceOutcome::Failed(e.into());
            }
            Err(_) => {
                debug!(
                    neighbour = %neighbour.id,
                    timeout = ?self.call_timeout,
                    "Neighbour call timed out"
                );
                return AnnounceOutcome::Failed(AnnounceFailure::TimedOut(self.call_timeout));
            }
        };

        interpret_reply(&neighbour.id, &body)
    }
}

fn interpret_reply(neighbour: &RegionId, body: &str) -> AnnounceOutcome {
    if body.trim().is_empty() {
        return AnnounceOutcome::Failed(AnnounceFailure::EmptyReply);
    }

    let reply = match decode_reply(body) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(neighbour = %neighbour, error = %e, "Failed to read response from neighbour");
            return AnnounceOutcome::Failed(e.into());
        }
    };

    if !reply.success {
        debug!(neighbour = %neighbour, "Neighbour declined announcement");
        return AnnounceOutcome::Failed(AnnounceFailure::Rejected);
    }

    match reply.disclosed_until_malformed() {
        (disclosed, None) => {
            debug!(neighbour = %neighbour, disclosed = disclosed.len(), "Neighbour informed");
            AnnounceOutcome::Informed(disclosed)
        }
        (disclosed, Some((key, error))) => {
            warn!(
                neighbour = %neighbour,
                key = %key,
                error = %error,
                "Failed to read disclosed region from neighbour"
            );
            AnnounceOutcome::Truncated {
                disclosed,
                key,
                error,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockReply, MockTransport};
    use serde_json::json;

    fn local() -> RegionDescriptor {
        RegionDescriptor::new(RegionId::random(), "local.example.org", 9000).with_name("Local")
    }

    fn neighbour() -> RegionDescriptor {
        RegionDescriptor::new(RegionId::random(), "n1.example.org", 9001)
    }

    fn dispatcher(transport: &Arc<MockTransport>) -> NeighbourDispatcher {
        NeighbourDispatcher::new(transport.clone(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_posts_packed_region_to_announce_uri() {
        let transport = Arc::new(MockTransport::new());
        let (local, neighbour) = (local(), neighbour());

        dispatcher(&transport).announce_to(&neighbour, &local).await;

        let calls = transport.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].0,
            format!("http://n1.example.org:9001/region/{}/", local.id)
        );
        assert_eq!(calls[0].1, local.pack().unwrap());
    }

    #[tokio::test]
    async fn test_empty_reply_is_nothing_learned() {
        let transport = Arc::new(MockTransport::new());

        let outcome = dispatcher(&transport).announce(&neighbour(), &local()).await;

        assert!(matches!(outcome, AnnounceOutcome::Failed(AnnounceFailure::EmptyReply)));
        assert!(outcome.disclosed().is_empty());
    }

    #[tokio::test]
    async fn test_serialization_failure_skips_call() {
        let transport = Arc::new(MockTransport::new());
        let broken = RegionDescriptor::new(RegionId::random(), "", 9000);

        let outcome = dispatcher(&transport).announce(&neighbour(), &broken).await;

        assert!(matches!(
            outcome,
            AnnounceOutcome::Failed(AnnounceFailure::Serialization(
                DescriptorError::MissingHost(_)
            ))
        ));
        assert_eq!(transport.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_rejected_replies() {
        let transport = Arc::new(MockTransport::new());
        let (local, neighbour) = (local(), neighbour());
        let uri = neighbour.announce_uri(&local.id);
        let disclosed = json!({ "region_id": RegionId::random().to_string() });

        for body in [
            json!({ "success": false, "r": disclosed }),
            json!({ "r": disclosed }),
            json!({ "success": "0" }),
        ] {
            transport.reply_body(uri.clone(), body.to_string()).await;
            let outcome = dispatcher(&transport).announce(&neighbour, &local).await;
            assert!(matches!(outcome, AnnounceOutcome::Failed(AnnounceFailure::Rejected)));
        }
    }

    #[tokio::test]
    async fn test_undecodable_reply_is_malformed() {
        let transport = Arc::new(MockTransport::new());
        let (local, neighbour) = (local(), neighbour());
        transport
            .reply_body(neighbour.announce_uri(&local.id), "<html>busy</html>")
            .await;

        let outcome = dispatcher(&transport).announce(&neighbour, &local).await;

        assert!(matches!(outcome, AnnounceOutcome::Failed(AnnounceFailure::Malformed(_))));
    }

    #[tokio::test]
    async fn test_success_returns_one_region_per_nested_map() {
        let transport = Arc::new(MockTransport::new());
        let (local, neighbour) = (local(), neighbour());
        let (a, b) = (RegionId::random(), RegionId::random());
        let body = json!({
            "success": true,
            "regionB": {
                "region_id": b.to_string(),
                "external_host_name": "b",
                "http_port": "9100"
            },
            "note": "relayed",
            "regionA": { "region_id": a.to_string() }
        });
        transport
            .reply_body(neighbour.announce_uri(&local.id), body.to_string())
            .await;

        let disclosed = dispatcher(&transport).announce_to(&neighbour, &local).await;

        let ids: Vec<_> = disclosed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b, a]);
        assert_eq!(disclosed[0].http_port, 9100);
    }

    #[tokio::test]
    async fn test_malformed_disclosure_keeps_earlier_regions() {
        let transport = Arc::new(MockTransport::new());
        let (local, neighbour) = (local(), neighbour());
        let a = RegionId::random();
        let body = json!({
            "success": true,
            "regionA": { "region_id": a.to_string() },
            "regionB": { "region_id": "garbage" },
            "regionC": { "region_id": RegionId::random().to_string() }
        });
        transport
            .reply_body(neighbour.announce_uri(&local.id), body.to_string())
            .await;

        let outcome = dispatcher(&transport).announce(&neighbour, &local).await;

        assert!(outcome.is_informed());
        match outcome {
            AnnounceOutcome::Truncated { disclosed, key, .. } => {
                assert_eq!(key, "regionB");
                assert_eq!(disclosed.len(), 1);
                assert_eq!(disclosed[0].id, a);
            }
            other => panic!("expected truncated outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_unreachable() {
        let transport = Arc::new(MockTransport::new());
        let (local, neighbour) = (local(), neighbour());
        transport
            .reply(
                neighbour.announce_uri(&local.id),
                MockReply::Fail("connection refused".to_string()),
            )
            .await;

        let outcome = dispatcher(&transport).announce(&neighbour, &local).await;

        assert!(matches!(outcome, AnnounceOutcome::Failed(AnnounceFailure::Unreachable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_neighbour_times_out() {
        let transport = Arc::new(MockTransport::new());
        let (local, neighbour) = (local(), neighbour());
        transport
            .reply(
                neighbour.announce_uri(&local.id),
                MockReply::Delayed(Duration::from_secs(60), r#"{"success":true}"#.to_string()),
            )
            .await;

        let outcome = dispatcher(&transport).announce(&neighbour, &local).await;

        assert!(matches!(
            outcome,
            AnnounceOutcome::Failed(AnnounceFailure::TimedOut(d)) if d == Duration::from_secs(5)
        ));
    }
}
