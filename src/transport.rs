//! Outbound announcement transport.
//!
//! The dispatcher hands a target URI and the packed form fields to an
//! [`AnnounceTransport`] and gets back the reply body as text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

/// Errors from the outbound call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {uri}")]
    Status { uri: String, status: u16 },

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Posts a form to a neighbour and returns its reply body.
#[async_trait]
pub trait AnnounceTransport: Send + Sync {
    async fn post_form(
        &self,
        uri: &str,
        fields: &[(String, String)],
    ) -> Result<String, TransportError>;
}

/// `reqwest` backed transport sending `application/x-www-form-urlencoded` bodies.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AnnounceTransport for HttpTransport {
    async fn post_form(
        &self,
        uri: &str,
        fields: &[(String, String)],
    ) -> Result<String, TransportError> {
        let response = self.client.post(uri).form(fields).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        debug!(uri = %uri, bytes = body.len(), "Announcement reply received");
        Ok(body)
    }
}

pub mod mock {
    //! Scripted transport for tests.

    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::RwLock;

    use super::{AnnounceTransport, TransportError};

    /// What the mock does when a URI is called.
    #[derive(Debug, Clone)]
    pub enum MockReply {
        Body(String),
        Fail(String),
        /// Sleep before answering with the body.
        Delayed(Duration, String),
    }

    /// Records every call and answers from a script keyed by URI.
    ///
    /// Unscripted URIs answer with an empty body.
    #[derive(Default)]
    pub struct MockTransport {
        replies: RwLock<HashMap<String, MockReply>>,
        calls: RwLock<Vec<(String, Vec<(String, String)>)>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn reply(&self, uri: impl Into<String>, reply: MockReply) {
            self.replies.write().await.insert(uri.into(), reply);
        }

        pub async fn reply_body(&self, uri: impl Into<String>, body: impl Into<String>) {
            self.reply(uri, MockReply::Body(body.into())).await;
        }

        /// URIs called so far, in call order.
        pub async fn called_uris(&self) -> Vec<String> {
            self.calls
                .read()
                .await
                .iter()
                .map(|(uri, _)| uri.clone())
                .collect()
        }

        pub async fn calls(&self) -> Vec<(String, Vec<(String, String)>)> {
            self.calls.read().await.clone()
        }

        pub async fn call_count(&self) -> usize {
            self.calls.read().await.len()
        }
    }

    #[async_trait]
    impl AnnounceTransport for MockTransport {
        async fn post_form(
            &self,
            uri: &str,
            fields: &[(String, String)],
        ) -> Result<String, TransportError> {
            self.calls
                .write()
                .await
                .push((uri.to_string(), fields.to_vec()));

            let reply = self.replies.read().await.get(uri).cloned();
            match reply {
                None => Ok(String::new()),
                Some(MockReply::Body(body)) => Ok(body),
                Some(MockReply::Fail(message)) => Err(TransportError::Unavailable(message)),
                Some(MockReply::Delayed(delay, body)) => {
                    tokio::time::sleep(delay).await;
                    Ok(body)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockReply, MockTransport};
    use super::*;

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new(Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    async fn test_mock_records_calls_and_defaults_to_empty() {
        let transport = MockTransport::new();
        let fields = vec![("region_id".to_string(), "x".to_string())];

        let body = transport.post_form("http://a:1/region/x/", &fields).await.unwrap();

        assert!(body.is_empty());
        assert_eq!(transport.calls().await, vec![("http://a:1/region/x/".to_string(), fields)]);
    }

    #[tokio::test]
    async fn test_mock_scripted_failure() {
        let transport = MockTransport::new();
        transport
            .reply("http://a:1/", MockReply::Fail("refused".to_string()))
            .await;

        let result = transport.post_form("http://a:1/", &[]).await;

        assert!(matches!(result, Err(TransportError::Unavailable(_))));
        assert_eq!(transport.call_count().await, 1);
    }
}
