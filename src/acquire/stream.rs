//! Media download.
//!
//! Once a strategy resolved a direct URL the bytes are streamed through the
//! identity that resolved it; CDN URLs are often bound to the requesting IP.

use super::client::ClientCache;
use super::headers::headers_for_identity;
use super::identity::Identity;
use super::types::ResolvedMedia;
use crate::error::{AcquisitionError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use std::pin::Pin;
use std::sync::Arc;

/// Byte stream handed to a [`MediaSink`](crate::sink::MediaSink).
pub type MediaStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Opens the byte stream behind a resolved media URL.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn open(&self, media: &ResolvedMedia, identity: &Identity) -> Result<MediaStream>;
}

/// Streams over HTTP with the identity's cached client.
pub struct HttpMediaFetcher {
    clients: Arc<ClientCache>,
}

impl HttpMediaFetcher {
    pub fn new(clients: Arc<ClientCache>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn open(&self, media: &ResolvedMedia, identity: &Identity) -> Result<MediaStream> {
        let client = self.clients.get(identity)?;
        let response = client
            .get(&media.source_url)
            .headers(headers_for_identity(&identity.user_agent))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AcquisitionError::Download(format!("{}: {e}", media.source_url)))?;

        tracing::debug!(
            url = %media.source_url,
            content_length = response.content_length(),
            "streaming media"
        );

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::types::MediaKind;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpMediaFetcher {
        HttpMediaFetcher::new(Arc::new(ClientCache::new(Duration::from_secs(5))))
    }

    #[tokio::test]
    async fn streams_body() {
        let server = MockServer::start().await;
        let payload = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/v.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&server)
            .await;

        let media = ResolvedMedia::new(format!("{}/v.mp4", server.uri()), MediaKind::Video);
        let identity = Identity::new(0, "test-agent", None);
        let chunks: Vec<Bytes> = fetcher()
            .open(&media, &identity)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), payload);
    }

    #[tokio::test]
    async fn error_status_is_download_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let media = ResolvedMedia::new(format!("{}/gone.jpg", server.uri()), MediaKind::Photo);
        let identity = Identity::new(0, "test-agent", None);
        let result = fetcher().open(&media, &identity).await;
        assert!(matches!(result, Err(AcquisitionError::Download(_))));
    }
}
