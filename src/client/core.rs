use super::headers::HeaderList;
use crate::auth::Authenticator;
use crate::streaming::{AudioSource, RecognizeOptions, SessionConfig, SessionEvents, StreamingSession};
use crate::transport::HttpTransport;
use crate::Result;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

/// Authenticated client for one service instance.
///
/// `Send + Sync`; share it behind an `Arc`. Default headers and the service URL
/// are swapped atomically, so concurrent calls always see a consistent snapshot.
pub struct ServiceClient {
    pub(crate) service_name: String,
    pub(crate) service_url: ArcSwap<String>,
    pub(crate) default_headers: ArcSwap<HeaderList>,
    pub(crate) authenticator: Arc<dyn Authenticator>,
    pub(crate) transport: HttpTransport,
    pub(crate) session_config: SessionConfig,
}

impl ServiceClient {
    pub fn builder(service_name: impl Into<String>) -> super::ServiceClientBuilder {
        super::ServiceClientBuilder::new(service_name)
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn service_url(&self) -> String {
        self.service_url.load().as_ref().clone()
    }

    pub fn set_service_url(&self, url: impl Into<String>) {
        let url = url.into();
        info!(service = %self.service_name, url = %url, "service URL replaced");
        self.service_url
            .store(Arc::new(url.trim_end_matches('/').to_string()));
    }

    /// Snapshot of the headers sent with every call.
    pub fn default_headers(&self) -> Arc<HeaderList> {
        self.default_headers.load_full()
    }

    /// Replace the default headers; in-flight calls keep the snapshot they took.
    pub fn set_default_headers(&self, headers: HeaderList) {
        self.default_headers.store(Arc::new(headers));
    }

    pub fn authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.authenticator
    }

    pub(crate) fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    /// Open a duplex recognition session against this service.
    pub async fn recognize_stream(
        &self,
        options: RecognizeOptions,
        source: AudioSource,
    ) -> Result<(StreamingSession, SessionEvents)> {
        StreamingSession::open(self, options, source).await
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service_name", &self.service_name)
            .field("service_url", &self.service_url())
            .field("auth", &self.authenticator.scheme())
            .finish()
    }
}
