//! Proxy adapters and groups.
//!
//! Only the surface the control layer needs is modelled: a name, a type, a
//! URL test and, for selectors, a mutable selection. Carrying traffic is the
//! transport's job.

use crate::error::{ProbeError, SelectError};
use crate::types::AdapterType;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Any entry in the proxy registry
#[async_trait]
pub trait ProxyAdapter: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    fn adapter_type(&self) -> AdapterType;

    /// Measure the round trip to `url` through this proxy.
    ///
    /// Callers bound this with their own deadline.
    async fn url_test(&self, url: &str) -> Result<Duration, ProbeError>;

    /// The selector view of this proxy, if it is one.
    fn as_selector(&self) -> Option<&Selector> {
        None
    }
}

/// Built-in adapter that connects without a proxy
pub struct DirectAdapter {
    name: String,
    client: Option<reqwest::Client>,
}

impl DirectAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .inspect_err(|e| warn!(proxy = %name, error = %e, "Failed to build HTTP client"))
            .ok();
        Self { name, client }
    }
}

#[async_trait]
impl ProxyAdapter for DirectAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Direct
    }

    async fn url_test(&self, url: &str) -> Result<Duration, ProbeError> {
        let Some(client) = &self.client else {
            return Err(ProbeError::Request("HTTP client unavailable".into()));
        };

        let start = Instant::now();
        match client.head(url).send().await {
            Ok(response) => {
                let duration = start.elapsed();
                debug!(url, status = response.status().as_u16(), duration_ms = duration.as_millis(),
                       "URL test successful");
                Ok(duration)
            }
            Err(e) => {
                warn!(url, error = %e, "URL test failed");
                Err(ProbeError::Request(e.to_string()))
            }
        }
    }
}

/// Built-in adapter that refuses everything
pub struct RejectAdapter {
    name: String,
}

impl RejectAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ProxyAdapter for RejectAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Reject
    }

    async fn url_test(&self, _url: &str) -> Result<Duration, ProbeError> {
        Err(ProbeError::Rejected(self.name.clone()))
    }
}

/// A protocol adapter declared under `proxies`
///
/// The protocol handshake lives in the transport, so the URL test here
/// measures the TCP handshake to the proxy server instead.
pub struct RemoteAdapter {
    name: String,
    protocol: String,
    server: String,
    port: u16,
}

impl RemoteAdapter {
    pub fn new(
        name: impl Into<String>,
        protocol: impl Into<String>,
        server: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            protocol: protocol.into(),
            server: server.into(),
            port,
        }
    }
}

#[async_trait]
impl ProxyAdapter for RemoteAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Remote(self.protocol.clone())
    }

    async fn url_test(&self, _url: &str) -> Result<Duration, ProbeError> {
        let start = Instant::now();
        match TcpStream::connect((self.server.as_str(), self.port)).await {
            Ok(_stream) => {
                let duration = start.elapsed();
                debug!(proxy = %self.name, duration_ms = duration.as_millis(), "Handshake successful");
                Ok(duration)
            }
            Err(e) => {
                warn!(proxy = %self.name, server = %self.server, error = %e, "Handshake failed");
                Err(ProbeError::Connect(e.to_string()))
            }
        }
    }
}

/// A group holding exactly one selected member, switchable at runtime
pub struct Selector {
    name: String,
    members: Vec<Arc<dyn ProxyAdapter>>,
    selected: AtomicUsize,
}

impl Selector {
    /// Create a selector. The first member starts selected.
    pub fn new(name: impl Into<String>, members: Vec<Arc<dyn ProxyAdapter>>) -> Self {
        Self {
            name: name.into(),
            members,
            selected: AtomicUsize::new(0),
        }
    }

    /// Name of the selected member
    pub fn selected(&self) -> &str {
        self.selected_adapter().map(|m| m.name()).unwrap_or_default()
    }

    /// Switch the selection to `member`.
    pub fn set(&self, member: &str) -> Result<(), SelectError> {
        match self.members.iter().position(|m| m.name() == member) {
            Some(index) => {
                self.selected.store(index, Ordering::Release);
                Ok(())
            }
            None => Err(SelectError::UnknownMember {
                group: self.name.clone(),
                member: member.to_string(),
            }),
        }
    }

    fn selected_adapter(&self) -> Option<&Arc<dyn ProxyAdapter>> {
        self.members.get(self.selected.load(Ordering::Acquire))
    }
}

#[async_trait]
impl ProxyAdapter for Selector {
    fn name(&self) -> &str {
        &self.name
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Selector
    }

    async fn url_test(&self, url: &str) -> Result<Duration, ProbeError> {
        match self.selected_adapter() {
            Some(member) => member.url_test(url).await,
            None => Err(ProbeError::Request(format!("group {} is empty", self.name))),
        }
    }

    fn as_selector(&self) -> Option<&Selector> {
        Some(self)
    }
}

/// Any non-selectable group (url-test, fallback, load-balance, relay)
///
/// Its choice of member is made by the engine, never by the host, so the
/// URL test goes through the first member.
pub struct StaticGroup {
    name: String,
    kind: AdapterType,
    members: Vec<Arc<dyn ProxyAdapter>>,
}

impl StaticGroup {
    pub fn new(name: impl Into<String>, kind: AdapterType, members: Vec<Arc<dyn ProxyAdapter>>) -> Self {
        Self {
            name: name.into(),
            kind,
            members,
        }
    }
}

#[async_trait]
impl ProxyAdapter for StaticGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn adapter_type(&self) -> AdapterType {
        self.kind.clone()
    }

    async fn url_test(&self, url: &str) -> Result<Duration, ProbeError> {
        match self.members.first() {
            Some(member) => member.url_test(url).await,
            None => Err(ProbeError::Request(format!("group {} is empty", self.name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn members(names: &[&str]) -> Vec<Arc<dyn ProxyAdapter>> {
        names
            .iter()
            .map(|n| Arc::new(RejectAdapter::new(*n)) as Arc<dyn ProxyAdapter>)
            .collect()
    }

    #[test]
    fn test_selector_starts_on_first_member() {
        let selector = Selector::new("g", members(&["a", "b"]));
        assert_eq!(selector.selected(), "a");
    }

    #[test]
    fn test_selector_set() {
        let selector = Selector::new("g", members(&["a", "b"]));
        assert!(selector.set("b").is_ok());
        assert_eq!(selector.selected(), "b");
    }

    #[test]
    fn test_selector_rejects_unknown_member() {
        let selector = Selector::new("g", members(&["a", "b"]));
        let err = selector.set("c").unwrap_err();
        assert_eq!(
            err,
            SelectError::UnknownMember {
                group: "g".into(),
                member: "c".into()
            }
        );
        assert_eq!(selector.selected(), "a");
    }

    #[test]
    fn test_only_selector_exposes_selector_view() {
        let selector = Selector::new("g", members(&["a"]));
        let group = StaticGroup::new("u", AdapterType::UrlTest, members(&["a"]));
        assert!(selector.as_selector().is_some());
        assert!(group.as_selector().is_none());
        assert!(RejectAdapter::new("r").as_selector().is_none());
    }

    #[tokio::test]
    async fn test_reject_always_fails() {
        let result = RejectAdapter::new("REJECT").url_test("http://example.com").await;
        assert_eq!(result, Err(ProbeError::Rejected("REJECT".into())));
    }

    #[tokio::test]
    async fn test_direct_client_serves_repeated_url_tests() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    while let Ok(n) = stream.read(&mut buf).await {
                        if n == 0 {
                            break;
                        }
                        let reply = b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n";
                        if stream.write_all(reply).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        let direct = DirectAdapter::new("DIRECT");
        assert!(direct.client.is_some());
        let url = format!("http://127.0.0.1:{}/", port);
        assert!(direct.url_test(&url).await.is_ok());
        assert!(direct.url_test(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_direct_unreachable_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let direct = DirectAdapter::new("DIRECT");
        let result = direct.url_test(&format!("http://127.0.0.1:{}/", port)).await;
        assert!(matches!(result, Err(ProbeError::Request(_))));
    }

    #[tokio::test]
    async fn test_remote_measures_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let adapter = RemoteAdapter::new("local", "ss", "127.0.0.1", port);

        let result = adapter.url_test("http://ignored").await;
        assert!(result.is_ok());
        assert_eq!(adapter.adapter_type(), AdapterType::Remote("ss".into()));
    }

    #[tokio::test]
    async fn test_selector_url_test_follows_selection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let reachable: Arc<dyn ProxyAdapter> =
            Arc::new(RemoteAdapter::new("up", "ss", "127.0.0.1", port));
        let rejecting: Arc<dyn ProxyAdapter> = Arc::new(RejectAdapter::new("down"));
        let selector = Selector::new("g", vec![rejecting, reachable]);

        assert!(selector.url_test("http://ignored").await.is_err());
        selector.set("up").unwrap();
        assert!(selector.url_test("http://ignored").await.is_ok());
    }
}
