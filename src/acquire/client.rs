use super::identity::Identity;
use crate::error::{AcquisitionError, Result};
use dashmap::DashMap;
use reqwest::{redirect, Client, Proxy};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const REDIRECT_LIMIT: usize = 10;
const POOL_IDLE_TIMEOUT_SEC: u64 = 90;
const POOL_MAX_IDLE_PER_HOST: usize = 32;

/// Build a reqwest client that routes through the identity's proxy.
///
/// Cookies are kept so a session that picked some up (consent, csrf) looks
/// like the same browser on its next request.
pub(crate) fn build_client_for_identity(identity: &Identity, timeout: Duration) -> Result<Client> {
    let mut builder = Client::builder()
        .cookie_store(true)
        .redirect(redirect::Policy::limited(REDIRECT_LIMIT))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .pool_idle_timeout(Duration::from_secs(POOL_IDLE_TIMEOUT_SEC))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST);

    if let Some(proxy) = &identity.proxy {
        let proxy = Proxy::all(proxy)
            .map_err(|e| AcquisitionError::Client(format!("invalid proxy {proxy}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| AcquisitionError::Client(e.to_string()))
}

/// One client per identity, built on first use and shared afterwards.
pub struct ClientCache {
    clients: DashMap<String, Client>,
    timeout: Duration,
}

impl Default for ClientCache {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }
}

impl ClientCache {
    pub fn new(timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get or build the client for an identity.
    pub fn get(&self, identity: &Identity) -> Result<Client> {
        let key = identity.key();
        if let Some(client_ref) = self.clients.get(&key) {
            return Ok(client_ref.clone());
        }

        let client = build_client_for_identity(identity, self.timeout)?;
        self.clients.insert(key, client.clone());
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
