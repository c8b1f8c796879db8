//! Identity Pool
//!
//! Network identities (user agent × optional proxy) with per-identity health.
//! Identities over the failure threshold sit out of rotation until every
//! identity is over it, at which point all counters reset.

use super::types::AttemptOutcome;
use crate::config::{default_user_agents, AcquireConfig};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// One network fingerprint presented to the origin.
///
/// Values handed out by the pool are snapshots; mutating them has no effect
/// on the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: usize,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub consecutive_failures: u32,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn new(id: usize, user_agent: impl Into<String>, proxy: Option<String>) -> Self {
        Self {
            id,
            user_agent: user_agent.into(),
            proxy,
            consecutive_failures: 0,
            last_used_at: None,
        }
    }

    /// Stable key for per-identity caches (clients, sessions).
    pub fn key(&self) -> String {
        format!(
            "{}|{}",
            self.proxy.as_deref().unwrap_or("direct"),
            self.user_agent
        )
    }
}

pub struct IdentityPool {
    identities: Mutex<Vec<Identity>>,
    failure_threshold: u32,
}

impl IdentityPool {
    /// Pool over the cartesian product of user agents × proxies.
    ///
    /// No proxies means direct connections; no user agents means the built-in set.
    pub fn new(user_agents: &[String], proxies: &[String], failure_threshold: u32) -> Self {
        let agents = if user_agents.is_empty() {
            default_user_agents()
        } else {
            user_agents.to_vec()
        };
        let routes: Vec<Option<String>> = if proxies.is_empty() {
            vec![None]
        } else {
            proxies.iter().cloned().map(Some).collect()
        };

        let mut identities = Vec::with_capacity(agents.len() * routes.len());
        for route in &routes {
            for ua in &agents {
                identities.push(Identity::new(identities.len(), ua.clone(), route.clone()));
            }
        }

        Self {
            identities: Mutex::new(identities),
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn from_config(cfg: &AcquireConfig) -> Self {
        Self::new(&cfg.user_agents, &cfg.proxies, cfg.failure_threshold)
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn len(&self) -> usize {
        self.identities.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.lock().is_empty()
    }

    /// Pick a healthy identity uniformly at random.
    ///
    /// When every identity is over the threshold all counters reset and the
    /// pick is made among all of them.
    pub fn next(&self) -> Identity {
        self.next_excluding(None)
    }

    /// Like [`next`](Self::next), but never hands back `avoid` while another
    /// candidate is available.
    pub fn next_excluding(&self, avoid: Option<usize>) -> Identity {
        let mut identities = self.identities.lock();
        let mut rng = rand::thread_rng();

        let mut candidates: Vec<usize> = identities
            .iter()
            .enumerate()
            .filter(|(_, identity)| identity.consecutive_failures < self.failure_threshold)
            .map(|(idx, _)| idx)
            .collect();

        if candidates.is_empty() {
            tracing::warn!(
                identities = identities.len(),
                "all identities over failure threshold, resetting pool"
            );
            for identity in identities.iter_mut() {
                identity.consecutive_failures = 0;
            }
            candidates = (0..identities.len()).collect();
        }
        if candidates.len() > 1 {
            candidates.retain(|&idx| Some(identities[idx].id) != avoid);
        }

        let idx = candidates.choose(&mut rng).copied().unwrap_or(0);
        identities[idx].clone()
    }

    /// Record the outcome of an attempt made with `identity`.
    pub fn report(&self, identity: &Identity, outcome: &AttemptOutcome) {
        let mut identities = self.identities.lock();
        let Some(entry) = identities.iter_mut().find(|i| i.id == identity.id) else {
            return;
        };

        if outcome.is_success() {
            entry.consecutive_failures = 0;
        } else if outcome.is_identity_failure() {
            entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        }
        entry.last_used_at = Some(Utc::now());
    }

    /// Copy of the current pool state.
    pub fn snapshot(&self) -> Vec<Identity> {
        self.identities.lock().clone()
    }
}
