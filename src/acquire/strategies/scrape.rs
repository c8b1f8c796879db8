use super::{accept_media, client_for, get_text, is_login_redirect, ExtractionStrategy};
use crate::acquire::classify::classify_body;
use crate::acquire::client::ClientCache;
use crate::acquire::extract::from_open_graph;
use crate::acquire::headers::headers_for_identity;
use crate::acquire::identity::Identity;
use crate::acquire::target::Target;
use crate::acquire::types::{AttemptOutcome, StrategyKind};
use async_trait::async_trait;
use std::sync::Arc;

/// Scrape the public post page's Open Graph tags.
pub struct DirectPageScrape {
    clients: Arc<ClientCache>,
    web_base: String,
}

impl DirectPageScrape {
    pub fn new(clients: Arc<ClientCache>, web_base: &str) -> Self {
        Self {
            clients,
            web_base: web_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for DirectPageScrape {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectPageScrape
    }

    async fn resolve(&self, target: &Target, identity: &Identity) -> AttemptOutcome {
        let client = match client_for(&self.clients, identity) {
            Ok(client) => client,
            Err(outcome) => return outcome,
        };
        let fetched = match get_text(
            &client,
            &target.post_url(&self.web_base),
            headers_for_identity(&identity.user_agent),
        )
        .await
        {
            Ok(fetched) => fetched,
            Err(outcome) => return outcome,
        };

        if let Some(outcome) = fetched.status_outcome() {
            return outcome;
        }
        if is_login_redirect(&fetched.final_url) {
            return AttemptOutcome::Blocked("redirected to login".into());
        }

        // Deleted/private pages still carry generic og tags, check them first
        if let Some(outcome @ AttemptOutcome::Fatal(_)) = classify_body(&fetched.body) {
            return outcome;
        }

        match from_open_graph(&fetched.body) {
            Some(media) => accept_media(target, media),
            None => classify_body(&fetched.body).unwrap_or_else(|| {
                AttemptOutcome::TransientError("post page carried no media tags".into())
            }),
        }
    }
}
