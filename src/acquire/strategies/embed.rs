use super::{accept_media, client_for, get_text, is_login_redirect, ExtractionStrategy};
use crate::acquire::classify::classify_body;
use crate::acquire::client::ClientCache;
use crate::acquire::extract::from_embed_page;
use crate::acquire::headers::headers_for_identity;
use crate::acquire::identity::Identity;
use crate::acquire::target::Target;
use crate::acquire::types::{AttemptOutcome, StrategyKind};
use async_trait::async_trait;
use std::sync::Arc;

/// Public embed page; no login, lightest footprint.
pub struct EmbedPage {
    clients: Arc<ClientCache>,
    web_base: String,
}

impl EmbedPage {
    pub fn new(clients: Arc<ClientCache>, web_base: &str) -> Self {
        Self {
            clients,
            web_base: web_base.trim_end_matches('/').to_string(),
        }
    }

    fn embed_url(&self, target: &Target) -> String {
        format!("{}/p/{}/embed/captioned/", self.web_base, target.shortcode)
    }
}

#[async_trait]
impl ExtractionStrategy for EmbedPage {
    fn kind(&self) -> StrategyKind {
        StrategyKind::EmbedPage
    }

    async fn resolve(&self, target: &Target, identity: &Identity) -> AttemptOutcome {
        let client = match client_for(&self.clients, identity) {
            Ok(client) => client,
            Err(outcome) => return outcome,
        };
        let fetched = match get_text(
            &client,
            &self.embed_url(target),
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

        match from_embed_page(&fetched.body) {
            Some(media) => accept_media(target, media),
            None => classify_body(&fetched.body).unwrap_or_else(|| {
                AttemptOutcome::TransientError("embed page carried no media".into())
            }),
        }
    }
}
