use super::{accept_media, get_text, is_login_redirect, ExtractionStrategy};
use crate::acquire::classify::{
    classify_body, classify_status, classify_transport, find_marker, retry_after, BLOCK_MARKERS,
    RATE_LIMIT_MARKERS,
};
use crate::acquire::client::build_client_for_identity;
use crate::acquire::extract::from_api_json;
use crate::acquire::headers::api_headers_for_identity;
use crate::acquire::identity::Identity;
use crate::acquire::target::Target;
use crate::acquire::types::{AttemptOutcome, FatalCause, StrategyKind};
use crate::config::Credentials;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER, SET_COOKIE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Logged-in client: slowest and most invasive, last in the chain.
///
/// Sessions live in memory only, one per identity, and are dropped as soon
/// as the origin rejects them.
pub struct AuthenticatedClient {
    credentials: Credentials,
    web_base: String,
    timeout: Duration,
    sessions: DashMap<String, Client>,
}

impl AuthenticatedClient {
    pub fn new(credentials: Credentials, web_base: &str, timeout: Duration) -> Self {
        Self {
            credentials,
            web_base: web_base.trim_end_matches('/').to_string(),
            timeout,
            sessions: DashMap::new(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    async fn session(&self, identity: &Identity) -> Result<Client, AttemptOutcome> {
        if let Some(client) = self.sessions.get(&identity.key()) {
            return Ok(client.clone());
        }

        let client = build_client_for_identity(identity, self.timeout)
            .map_err(|e| AttemptOutcome::TransientError(e.to_string()))?;
        self.login(&client, identity).await?;
        tracing::info!(identity = identity.id, "logged in");
        self.sessions.insert(identity.key(), client.clone());
        Ok(client)
    }

    async fn login(&self, client: &Client, identity: &Identity) -> Result<(), AttemptOutcome> {
        let login_page = format!("{}/accounts/login/", self.web_base);
        let page = client
            .get(&login_page)
            .headers(api_headers_for_identity(&identity.user_agent))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;
        if let Some(outcome) = classify_status(page.status(), page.headers(), "") {
            return Err(outcome);
        }
        let csrf = csrf_token(page.headers())
            .ok_or_else(|| AttemptOutcome::TransientError("login page set no csrf token".into()))?;

        let mut headers = api_headers_for_identity(&identity.user_agent);
        if let Ok(value) = HeaderValue::from_str(&csrf) {
            headers.insert(HeaderName::from_static("x-csrftoken"), value);
        }
        if let Ok(value) = HeaderValue::from_str(&login_page) {
            headers.insert(REFERER, value);
        }

        let enc_password = format!(
            "#PWD_INSTAGRAM_BROWSER:0:{}:{}",
            Utc::now().timestamp(),
            self.credentials.password
        );
        let form = [
            ("username", self.credentials.username.as_str()),
            ("enc_password", enc_password.as_str()),
            ("queryParams", "{}"),
            ("optIntoOneTap", "false"),
        ];

        let response = client
            .post(format!("{}/api/v1/web/accounts/login/ajax/", self.web_base))
            .headers(headers)
            .form(&form)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| {
                AttemptOutcome::TransientError(format!("failed to read login response: {e}"))
            })?;

        classify_login(status, &response_headers, &body)
    }

    fn forget(&self, identity: &Identity) {
        self.sessions.remove(&identity.key());
    }
}

#[async_trait]
impl ExtractionStrategy for AuthenticatedClient {
    fn kind(&self) -> StrategyKind {
        StrategyKind::AuthenticatedClient
    }

    async fn resolve(&self, target: &Target, identity: &Identity) -> AttemptOutcome {
        let client = match self.session(identity).await {
            Ok(client) => client,
            Err(outcome) => return outcome,
        };

        let url = format!("{}?__a=1&__d=dis", target.post_url(&self.web_base));
        let headers = api_headers_for_identity(&identity.user_agent);
        let fetched = match get_text(&client, &url, headers).await {
            Ok(fetched) => fetched,
            Err(outcome) => return outcome,
        };

        if let Some(outcome) = fetched.status_outcome() {
            if matches!(outcome, AttemptOutcome::Blocked(_)) {
                self.forget(identity);
            }
            return outcome;
        }
        if is_login_redirect(&fetched.final_url) {
            self.forget(identity);
            return AttemptOutcome::Blocked("session no longer accepted".into());
        }

        match serde_json::from_str::<Value>(&fetched.body) {
            Ok(json) => match from_api_json(&json) {
                Some(media) => accept_media(target, media),
                None => classify_body(&fetched.body).unwrap_or_else(|| {
                    AttemptOutcome::TransientError("post json without media".into())
                }),
            },
            Err(_) => classify_body(&fetched.body).unwrap_or_else(|| {
                AttemptOutcome::TransientError("malformed post json".into())
            }),
        }
    }
}

/// `csrftoken` value from the response cookies.
fn csrf_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.trim().strip_prefix("csrftoken="))
        .find(|value| !value.is_empty())
        .map(String::from)
}

/// Map the login endpoint's answer onto an outcome; `Ok` means logged in.
pub(crate) fn classify_login(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> Result<(), AttemptOutcome> {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if json.get("two_factor_required").and_then(Value::as_bool) == Some(true) {
            return Err(AttemptOutcome::Fatal(FatalCause::TwoFactorRequired));
        }
        if json.get("authenticated").and_then(Value::as_bool) == Some(true) {
            return Ok(());
        }

        let message = json
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_ascii_lowercase();
        if let Some(marker) = find_marker(&message, &BLOCK_MARKERS) {
            return Err(AttemptOutcome::Blocked(marker.to_string()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS
            || find_marker(&message, &RATE_LIMIT_MARKERS).is_some()
        {
            return Err(AttemptOutcome::RateLimited(retry_after(headers)));
        }
        // Wrong passwords come back as 400 as often as 200.
        if json.get("user").and_then(Value::as_bool) == Some(false)
            || json.get("authenticated").and_then(Value::as_bool) == Some(false)
        {
            return Err(AttemptOutcome::Fatal(FatalCause::BadCredentials));
        }
    }

    if let Some(outcome) = classify_status(status, headers, body) {
        return Err(outcome);
    }
    Err(classify_body(body)
        .unwrap_or_else(|| AttemptOutcome::TransientError("unexpected login response".into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login(status: u16, body: &str) -> Result<(), AttemptOutcome> {
        classify_login(StatusCode::from_u16(status).unwrap(), &HeaderMap::new(), body)
    }

    #[test]
    fn login_outcomes() {
        assert_eq!(login(200, r#"{"authenticated":true,"user":true,"status":"ok"}"#), Ok(()));
        assert_eq!(
            login(200, r#"{"authenticated":false,"user":true,"status":"ok"}"#),
            Err(AttemptOutcome::Fatal(FatalCause::BadCredentials))
        );
        assert_eq!(
            login(200, r#"{"user":false,"authenticated":false,"status":"ok"}"#),
            Err(AttemptOutcome::Fatal(FatalCause::BadCredentials))
        );
        assert_eq!(
            login(400, r#"{"two_factor_required":true,"status":"fail"}"#),
            Err(AttemptOutcome::Fatal(FatalCause::TwoFactorRequired))
        );
        assert_eq!(
            login(400, r#"{"message":"checkpoint_required","status":"fail"}"#),
            Err(AttemptOutcome::Blocked("checkpoint_required".into()))
        );
        assert_eq!(
            login(400, r#"{"message":"Please wait a few minutes before you try again.","status":"fail"}"#),
            Err(AttemptOutcome::RateLimited(None))
        );
        assert_eq!(login(429, ""), Err(AttemptOutcome::RateLimited(None)));
        assert_eq!(
            login(
                400,
                r#"{"message":"Sorry, your password was incorrect. Please double-check your password.","status":"fail","user":true,"authenticated":false}"#
            ),
            Err(AttemptOutcome::Fatal(FatalCause::BadCredentials))
        );
        assert!(matches!(
            login(502, "<html>bad gateway</html>"),
            Err(AttemptOutcome::TransientError(_))
        ));
    }

    #[test]
    fn reads_csrf_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("mid=abc; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("csrftoken=tok123; Path=/; Secure"));
        assert_eq!(csrf_token(&headers).as_deref(), Some("tok123"));
        assert_eq!(csrf_token(&HeaderMap::new()), None);
    }
}
