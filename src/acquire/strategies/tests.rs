use super::*;
use crate::acquire::types::FatalCause;
use crate::config::Credentials;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn identity() -> Identity {
    Identity::new(0, UA, None)
}

fn clients() -> Arc<ClientCache> {
    Arc::new(ClientCache::new(Duration::from_secs(5)))
}

fn post() -> Target {
    Target::parse("https://www.instagram.com/p/ABC123/").unwrap()
}

fn reel() -> Target {
    Target::parse("https://www.instagram.com/reel/ABC123/").unwrap()
}

fn credentials() -> Credentials {
    Credentials {
        username: "alice".into(),
        password: "hunter2".into(),
    }
}

fn html(status: u16, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

fn json(status: u16, body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(body)
}

#[tokio::test]
async fn embed_resolves_photo() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/ABC123/embed/captioned/"))
        .and(header("user-agent", UA))
        .respond_with(html(
            200,
            r#"<html><body><img class="EmbeddedMediaImage" src="https://cdn.example/p.jpg"></body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let strategy = EmbedPage::new(clients(), &server.uri());
    let outcome = strategy.resolve(&post(), &identity()).await;
    assert_eq!(
        outcome,
        AttemptOutcome::Success(ResolvedMedia::new("https://cdn.example/p.jpg", MediaKind::Photo))
    );
}

#[tokio::test]
async fn embed_resolves_video_from_inline_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/ABC123/embed/captioned/"))
        .respond_with(html(
            200,
            r#"<script>{"display_url":"https:\/\/cdn.example\/t.jpg","video_url":"https:\/\/cdn.example\/v.mp4"}</script>"#,
        ))
        .mount(&server)
        .await;

    let strategy = EmbedPage::new(clients(), &server.uri());
    let outcome = strategy.resolve(&reel(), &identity()).await;
    assert_eq!(
        outcome,
        AttemptOutcome::Success(ResolvedMedia::new("https://cdn.example/v.mp4", MediaKind::Video))
    );
}

#[tokio::test]
async fn embed_thumbnail_for_reel_is_not_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/ABC123/embed/captioned/"))
        .respond_with(html(
            200,
            r#"<img class="EmbeddedMediaImage" src="https://cdn.example/thumb.jpg">"#,
        ))
        .mount(&server)
        .await;

    let strategy = EmbedPage::new(clients(), &server.uri());
    let outcome = strategy.resolve(&reel(), &identity()).await;
    assert!(matches!(outcome, AttemptOutcome::TransientError(_)), "{outcome}");
}

#[tokio::test]
async fn embed_status_classification() {
    let server = MockServer::start().await;
    let strategy = EmbedPage::new(clients(), &server.uri());

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    assert_eq!(
        strategy.resolve(&post(), &identity()).await,
        AttemptOutcome::RateLimited(Some(Duration::from_secs(30)))
    );

    Mock::given(method("GET"))
        .respond_with(html(403, "<html>Forbidden</html>"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    assert!(matches!(
        strategy.resolve(&post(), &identity()).await,
        AttemptOutcome::Blocked(_)
    ));

    Mock::given(method("GET"))
        .respond_with(html(404, "<html>Not Found</html>"))
        .mount(&server)
        .await;
    assert_eq!(
        strategy.resolve(&post(), &identity()).await,
        AttemptOutcome::Fatal(FatalCause::Unavailable)
    );
}

#[tokio::test]
async fn embed_login_wall_is_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/ABC123/embed/captioned/"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "location",
            format!("{}/accounts/login/?next=/p/ABC123/", server.uri()),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/accounts/login/"))
        .respond_with(html(200, "<html><body>Log in</body></html>"))
        .mount(&server)
        .await;

    let strategy = EmbedPage::new(clients(), &server.uri());
    assert!(matches!(
        strategy.resolve(&post(), &identity()).await,
        AttemptOutcome::Blocked(_)
    ));
}

#[tokio::test]
async fn oembed_skips_known_videos() {
    let strategy = OEmbedApi::new(
        clients(),
        "https://api.example/oembed/",
        "https://www.instagram.com",
    );
    assert!(strategy.supports(&post()));
    assert!(!strategy.supports(&reel()));
}

#[tokio::test]
async fn oembed_resolves_thumbnail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oembed/"))
        .and(query_param("url", "https://www.instagram.com/p/ABC123/"))
        .respond_with(json(
            200,
            serde_json::json!({"type": "rich", "thumbnail_url": "https://cdn.example/t.jpg"}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = format!("{}/oembed/", server.uri());
    let strategy = OEmbedApi::new(clients(), &endpoint, &server.uri());
    assert_eq!(
        strategy.resolve(&post(), &identity()).await,
        AttemptOutcome::Success(ResolvedMedia::new("https://cdn.example/t.jpg", MediaKind::Photo))
    );
}

#[tokio::test]
async fn oembed_html_challenge_is_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oembed/"))
        .respond_with(html(200, "<html>Please complete the CAPTCHA to continue</html>"))
        .mount(&server)
        .await;

    let endpoint = format!("{}/oembed/", server.uri());
    let strategy = OEmbedApi::new(clients(), &endpoint, &server.uri());
    assert_eq!(
        strategy.resolve(&post(), &identity()).await,
        AttemptOutcome::Blocked("please complete the captcha".into())
    );
}

#[tokio::test]
async fn scrape_reads_open_graph_video() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/ABC123/"))
        .respond_with(html(
            200,
            r#"<html><head>
                <meta property="og:image" content="https://cdn.example/poster.jpg">
                <meta property="og:video:secure_url" content="https://cdn.example/v.mp4">
            </head></html>"#,
        ))
        .mount(&server)
        .await;

    let strategy = DirectPageScrape::new(clients(), &server.uri());
    assert_eq!(
        strategy.resolve(&reel(), &identity()).await,
        AttemptOutcome::Success(ResolvedMedia::new("https://cdn.example/v.mp4", MediaKind::Video))
    );
}

#[tokio::test]
async fn scrape_unavailable_page_is_fatal_despite_og_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/ABC123/"))
        .respond_with(html(
            200,
            r#"<html><head><meta property="og:image" content="https://cdn.example/logo.png"></head>
               <body><h2>Sorry, this page isn't available.</h2></body></html>"#,
        ))
        .mount(&server)
        .await;

    let strategy = DirectPageScrape::new(clients(), &server.uri());
    assert_eq!(
        strategy.resolve(&post(), &identity()).await,
        AttemptOutcome::Fatal(FatalCause::Unavailable)
    );
}

async fn mount_login_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/accounts/login/"))
        .respond_with(
            html(200, "<html>login</html>")
                .append_header("set-cookie", "csrftoken=tok123; Path=/"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn authenticated_logs_in_once_and_resolves() {
    let server = MockServer::start().await;
    mount_login_page(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/web/accounts/login/ajax/"))
        .and(header("x-csrftoken", "tok123"))
        .and(body_string_contains("username=alice"))
        .and(body_string_contains("PWD_INSTAGRAM_BROWSER"))
        .respond_with(json(
            200,
            serde_json::json!({"authenticated": true, "user": true, "status": "ok"}),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/p/ABC123/"))
        .and(query_param("__a", "1"))
        .respond_with(json(
            200,
            serde_json::json!({
                "items": [{"video_versions": [{"url": "https://cdn.example/v.mp4"}]}]
            }),
        ))
        .expect(2)
        .mount(&server)
        .await;

    let strategy = AuthenticatedClient::new(credentials(), &server.uri(), Duration::from_secs(5));
    for _ in 0..2 {
        assert_eq!(
            strategy.resolve(&reel(), &identity()).await,
            AttemptOutcome::Success(ResolvedMedia::new(
                "https://cdn.example/v.mp4",
                MediaKind::Video
            ))
        );
    }
    assert_eq!(strategy.session_count(), 1);
}

#[tokio::test]
async fn authenticated_bad_credentials_are_fatal() {
    let server = MockServer::start().await;
    mount_login_page(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/web/accounts/login/ajax/"))
        .respond_with(json(
            400,
            serde_json::json!({
                "message": "Sorry, your password was incorrect. Please double-check your password.",
                "status": "fail",
                "user": true,
                "authenticated": false
            }),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let strategy = AuthenticatedClient::new(credentials(), &server.uri(), Duration::from_secs(5));
    assert_eq!(
        strategy.resolve(&post(), &identity()).await,
        AttemptOutcome::Fatal(FatalCause::BadCredentials)
    );
    assert_eq!(strategy.session_count(), 0);
}

#[tokio::test]
async fn authenticated_rejected_session_is_dropped() {
    let server = MockServer::start().await;
    mount_login_page(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/web/accounts/login/ajax/"))
        .respond_with(json(200, serde_json::json!({"authenticated": true})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/p/ABC123/"))
        .respond_with(json(401, serde_json::json!({"message": "login_required"})))
        .mount(&server)
        .await;

    let strategy = AuthenticatedClient::new(credentials(), &server.uri(), Duration::from_secs(5));
    assert!(matches!(
        strategy.resolve(&post(), &identity()).await,
        AttemptOutcome::Blocked(_)
    ));
    assert_eq!(strategy.session_count(), 0);
}

#[test]
fn chain_order_and_credentials() {
    let mut cfg = AcquireConfig::default();
    let names: Vec<_> = default_chain(&cfg, clients()).iter().map(|s| s.name()).collect();
    assert_eq!(names, ["embed-page", "oembed", "page-scrape"]);

    cfg.credentials = Some(credentials());
    let chain = default_chain(&cfg, clients());
    assert_eq!(chain.len(), 4);
    assert_eq!(chain[3].kind(), StrategyKind::AuthenticatedClient);
}
