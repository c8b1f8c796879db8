use super::profile::Platform;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};

/// Public web app id sent with JSON API requests.
pub(crate) const WEB_APP_ID: &str = "936619743392459";

/// Build the header map for a page request made by an identity, including User-Agent.
pub(crate) fn headers_for_identity(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (k, v) in header_pairs_for_platform(Platform::detect(user_agent)) {
        let name = HeaderName::from_lowercase(k.to_ascii_lowercase().as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static("accept"));
        if let Ok(val) = HeaderValue::from_str(v) {
            headers.insert(name, val);
        }
    }

    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent).unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
    );

    headers
}

/// Page headers plus the ones the JSON endpoints expect.
pub(crate) fn api_headers_for_identity(user_agent: &str) -> HeaderMap {
    let mut headers = headers_for_identity(user_agent);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, */*;q=0.8"));
    headers.insert(
        HeaderName::from_static("x-ig-app-id"),
        HeaderValue::from_static(WEB_APP_ID),
    );
    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    );
    headers
}

/// Header pairs for the given platform (without User-Agent).
fn header_pairs_for_platform(platform: Platform) -> Vec<(&'static str, &'static str)> {
    match platform {
        Platform::Minimal => vec![("Accept", "*/*")],
        Platform::Windows => vec![
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Upgrade-Insecure-Requests", "1"),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Ch-Ua", "\"Google Chrome\";v=\"131\", \"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\""),
            ("Sec-Ch-Ua-Mobile", "?0"),
            ("Sec-Ch-Ua-Platform", "\"Windows\""),
        ],
        Platform::MacOS => vec![
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Upgrade-Insecure-Requests", "1"),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
        ],
        Platform::IOS => vec![
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.5"),
            ("Dnt", "1"),
            ("Upgrade-Insecure-Requests", "1"),
        ],
        Platform::Android => vec![
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Upgrade-Insecure-Requests", "1"),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-User", "?1"),
            ("Sec-Ch-Ua-Mobile", "?1"),
            ("Sec-Ch-Ua-Platform", "\"Android\""),
        ],
    }
}
