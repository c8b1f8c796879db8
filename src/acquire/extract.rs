//! Pattern extraction over known response shapes.
//!
//! Every function here is pure: text or JSON in, `ResolvedMedia` out. When the
//! origin changes its markup only this module needs to follow.

use super::types::{MediaKind, ResolvedMedia};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

static VIDEO_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""video_url"\s*:\s*"(https?://[^"]+)""#).expect("valid regex"));
static DISPLAY_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""display_url"\s*:\s*"(https?://[^"]+)""#).expect("valid regex"));

static EMBED_IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img.EmbeddedMediaImage").expect("valid selector"));
static EMBED_VIDEO: Lazy<Selector> =
    Lazy::new(|| Selector::parse("video[src]").expect("valid selector"));
static META_PROPERTY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[property][content]").expect("valid selector"));

/// Undo up to three levels of JSON string escaping (embed pages nest JSON in JSON).
pub(crate) fn unescape(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..3 {
        let next = current
            .replace("\\\\", "\\")
            .replace("\\\"", "\"")
            .replace("\\/", "/")
            .replace("\\u0026", "&");
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn http_url(candidate: &str) -> Option<String> {
    let trimmed = candidate.trim();
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        Some(trimmed.replace("&amp;", "&"))
    } else {
        None
    }
}

/// Embed page: escaped JSON blob first, then the rendered `<video>`/`<img>`.
pub fn from_embed_page(body: &str) -> Option<ResolvedMedia> {
    let text = unescape(body);

    if let Some(url) = VIDEO_URL.captures(&text).and_then(|c| http_url(&c[1])) {
        return Some(ResolvedMedia::new(url, MediaKind::Video));
    }
    if let Some(url) = DISPLAY_URL.captures(&text).and_then(|c| http_url(&c[1])) {
        return Some(ResolvedMedia::new(url, MediaKind::Photo));
    }

    let document = Html::parse_document(body);
    if let Some(url) = document
        .select(&EMBED_VIDEO)
        .filter_map(|el| el.value().attr("src"))
        .find_map(http_url)
    {
        return Some(ResolvedMedia::new(url, MediaKind::Video));
    }
    document
        .select(&EMBED_IMAGE)
        .filter_map(|el| el.value().attr("src"))
        .find_map(http_url)
        .map(|url| ResolvedMedia::new(url, MediaKind::Photo))
}

/// Post page: Open Graph tags, video preferred over image.
pub fn from_open_graph(html: &str) -> Option<ResolvedMedia> {
    let document = Html::parse_document(html);
    let mut video = None;
    let mut image = None;

    for meta in document.select(&META_PROPERTY) {
        let (Some(property), Some(content)) =
            (meta.value().attr("property"), meta.value().attr("content"))
        else {
            continue;
        };
        match property {
            "og:video:secure_url" => video = http_url(content).or(video),
            "og:video" if video.is_none() => video = http_url(content),
            "og:image" if image.is_none() => image = http_url(content),
            _ => {}
        }
    }

    video
        .map(|url| ResolvedMedia::new(url, MediaKind::Video))
        .or_else(|| image.map(|url| ResolvedMedia::new(url, MediaKind::Photo)))
}

/// oEmbed response: `video_url` if present, else the thumbnail.
pub fn from_oembed(json: &Value) -> Option<ResolvedMedia> {
    if let Some(url) = json.get("video_url").and_then(Value::as_str).and_then(http_url) {
        return Some(ResolvedMedia::new(url, MediaKind::Video));
    }
    json.get("thumbnail_url")
        .and_then(Value::as_str)
        .and_then(http_url)
        .map(|url| ResolvedMedia::new(url, MediaKind::Photo))
}

/// Authenticated post JSON, either the `items` API shape or the GraphQL shape.
///
/// Carousels resolve to their first item.
pub fn from_api_json(json: &Value) -> Option<ResolvedMedia> {
    if let Some(item) = json.pointer("/items/0") {
        let item = item.pointer("/carousel_media/0").unwrap_or(item);
        if let Some(url) = item
            .pointer("/video_versions/0/url")
            .and_then(Value::as_str)
            .and_then(http_url)
        {
            return Some(ResolvedMedia::new(url, MediaKind::Video));
        }
        if let Some(url) = item
            .pointer("/image_versions2/candidates/0/url")
            .and_then(Value::as_str)
            .and_then(http_url)
        {
            return Some(ResolvedMedia::new(url, MediaKind::Photo));
        }
    }

    let media = json
        .pointer("/graphql/shortcode_media")
        .or_else(|| json.pointer("/data/xdt_shortcode_media"))?;
    let media = media
        .pointer("/edge_sidecar_to_children/edges/0/node")
        .unwrap_or(media);

    if let Some(url) = media.get("video_url").and_then(Value::as_str).and_then(http_url) {
        return Some(ResolvedMedia::new(url, MediaKind::Video));
    }
    media
        .get("display_url")
        .and_then(Value::as_str)
        .and_then(http_url)
        .map(|url| ResolvedMedia::new(url, MediaKind::Photo))
}
