use super::types::MediaKind;
use crate::error::{AcquisitionError, Result};
use url::Url;

const HOSTS: [&str; 3] = ["instagram.com", "www.instagram.com", "m.instagram.com"];

/// A post the pipeline was asked to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: String,
    pub shortcode: String,
    /// `/reel/` and `/tv/` links are always videos; `/p/` can be either.
    pub kind_hint: Option<MediaKind>,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let url = Url::parse(trimmed).map_err(|_| AcquisitionError::InvalidTarget(trimmed.into()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(AcquisitionError::InvalidTarget(trimmed.into()));
        }
        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        if !HOSTS.contains(&host.as_str()) {
            return Err(AcquisitionError::InvalidTarget(trimmed.into()));
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        // Either /<section>/<code> or /<username>/<section>/<code>
        let (section, code) = match segments.as_slice() {
            [section, code, ..] if is_section(section) => (*section, *code),
            [_, section, code, ..] if is_section(section) => (*section, *code),
            _ => return Err(AcquisitionError::InvalidTarget(trimmed.into())),
        };

        if !is_shortcode(code) {
            return Err(AcquisitionError::InvalidTarget(trimmed.into()));
        }

        let kind_hint = match section {
            "reel" | "reels" | "tv" => Some(MediaKind::Video),
            _ => None,
        };

        Ok(Self {
            url: trimmed.to_string(),
            shortcode: code.to_string(),
            kind_hint,
        })
    }

    /// Canonical post URL on the given web base.
    pub fn post_url(&self, web_base: &str) -> String {
        format!("{}/p/{}/", web_base.trim_end_matches('/'), self.shortcode)
    }
}

fn is_section(segment: &str) -> bool {
    matches!(segment, "p" | "reel" | "reels" | "tv")
}

fn is_shortcode(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= 64
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
