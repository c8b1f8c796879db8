/// Platform Profiles
///
/// Each identity carries a user agent; the platform is derived from it so the
/// remaining request headers always agree with the User-Agent:
/// - `Windows` → Chrome
/// - `MacOS` → Safari
/// - `IOS` → Safari (only real browser on iPhone)
/// - `Android` → Chrome or Firefox mobile
/// - `Minimal` → anything else, only generic headers
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Minimal,
    Windows,
    MacOS,
    IOS,
    Android,
}

impl Platform {
    /// Guess the platform a user agent claims to be.
    pub fn detect(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if ua.contains("iphone") || ua.contains("ipad") {
            Self::IOS
        } else if ua.contains("android") {
            Self::Android
        } else if ua.contains("windows nt") {
            Self::Windows
        } else if ua.contains("macintosh") || ua.contains("mac os x") {
            Self::MacOS
        } else {
            Self::Minimal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_mobile_platforms() {
        assert_eq!(
            Platform::detect(
                "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15"
            ),
            Platform::IOS
        );
        assert_eq!(
            Platform::detect("Mozilla/5.0 (Android 12; Mobile; rv:91.0) Gecko/91.0 Firefox/91.0"),
            Platform::Android
        );
    }

    #[test]
    fn detects_desktop_and_fallback() {
        assert_eq!(
            Platform::detect("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"),
            Platform::Windows
        );
        assert_eq!(
            Platform::detect("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)"),
            Platform::MacOS
        );
        assert_eq!(Platform::detect("curl/8.0"), Platform::Minimal);
    }
}
