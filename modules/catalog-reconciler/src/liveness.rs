//! Social profile reachability probe.
//!
//! Only 404 and 410 count as gone. Every other outcome, including rate limits,
//! auth walls, server errors and transport failures, keeps the profile active:
//! a wrongly flagged profile queues a deactivation for review, a missed one
//! costs nothing until the next run.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use catalog_common::ProfileStatus;

use crate::scoring::PROBE_FAILURE_STATUS;
use crate::traits::ProfileProbe;

/// Status codes that mean the profile is confirmed gone.
pub const INACTIVE_STATUS_CODES: [u16; 2] = [404, 410];

pub fn classify_status(code: u16) -> ProfileStatus {
    if INACTIVE_STATUS_CODES.contains(&code) {
        ProfileStatus::Inactive
    } else {
        ProfileStatus::Active
    }
}

/// Map a probe attempt to a status. Errors never mean inactive.
pub fn classify_outcome<E>(outcome: Result<u16, E>) -> ProfileStatus {
    match outcome {
        Ok(code) => classify_status(code),
        Err(_) => PROBE_FAILURE_STATUS,
    }
}

/// Resolve a `socials` entry to a probeable URL.
///
/// Full URLs pass through. Bare handles are expanded for known platforms;
/// anything else is skipped.
pub fn profile_url(platform: &str, handle: &str) -> Option<String> {
    let handle = handle.trim();
    if handle.is_empty() {
        return None;
    }
    if handle.starts_with("http://") || handle.starts_with("https://") {
        return url::Url::parse(handle).ok().map(|u| u.to_string());
    }

    let bare = handle.trim_start_matches('@');
    if bare.is_empty() || bare.contains(char::is_whitespace) {
        return None;
    }

    let url = match platform.trim().to_ascii_lowercase().as_str() {
        "instagram" => format!("https://www.instagram.com/{bare}/"),
        "facebook" => format!("https://www.facebook.com/{bare}"),
        "tiktok" => format!("https://www.tiktok.com/@{bare}"),
        "twitter" | "x" => format!("https://x.com/{bare}"),
        "youtube" => format!("https://www.youtube.com/@{bare}"),
        _ => return None,
    };
    Some(url)
}

/// Plain GET probe. Redirects are followed; only the final status is inspected.
pub struct HttpLivenessProbe {
    client: reqwest::Client,
}

impl HttpLivenessProbe {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProfileProbe for HttpLivenessProbe {
    async fn probe(&self, url: &str) -> ProfileStatus {
        let outcome = self
            .client
            .get(url)
            .send()
            .await
            .map(|resp| resp.status().as_u16());

        if let Err(ref e) = outcome {
            debug!(url, error = %e, "Probe failed, keeping profile active");
        }
        let status = classify_outcome(outcome);
        debug!(url, %status, "Profile probed");
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_404_and_410_are_inactive() {
        for code in 100u16..600 {
            let expected = if code == 404 || code == 410 {
                ProfileStatus::Inactive
            } else {
                ProfileStatus::Active
            };
            assert_eq!(classify_status(code), expected, "code {code}");
        }
    }

    #[test]
    fn errors_are_treated_as_active() {
        assert_eq!(classify_outcome::<&str>(Err("dns failure")), ProfileStatus::Active);
        assert_eq!(classify_outcome::<&str>(Ok(429)), ProfileStatus::Active);
        assert_eq!(classify_outcome::<&str>(Ok(410)), ProfileStatus::Inactive);
    }

    #[test]
    fn handles_expand_per_platform() {
        assert_eq!(
            profile_url("instagram", "@alfalah.sg").as_deref(),
            Some("https://www.instagram.com/alfalah.sg/")
        );
        assert_eq!(
            profile_url("TikTok", "alfalah").as_deref(),
            Some("https://www.tiktok.com/@alfalah")
        );
        assert_eq!(profile_url("x", "alfalah").as_deref(), Some("https://x.com/alfalah"));
    }

    #[test]
    fn urls_pass_through_and_junk_is_skipped() {
        assert_eq!(
            profile_url("website", "https://alfalah.example.com/menu").as_deref(),
            Some("https://alfalah.example.com/menu")
        );
        assert_eq!(profile_url("instagram", "   "), None);
        assert_eq!(profile_url("instagram", "@"), None);
        assert_eq!(profile_url("instagram", "two words"), None);
        assert_eq!(profile_url("myspace", "alfalah"), None);
    }

    #[tokio::test]
    async fn unreachable_host_is_active() {
        let probe = HttpLivenessProbe::new("test-agent", Duration::from_secs(2)).unwrap();
        assert_eq!(probe.probe("http://127.0.0.1:9/profile").await, ProfileStatus::Active);
    }
}
