//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sessionguard_renewal::RenewalConfig;
use sessionguard_session::DEFAULT_REFRESH_TIMEOUT;

/// Everything the pipeline needs to know about the backend and timing.
///
/// Every field has a default, so `SessionConfig::default()` with only
/// `base_url` filled in is a working setup. Missing fields in a JSON
/// document take their defaults too.
///
/// ```rust
/// use sessionguard::SessionConfig;
///
/// let config = SessionConfig::from_json_str(r#"{ "base_url": "https://api.example.com" }"#)
///     .unwrap();
/// assert_eq!(config.refresh_url(), "https://api.example.com/api/auth/refresh");
/// assert_eq!(config.access_token_lifetime_secs, 900);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Prefix for the refresh and logout endpoints. Empty means the paths
    /// are used as-is.
    pub base_url: String,
    pub refresh_path: String,
    pub logout_path: String,
    /// Assumed access-token lifetime when the identity carries no
    /// `expires_in`.
    pub access_token_lifetime_secs: u64,
    /// How long before expiry the proactive timer renews.
    pub proactive_safety_margin_secs: u64,
    /// Fixed delay before the proactive timer retries after a rate-limited
    /// or failed renewal.
    pub proactive_retry_backoff_secs: u64,
    /// Upper bound of the random delay added to each renewal interval.
    pub proactive_jitter_secs: u64,
    /// Deadline for one refresh call. Elapsed means `Failure`.
    pub refresh_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            refresh_path: "/api/auth/refresh".to_string(),
            logout_path: "/api/auth/logout".to_string(),
            access_token_lifetime_secs: 15 * 60,
            proactive_safety_margin_secs: 5 * 60,
            proactive_retry_backoff_secs: 2 * 60,
            proactive_jitter_secs: 0,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT.as_secs(),
        }
    }
}

impl SessionConfig {
    /// A default config pointed at `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Parses a JSON document. Absent fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Normalises values so the config is safe to use.
    ///
    /// Called automatically by the pipeline builder. Rules:
    /// - a trailing `/` on `base_url` is dropped.
    /// - paths get a leading `/`.
    /// - a zero `refresh_timeout_secs` falls back to the default.
    ///
    /// Timing fields are clamped by [`RenewalConfig::validated`].
    pub fn validated(mut self) -> Self {
        while self.base_url.ends_with('/') {
            self.base_url.pop();
        }
        for path in [&mut self.refresh_path, &mut self.logout_path] {
            if !path.starts_with('/') {
                path.insert(0, '/');
            }
        }
        if self.refresh_timeout_secs == 0 {
            tracing::warn!("refresh_timeout_secs is zero, using default");
            self.refresh_timeout_secs = DEFAULT_REFRESH_TIMEOUT.as_secs();
        }
        self
    }

    pub fn refresh_url(&self) -> String {
        join_url(&self.base_url, &self.refresh_path)
    }

    pub fn logout_url(&self) -> String {
        join_url(&self.base_url, &self.logout_path)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    /// The proactive scheduler's view of this config.
    pub fn renewal(&self) -> RenewalConfig {
        RenewalConfig {
            access_token_lifetime: Duration::from_secs(self.access_token_lifetime_secs),
            safety_margin: Duration::from_secs(self.proactive_safety_margin_secs),
            retry_backoff: Duration::from_secs(self.proactive_retry_backoff_secs),
            jitter: Duration::from_secs(self.proactive_jitter_secs),
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_timings() {
        let cfg = SessionConfig::default();
        let renewal = cfg.renewal();

        assert_eq!(renewal.access_token_lifetime, Duration::from_secs(900));
        assert_eq!(renewal.safety_margin, Duration::from_secs(300));
        assert_eq!(renewal.retry_backoff, Duration::from_secs(120));
        assert_eq!(renewal, RenewalConfig::default());
        assert_eq!(cfg.refresh_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let cfg = SessionConfig::from_json_str(
            r#"{ "base_url": "https://api.test", "proactive_retry_backoff_secs": 45 }"#,
        )
        .unwrap();

        assert_eq!(cfg.base_url, "https://api.test");
        assert_eq!(cfg.proactive_retry_backoff_secs, 45);
        assert_eq!(cfg.logout_path, "/api/auth/logout");
    }

    #[test]
    fn test_from_json_rejects_wrong_types() {
        assert!(SessionConfig::from_json_str(r#"{ "refresh_timeout_secs": "soon" }"#).is_err());
    }

    #[test]
    fn test_validated_normalises_urls_and_timeout() {
        let cfg = SessionConfig {
            base_url: "https://api.test//".into(),
            refresh_path: "auth/refresh".into(),
            refresh_timeout_secs: 0,
            ..Default::default()
        }
        .validated();

        assert_eq!(cfg.refresh_url(), "https://api.test/auth/refresh");
        assert_eq!(cfg.logout_url(), "https://api.test/api/auth/logout");
        assert_eq!(cfg.refresh_timeout_secs, 30);
    }

    #[test]
    fn test_empty_base_url_keeps_paths_relative() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.refresh_url(), "/api/auth/refresh");
    }
}
