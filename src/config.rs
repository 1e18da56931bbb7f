use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_REFERER: &str = "http://localhost";
pub const DEFAULT_TITLE: &str = "Voice AI Assistant";
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Request bodies above this size are refused before any parsing happens.
pub const MAX_BODY_BYTES: usize = 1_000_000;

/// Everything the relay needs to reach the completion provider.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub referer: String,
    pub title: String,
    pub timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            referer: DEFAULT_REFERER.to_string(),
            title: DEFAULT_TITLE.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl UpstreamConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let timeout_ms = non_empty(lookup, "UPSTREAM_TIMEOUT_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Self {
            base_url: non_empty(lookup, "OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: non_empty(lookup, "OPENROUTER_API_KEY").map(|v| v.trim().to_string()),
            referer: non_empty(lookup, "HTTP_REFERER")
                .unwrap_or_else(|| DEFAULT_REFERER.to_string()),
            title: non_empty(lookup, "X_TITLE").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            timeout_ms,
        }
    }
}

pub fn static_dir_from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    non_empty(lookup, "STATIC_DIR").map(PathBuf::from)
}

pub(crate) fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn blank_credential_counts_as_unset() {
        let cfg = UpstreamConfig::from_lookup(&lookup_from(&[("OPENROUTER_API_KEY", "   ")]));
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn bad_timeout_falls_back_to_default() {
        let cfg = UpstreamConfig::from_lookup(&lookup_from(&[("UPSTREAM_TIMEOUT_MS", "soon")]));
        assert_eq!(cfg.timeout_ms, DEFAULT_TIMEOUT_MS);
        let cfg = UpstreamConfig::from_lookup(&lookup_from(&[("UPSTREAM_TIMEOUT_MS", "0")]));
        assert_eq!(cfg.timeout_ms, DEFAULT_TIMEOUT_MS);
    }
}
