//! Service endpoints and client timing.

use std::time::Duration;

use log::warn;

/// Environment variable overriding [`ServiceConfig::api_url`].
pub const ENV_API_URL: &str = "SUGARCANE_API_URL";
/// Environment variable overriding [`ServiceConfig::geocoder_url`].
pub const ENV_GEOCODER_URL: &str = "SUGARCANE_GEOCODER_URL";
/// Environment variable overriding [`ServiceConfig::timeout`], in whole seconds.
pub const ENV_TIMEOUT_SECS: &str = "SUGARCANE_HTTP_TIMEOUT_SECS";

/// Connection settings for the classification service and the geocoder.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Base URL of the classification service (default: http://127.0.0.1:5000)
    pub api_url: String,
    /// Base URL of the Nominatim-compatible geocoder
    pub geocoder_url: String,
    /// ISO country codes the geocoder is restricted to (default: "PH")
    pub country_codes: String,
    /// Per-request timeout (default: 30s)
    pub timeout: Duration,
    /// Trailing delay before a viewport change triggers a redraw (default: 250ms)
    pub debounce: Duration,
    /// Lifetime of a fetched point snapshot (default: 5 minutes)
    pub cache_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5000".to_string(),
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
            country_codes: "PH".to_string(),
            timeout: Duration::from_secs(30),
            debounce: Duration::from_millis(250),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by `SUGARCANE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            config.api_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup(ENV_GEOCODER_URL).filter(|v| !v.trim().is_empty()) {
            config.geocoder_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout = Duration::from_secs(secs),
                _ => warn!("Ignoring invalid {}={:?}", ENV_TIMEOUT_SECS, raw),
            }
        }

        config
    }

    /// Join a path onto the classification service URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.endpoint("/sugarcane-locations"), "http://127.0.0.1:5000/sugarcane-locations");
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup(&[
            (ENV_API_URL, "https://ndvi.example.org/api/"),
            (ENV_TIMEOUT_SECS, "5"),
        ]));
        assert_eq!(config.api_url, "https://ndvi.example.org/api");
        assert_eq!(config.endpoint("ndvi-info"), "https://ndvi.example.org/api/ndvi-info");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.geocoder_url, ServiceConfig::default().geocoder_url);
    }

    #[test]
    fn test_invalid_timeout_keeps_default() {
        let config = ServiceConfig::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "soon"), (ENV_API_URL, "  ")]));
        assert_eq!(config, ServiceConfig::default());
    }
}
