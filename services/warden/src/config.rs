use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::time::Duration;
use warden_api::ClientConfig;
use warden_reconcile::{
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_THINK_TIME_MAX, DEFAULT_THINK_TIME_MIN,
    Pacing, RetryPolicy,
};

pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

// Reconciler configuration sourced from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WardenConfig {
    pub organization_url: String,
    pub graph_url: Option<String>,
    pub token: Option<String>,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub think_time_min_ms: u64,
    pub think_time_max_ms: u64,
    pub http_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WardenConfigOverride {
    organization_url: Option<String>,
    graph_url: Option<String>,
    token: Option<String>,
    retry_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
    think_time_min_ms: Option<u64>,
    think_time_max_ms: Option<u64>,
    http_timeout_ms: Option<u64>,
}

impl WardenConfig {
    pub fn from_env() -> Result<Self> {
        let organization_url = std::env::var("WARDEN_ORG_URL").unwrap_or_default();
        let graph_url = non_empty_var("WARDEN_GRAPH_URL");
        let token = non_empty_var("WARDEN_TOKEN");
        let retry_attempts = parse_var("WARDEN_RETRY_ATTEMPTS")?
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_RETRY_ATTEMPTS);
        let retry_delay_ms =
            parse_var("WARDEN_RETRY_DELAY_MS")?.unwrap_or(DEFAULT_RETRY_DELAY.as_millis() as u64);
        let think_time_min_ms = parse_var("WARDEN_THINK_TIME_MIN_MS")?
            .unwrap_or(DEFAULT_THINK_TIME_MIN.as_millis() as u64);
        let think_time_max_ms = parse_var("WARDEN_THINK_TIME_MAX_MS")?
            .unwrap_or(DEFAULT_THINK_TIME_MAX.as_millis() as u64);
        let http_timeout_ms = parse_var("WARDEN_HTTP_TIMEOUT_MS")?
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_MS);
        Ok(Self {
            organization_url,
            graph_url,
            token,
            retry_attempts,
            retry_delay_ms,
            think_time_min_ms,
            think_time_max_ms,
            http_timeout_ms,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("WARDEN_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read WARDEN_CONFIG: {path}"))?;
            let override_cfg: WardenConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse warden config yaml")?;
            if let Some(value) = override_cfg.organization_url {
                config.organization_url = value;
            }
            if let Some(value) = override_cfg.graph_url {
                config.graph_url = Some(value);
            }
            if let Some(value) = override_cfg.token {
                config.token = Some(value);
            }
            if let Some(value) = override_cfg.retry_attempts
                && value > 0
            {
                config.retry_attempts = value;
            }
            if let Some(value) = override_cfg.retry_delay_ms {
                config.retry_delay_ms = value;
            }
            if let Some(value) = override_cfg.think_time_min_ms {
                config.think_time_min_ms = value;
            }
            if let Some(value) = override_cfg.think_time_max_ms {
                config.think_time_max_ms = value;
            }
            if let Some(value) = override_cfg.http_timeout_ms
                && value > 0
            {
                config.http_timeout_ms = value;
            }
        }
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            min: Duration::from_millis(self.think_time_min_ms),
            max: Duration::from_millis(self.think_time_max_ms),
        }
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        let core_url = self.organization_url.trim().trim_end_matches('/');
        if core_url.is_empty() {
            bail!("organization url is not configured (set WARDEN_ORG_URL)");
        }
        let graph_url = match &self.graph_url {
            Some(url) => url.clone(),
            None => derive_service_url(core_url, "vssps")?,
        };
        Ok(ClientConfig {
            core_url: core_url.to_string(),
            graph_url,
            token: self.token.clone(),
            timeout: Duration::from_millis(self.http_timeout_ms),
        })
    }
}

/// `https://dev.azure.com/acme` with prefix `vssps` becomes
/// `https://vssps.dev.azure.com/acme`.
pub fn derive_service_url(organization_url: &str, prefix: &str) -> Result<String> {
    let (scheme, rest) = organization_url
        .split_once("://")
        .with_context(|| format!("organization url has no scheme: {organization_url}"))?;
    Ok(format!("{scheme}://{prefix}.{rest}"))
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("parse {key}")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const KEYS: [&str; 9] = [
        "WARDEN_ORG_URL",
        "WARDEN_GRAPH_URL",
        "WARDEN_TOKEN",
        "WARDEN_RETRY_ATTEMPTS",
        "WARDEN_RETRY_DELAY_MS",
        "WARDEN_THINK_TIME_MIN_MS",
        "WARDEN_THINK_TIME_MAX_MS",
        "WARDEN_HTTP_TIMEOUT_MS",
        "WARDEN_CONFIG",
    ];

    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn clean() -> Self {
            let saved = KEYS
                .iter()
                .map(|key| (*key, std::env::var(key).ok()))
                .collect();
            for key in KEYS {
                unsafe {
                    std::env::remove_var(key);
                }
            }
            Self { saved }
        }

        fn set(&self, key: &'static str, value: &str) {
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                match value {
                    Some(value) => unsafe {
                        std::env::set_var(key, value);
                    },
                    None => unsafe {
                        std::env::remove_var(key);
                    },
                }
            }
        }
    }

    #[test]
    #[serial]
    fn defaults_match_reconciler_defaults() {
        let _env = EnvGuard::clean();
        let config = WardenConfig::from_env().expect("config");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.pacing(), Pacing::default());
        assert_eq!(config.http_timeout_ms, DEFAULT_HTTP_TIMEOUT_MS);
        assert!(config.token.is_none());
    }

    #[test]
    #[serial]
    fn missing_organization_url_is_rejected_when_building_the_client() {
        let _env = EnvGuard::clean();
        let config = WardenConfig::from_env().expect("config");
        let err = config.client_config().expect_err("no org url");
        assert!(err.to_string().contains("WARDEN_ORG_URL"));
    }

    #[test]
    #[serial]
    fn graph_host_is_derived_from_the_organization_url() {
        let env = EnvGuard::clean();
        env.set("WARDEN_ORG_URL", "https://dev.azure.com/acme/");
        let client = WardenConfig::from_env()
            .expect("config")
            .client_config()
            .expect("client config");
        assert_eq!(client.core_url, "https://dev.azure.com/acme");
        assert_eq!(client.graph_url, "https://vssps.dev.azure.com/acme");
    }

    #[test]
    #[serial]
    fn explicit_graph_url_wins_over_the_derived_host() {
        let env = EnvGuard::clean();
        env.set("WARDEN_ORG_URL", "https://dev.azure.com/acme");
        env.set("WARDEN_GRAPH_URL", "https://graph.example.test/acme");
        let client = WardenConfig::from_env()
            .expect("config")
            .client_config()
            .expect("client config");
        assert_eq!(client.graph_url, "https://graph.example.test/acme");
    }

    #[test]
    #[serial]
    fn yaml_rejects_unknown_keys() {
        let env = EnvGuard::clean();
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "release_url: https://vsrm.dev.azure.com/acme").expect("write");
        env.set("WARDEN_CONFIG", file.path().to_str().expect("utf8 path"));
        let err = WardenConfig::from_env_or_yaml().expect_err("unknown key");
        assert!(format!("{err:#}").contains("release_url"));
    }

    #[test]
    #[serial]
    fn malformed_numbers_fail_with_the_variable_name() {
        let env = EnvGuard::clean();
        env.set("WARDEN_RETRY_DELAY_MS", "soon");
        let err = WardenConfig::from_env().expect_err("bad number");
        assert!(err.to_string().contains("WARDEN_RETRY_DELAY_MS"));
    }

    #[test]
    #[serial]
    fn yaml_overrides_environment() {
        let env = EnvGuard::clean();
        env.set("WARDEN_ORG_URL", "https://dev.azure.com/from-env");
        env.set("WARDEN_RETRY_ATTEMPTS", "3");
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "organization_url: https://dev.azure.com/from-yaml\nretry_attempts: 7\nthink_time_max_ms: 0"
        )
        .expect("write");
        env.set("WARDEN_CONFIG", file.path().to_str().expect("utf8 path"));

        let config = WardenConfig::from_env_or_yaml().expect("config");
        assert_eq!(config.organization_url, "https://dev.azure.com/from-yaml");
        assert_eq!(config.retry_attempts, 7);
        assert_eq!(config.think_time_max_ms, 0);
        assert_eq!(config.retry_delay_ms, DEFAULT_RETRY_DELAY.as_millis() as u64);
    }

    #[test]
    fn derive_requires_a_scheme() {
        assert!(derive_service_url("dev.azure.com/acme", "vssps").is_err());
    }
}
