//! Gateway configuration: defaults, builders, environment overrides, and validation.

// std
use std::{env, path::PathBuf};
// self
use crate::{_prelude::*, error::ConfigError};

/// Default WHOOP developer API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.prod.whoop.com/developer/v1";
/// Default JSON refresh proxy.
pub const DEFAULT_REFRESH_PROXY: &str =
	"https://personal-integrations-462307.uc.r.appspot.com/api/refresh-token";
/// Default OAuth 2.0 token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://api.prod.whoop.com/oauth/oauth2/token";
/// Default storage directory name under `$HOME`.
pub const DEFAULT_STORAGE_DIR_NAME: &str = ".whoop-mcp-server";

const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_MAX_REQUESTS_PER_MINUTE: u32 = 100;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SAFETY_MARGIN_SECS: u64 = 300;

/// Largest cache TTL or token safety margin accepted by [`GatewayConfig::validate`].
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// How expired access tokens are exchanged for new ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefreshConfig {
	/// JSON refresh proxy holding the client secret server-side.
	Proxy {
		/// Proxy endpoint.
		url: Url,
	},
	/// Standard OAuth 2.0 refresh grant.
	#[serde(rename = "oauth2")]
	OAuth2 {
		/// Token endpoint.
		token_url: Url,
		/// OAuth client identifier.
		client_id: String,
		/// OAuth client secret, when the client is confidential.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		client_secret: Option<String>,
	},
}
impl RefreshConfig {
	/// Returns the proxy URL when the proxy exchange is configured.
	pub fn proxy_url(&self) -> Option<&Url> {
		match self {
			Self::Proxy { url } => Some(url),
			Self::OAuth2 { .. } => None,
		}
	}
}
impl Default for RefreshConfig {
	fn default() -> Self {
		Self::Proxy { url: default_url(DEFAULT_REFRESH_PROXY) }
	}
}

/// Runtime settings for the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
	/// Base URL every endpoint path is appended to.
	pub api_base: Url,
	/// Refresh exchange settings.
	pub refresh: RefreshConfig,
	/// Lifetime of cached responses in seconds.
	pub cache_ttl_secs: u64,
	/// Local admission ceiling per one-minute window.
	pub max_requests_per_minute: u32,
	/// Bound on every outbound HTTP call in seconds.
	pub request_timeout_secs: u64,
	/// Window before expiry in which the token is refreshed proactively, in seconds.
	pub token_safety_margin_secs: u64,
	/// Directory holding the encrypted token blob and its key.
	pub storage_dir: Option<PathBuf>,
}
impl GatewayConfig {
	/// Length of the local admission window.
	pub const RATE_WINDOW: Duration = Duration::minutes(1);

	/// Reads overrides from `WHOOP_*` environment variables on top of the defaults.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Same as [`Self::from_env`] with a caller-provided variable source.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| lookup(name).map(|value| value.trim().to_owned()).filter(|v| !v.is_empty());
		let mut config = Self::default();

		if let Some(value) = var("WHOOP_API_BASE") {
			config.api_base = parse_url(&value)?;
		}
		if let Some(value) = var("WHOOP_CACHE_TTL_SECS") {
			config.cache_ttl_secs = parse_env("WHOOP_CACHE_TTL_SECS", value)?;
		}
		if let Some(value) = var("WHOOP_MAX_REQUESTS_PER_MINUTE") {
			config.max_requests_per_minute = parse_env("WHOOP_MAX_REQUESTS_PER_MINUTE", value)?;
		}
		if let Some(value) = var("WHOOP_REQUEST_TIMEOUT_SECS") {
			config.request_timeout_secs = parse_env("WHOOP_REQUEST_TIMEOUT_SECS", value)?;
		}
		if let Some(value) = var("WHOOP_TOKEN_SAFETY_MARGIN_SECS") {
			config.token_safety_margin_secs = parse_env("WHOOP_TOKEN_SAFETY_MARGIN_SECS", value)?;
		}
		if let Some(value) = var("WHOOP_STORAGE_DIR") {
			config.storage_dir = Some(PathBuf::from(value));
		}

		config.refresh = match var("WHOOP_CLIENT_ID") {
			Some(client_id) => RefreshConfig::OAuth2 {
				token_url: match var("WHOOP_TOKEN_URL") {
					Some(value) => parse_url(&value)?,
					None => default_url(DEFAULT_TOKEN_URL),
				},
				client_id,
				client_secret: var("WHOOP_CLIENT_SECRET"),
			},
			None => match var("WHOOP_REFRESH_URL") {
				Some(value) => RefreshConfig::Proxy { url: parse_url(&value)? },
				None => RefreshConfig::default(),
			},
		};

		config.validate()?;

		Ok(config)
	}

	/// Overrides the API base URL.
	pub fn with_api_base(mut self, url: Url) -> Self {
		self.api_base = url;

		self
	}

	/// Uses the JSON refresh proxy at `url`.
	pub fn with_proxy_refresh(mut self, url: Url) -> Self {
		self.refresh = RefreshConfig::Proxy { url };

		self
	}

	/// Uses the standard OAuth 2.0 refresh grant.
	pub fn with_oauth2_refresh(
		mut self,
		token_url: Url,
		client_id: impl Into<String>,
		client_secret: Option<String>,
	) -> Self {
		self.refresh = RefreshConfig::OAuth2 { token_url, client_id: client_id.into(), client_secret };

		self
	}

	/// Overrides the response cache lifetime.
	pub fn with_cache_ttl(mut self, ttl: std::time::Duration) -> Self {
		self.cache_ttl_secs = ttl.as_secs();

		self
	}

	/// Overrides the per-minute admission ceiling.
	pub fn with_rate_limit(mut self, max_requests_per_minute: u32) -> Self {
		self.max_requests_per_minute = max_requests_per_minute;

		self
	}

	/// Overrides the outbound request timeout.
	pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
		self.request_timeout_secs = timeout.as_secs();

		self
	}

	/// Overrides the token safety margin.
	pub fn with_safety_margin(mut self, margin: std::time::Duration) -> Self {
		self.token_safety_margin_secs = margin.as_secs();

		self
	}

	/// Overrides the storage directory.
	pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.storage_dir = Some(dir.into());

		self
	}

	/// Cache lifetime as a [`Duration`].
	pub fn cache_ttl(&self) -> Duration {
		Duration::seconds(saturating_secs(self.cache_ttl_secs))
	}

	/// Outbound request timeout, in the form reqwest expects.
	pub fn request_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.request_timeout_secs)
	}

	/// Token safety margin as a [`Duration`].
	pub fn token_safety_margin(&self) -> Duration {
		Duration::seconds(saturating_secs(self.token_safety_margin_secs))
	}

	/// Resolves the storage directory, falling back to `$HOME/.whoop-mcp-server`.
	pub fn resolved_storage_dir(&self) -> Result<PathBuf, ConfigError> {
		if let Some(dir) = &self.storage_dir {
			return Ok(dir.clone());
		}

		env::var_os("HOME")
			.filter(|home| !home.is_empty())
			.map(|home| PathBuf::from(home).join(DEFAULT_STORAGE_DIR_NAME))
			.ok_or(ConfigError::MissingStorageDir)
	}

	/// Rejects settings the gateway cannot run with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_requests_per_minute == 0 {
			return Err(ConfigError::ZeroRateLimit);
		}
		if self.request_timeout_secs == 0 {
			return Err(ConfigError::ZeroTimeout);
		}

		for (name, value) in [
			("cache_ttl_secs", self.cache_ttl_secs),
			("token_safety_margin_secs", self.token_safety_margin_secs),
		] {
			if value > MAX_DURATION_SECS {
				return Err(ConfigError::DurationTooLong { name, value, max: MAX_DURATION_SECS });
			}
		}

		Ok(())
	}
}
impl Default for GatewayConfig {
	fn default() -> Self {
		Self {
			api_base: default_url(DEFAULT_API_BASE),
			refresh: RefreshConfig::default(),
			cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
			max_requests_per_minute: DEFAULT_MAX_REQUESTS_PER_MINUTE,
			request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
			token_safety_margin_secs: DEFAULT_SAFETY_MARGIN_SECS,
			storage_dir: None,
		}
	}
}

fn default_url(raw: &'static str) -> Url {
	// Constants above are valid absolute URLs.
	Url::parse(raw).unwrap_or_else(|_| unreachable!("built-in URL `{raw}` must parse"))
}

fn parse_url(value: &str) -> Result<Url, ConfigError> {
	Url::parse(value).map_err(|source| ConfigError::InvalidUrl { value: value.to_owned(), source })
}

fn parse_env<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
	T: FromStr,
{
	value.parse().map_err(|_| ConfigError::InvalidEnv { name, value })
}

fn saturating_secs(secs: u64) -> i64 {
	i64::try_from(secs).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
		move |name| pairs.iter().find(|(key, _)| *key == name).map(|(_, value)| (*value).to_owned())
	}

	#[test]
	fn defaults_match_the_hosted_deployment() {
		let config = GatewayConfig::default();

		assert_eq!(config.api_base.as_str(), DEFAULT_API_BASE);
		assert_eq!(config.refresh.proxy_url().map(Url::as_str), Some(DEFAULT_REFRESH_PROXY));
		assert_eq!(config.cache_ttl(), Duration::minutes(5));
		assert_eq!(config.max_requests_per_minute, 100);
		assert_eq!(config.request_timeout(), std::time::Duration::from_secs(30));
		assert_eq!(config.token_safety_margin(), Duration::minutes(5));
		assert!(config.validate().is_ok());
	}

	#[test]
	fn env_overrides_apply_and_client_id_selects_oauth2() {
		let config = GatewayConfig::from_lookup(lookup(&[
			("WHOOP_API_BASE", "http://127.0.0.1:9000/v1"),
			("WHOOP_CACHE_TTL_SECS", "60"),
			("WHOOP_MAX_REQUESTS_PER_MINUTE", " 10 "),
			("WHOOP_STORAGE_DIR", "/tmp/whoop"),
			("WHOOP_CLIENT_ID", "client-1"),
			("WHOOP_CLIENT_SECRET", ""),
		]))
		.expect("Overrides should parse.");

		assert_eq!(config.api_base.as_str(), "http://127.0.0.1:9000/v1");
		assert_eq!(config.cache_ttl_secs, 60);
		assert_eq!(config.max_requests_per_minute, 10);
		assert_eq!(config.resolved_storage_dir().ok(), Some(PathBuf::from("/tmp/whoop")));
		assert_eq!(
			config.refresh,
			RefreshConfig::OAuth2 {
				token_url: Url::parse(DEFAULT_TOKEN_URL).expect("Default token URL should parse."),
				client_id: "client-1".into(),
				client_secret: None,
			}
		);
	}

	#[test]
	fn invalid_env_values_are_reported() {
		let err = GatewayConfig::from_lookup(lookup(&[("WHOOP_REQUEST_TIMEOUT_SECS", "soon")]))
			.expect_err("Non-numeric timeout should fail.");

		assert!(matches!(err, ConfigError::InvalidEnv { name: "WHOOP_REQUEST_TIMEOUT_SECS", .. }));

		let err = GatewayConfig::from_lookup(lookup(&[("WHOOP_MAX_REQUESTS_PER_MINUTE", "0")]))
			.expect_err("Zero ceiling should fail.");

		assert!(matches!(err, ConfigError::ZeroRateLimit));
		assert!(matches!(
			GatewayConfig::from_lookup(lookup(&[("WHOOP_REFRESH_URL", "not a url")])),
			Err(ConfigError::InvalidUrl { .. })
		));
	}

	#[test]
	fn deserializes_partial_documents() {
		let config: GatewayConfig = serde_json::from_value(serde_json::json!({
			"cache_ttl_secs": 10,
			"refresh": { "kind": "oauth2", "token_url": DEFAULT_TOKEN_URL, "client_id": "abc" }
		}))
		.expect("Partial config should deserialize.");

		assert_eq!(config.cache_ttl_secs, 10);
		assert_eq!(config.max_requests_per_minute, 100);
		assert!(config.refresh.proxy_url().is_none());
	}

	#[test]
	fn oversized_durations_are_rejected() {
		let err = GatewayConfig::from_lookup(lookup(&[(
			"WHOOP_CACHE_TTL_SECS",
			"18446744073709551615",
		)]))
		.expect_err("Unbounded cache TTL should fail.");

		assert!(matches!(err, ConfigError::DurationTooLong { name: "cache_ttl_secs", .. }));

		let config = GatewayConfig { token_safety_margin_secs: u64::MAX, ..Default::default() };

		assert!(matches!(
			config.validate(),
			Err(ConfigError::DurationTooLong { name: "token_safety_margin_secs", .. })
		));
		assert!(
			GatewayConfig { cache_ttl_secs: MAX_DURATION_SECS, ..Default::default() }.validate().is_ok()
		);
	}
}
