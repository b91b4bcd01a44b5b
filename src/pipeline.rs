//! Request pipeline wrapping every upstream data call.
//!
//! [`Gateway::execute`] answers from the [`ResponseCache`] when it can. Otherwise it waits
//! on a per-identity guard so identical concurrent misses reach upstream once, then consults
//! the [`RateLimitPolicy`], obtains an access token from the [`TokenManager`], issues the
//! GET, and classifies the response. Only successful payloads are cached; nothing is retried.

pub mod cache;
pub mod identity;
pub mod metrics;
pub mod rate_limit;

pub use cache::ResponseCache;
pub use identity::RequestIdentity;
pub use metrics::PipelineMetrics;
pub use rate_limit::{
	FixedWindowLimiter, RateLimitContext, RateLimitDecision, RateLimitPolicy, RetryDirective,
};

// self
use crate::{
	_prelude::*,
	auth::{AuthStatus, TokenManager, TokenSecret},
	config::{GatewayConfig, RefreshConfig},
	endpoint::{DataQuery, Endpoint, Payload},
	error::{ConfigError, RateLimitOrigin, UpstreamError},
	exchange::{OAuth2Exchange, ProxyExchange, RefreshExchange},
	http::{self, ReqwestHttpClient},
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{CredentialStore, EncryptedFileStore},
};

/// Scope WHOOP requires for refresh tokens to keep rotating.
const OFFLINE_SCOPE: &str = "offline";

/// Explicit context object owning every shared piece of gateway state.
pub struct Gateway {
	config: GatewayConfig,
	http_client: ReqwestHttpClient,
	tokens: Arc<TokenManager>,
	limiter: Arc<dyn RateLimitPolicy>,
	cache: ResponseCache,
	inflight: Mutex<HashMap<RequestIdentity, Arc<AsyncMutex<()>>>>,
	metrics: Arc<PipelineMetrics>,
}
impl Gateway {
	/// Builds a gateway over an existing token manager.
	pub fn new(config: GatewayConfig, tokens: Arc<TokenManager>) -> Result<Self> {
		config.validate()?;

		let http_client = ReqwestHttpClient::with_timeout(config.request_timeout())?;
		let limiter = Arc::new(FixedWindowLimiter::new(
			config.max_requests_per_minute,
			GatewayConfig::RATE_WINDOW,
		));
		let cache = ResponseCache::new(config.cache_ttl());

		Ok(Self {
			config,
			http_client,
			tokens,
			limiter,
			cache,
			inflight: Mutex::new(HashMap::new()),
			metrics: Arc::new(PipelineMetrics::default()),
		})
	}

	/// Builds a gateway with the encrypted file store and the configured refresh exchange.
	pub fn from_config(config: GatewayConfig) -> Result<Self> {
		config.validate()?;

		let store: Arc<dyn CredentialStore> =
			Arc::new(EncryptedFileStore::open(config.resolved_storage_dir()?)?);
		let http_client = ReqwestHttpClient::with_timeout(config.request_timeout())?;
		let exchange: Arc<dyn RefreshExchange> = match &config.refresh {
			RefreshConfig::Proxy { url } =>
				Arc::new(ProxyExchange::with_http_client(url.clone(), http_client)),
			RefreshConfig::OAuth2 { token_url, client_id, client_secret } => Arc::new(
				OAuth2Exchange::new(token_url, client_id.clone(), client_secret.clone(), http_client)?
					.with_scopes([OFFLINE_SCOPE]),
			),
		};
		let tokens = TokenManager::new(store, exchange, config.token_safety_margin());

		Self::new(config, Arc::new(tokens))
	}

	/// Replaces the admission policy.
	pub fn with_rate_limit_policy(mut self, policy: Arc<dyn RateLimitPolicy>) -> Self {
		self.limiter = policy;

		self
	}

	/// Active configuration.
	pub fn config(&self) -> &GatewayConfig {
		&self.config
	}

	/// Token lifecycle manager backing every call.
	pub fn tokens(&self) -> &Arc<TokenManager> {
		&self.tokens
	}

	/// Response cache.
	pub fn cache(&self) -> &ResponseCache {
		&self.cache
	}

	/// Shared pipeline counters.
	pub fn metrics(&self) -> Arc<PipelineMetrics> {
		Arc::clone(&self.metrics)
	}

	/// Fetches `endpoint` with `params`, going through cache, limiter, and token manager.
	pub async fn execute(
		&self,
		endpoint: Endpoint,
		params: BTreeMap<String, String>,
	) -> Result<Payload> {
		const KIND: OpKind = OpKind::Fetch;

		let identity = RequestIdentity::new(endpoint, params);
		let span = OpSpan::new(KIND, endpoint.as_str());

		self.metrics.record_request();
		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.execute_identity(identity)).await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(err) => {
				self.metrics.record_failure();
				obs::record_op_outcome(KIND, OpOutcome::Failure);

				tracing::warn!(error = %err, kind = err.kind(), "WHOOP request failed.");
			},
		}

		result
	}

	/// Basic user profile.
	pub async fn profile(&self) -> Result<Payload> {
		self.execute(Endpoint::Profile, BTreeMap::new()).await
	}

	/// Workout page.
	pub async fn workouts(&self, query: DataQuery) -> Result<Payload> {
		self.collection(Endpoint::Workouts, query).await
	}

	/// Recovery page.
	pub async fn recovery(&self, query: DataQuery) -> Result<Payload> {
		self.collection(Endpoint::Recovery, query).await
	}

	/// Sleep page.
	pub async fn sleep(&self, query: DataQuery) -> Result<Payload> {
		self.collection(Endpoint::Sleep, query).await
	}

	/// Physiological cycle page.
	pub async fn cycles(&self, query: DataQuery) -> Result<Payload> {
		self.collection(Endpoint::Cycles, query).await
	}

	/// Credential state, without any network call.
	pub async fn auth_status(&self) -> Result<AuthStatus> {
		self.tokens.auth_status().await
	}

	/// Drops every cached response and returns how many were held.
	pub fn clear_cache(&self) -> usize {
		let cleared = self.cache.clear().len();

		tracing::info!(cleared, "Cleared WHOOP response cache.");

		cleared
	}

	async fn collection(&self, endpoint: Endpoint, query: DataQuery) -> Result<Payload> {
		query.validate()?;

		self.execute(endpoint, query.into_params()).await
	}

	async fn execute_identity(&self, identity: RequestIdentity) -> Result<Payload> {
		if let Some(payload) = self.cache_hit(&identity) {
			return Ok(payload);
		}

		let guard = self.inflight_guard(&identity);
		let result = async {
			let _coalesced = guard.lock().await;

			// A coalesced leader may have populated the cache while this call waited.
			match self.cache_hit(&identity) {
				Some(payload) => Ok(payload),
				None => self.fetch(&identity).await,
			}
		}
		.await;

		self.release_inflight(&identity, guard);

		result
	}

	fn cache_hit(&self, identity: &RequestIdentity) -> Option<Payload> {
		let payload = self.cache.get(identity)?;

		self.metrics.record_cache_hit();
		obs::record_op_outcome(OpKind::Fetch, OpOutcome::CacheHit);

		tracing::debug!(identity = %identity, "Served WHOOP response from cache.");

		Some(payload)
	}

	fn inflight_guard(&self, identity: &RequestIdentity) -> Arc<AsyncMutex<()>> {
		let mut guards = self.inflight.lock();

		guards.entry(identity.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	fn release_inflight(&self, identity: &RequestIdentity, guard: Arc<AsyncMutex<()>>) {
		let mut guards = self.inflight.lock();

		// One reference in the map plus this caller's means nobody else is waiting.
		if Arc::strong_count(&guard) <= 2 {
			guards.remove(identity);
		}
	}

	async fn fetch(&self, identity: &RequestIdentity) -> Result<Payload> {
		let endpoint = identity.endpoint();

		if let RateLimitDecision::Reject(directive) =
			self.limiter.evaluate(&RateLimitContext::new(endpoint))
		{
			self.metrics.record_local_rejection();

			tracing::warn!(
				endpoint = endpoint.as_str(),
				retry_at = %directive.earliest_retry_at,
				reason = directive.reason.as_deref().unwrap_or_default(),
				"Local rate limit reached."
			);

			return Err(Error::RateLimitExceeded {
				origin: RateLimitOrigin::Local,
				retry_after: Some(directive.recommended_backoff),
			});
		}

		let token = self.tokens.get_valid_access_token().await?;
		let url = self.endpoint_url(endpoint)?;

		self.metrics.record_network_call();

		let response = self
			.http_client
			.get(url)
			.bearer_auth(token.expose())
			.query(identity.params())
			.send()
			.await
			.map_err(|e| UpstreamError::from_reqwest(endpoint.as_str(), e))?;
		let status = response.status().as_u16();
		let retry_after = http::parse_retry_after(response.headers());
		let body =
			response.bytes().await.map_err(|e| UpstreamError::from_reqwest(endpoint.as_str(), e))?;

		match status {
			200..=299 => {
				let payload = decode_payload(&body, status)?;

				self.cache.put(identity.clone(), payload.clone());

				tracing::debug!(identity = %identity, status, "Cached WHOOP response.");

				Ok(payload)
			},
			401 => Err(self.reject_token(&token)),
			429 => Err(Error::RateLimitExceeded { origin: RateLimitOrigin::Upstream, retry_after }),
			_ => Err(UpstreamError::Status {
				status,
				message: http::upstream_message(&body)
					.unwrap_or_else(|| format!("request to {endpoint} failed")),
			}
			.into()),
		}
	}

	fn reject_token(&self, token: &TokenSecret) -> Error {
		self.tokens.mark_rejected(token);

		tracing::warn!("WHOOP rejected the access token; it will be refreshed on the next call.");

		Error::AuthenticationFailed
	}

	fn endpoint_url(&self, endpoint: Endpoint) -> Result<Url, ConfigError> {
		let raw = format!("{}{}", self.config.api_base.as_str().trim_end_matches('/'), endpoint.path());

		Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { value: raw, source })
	}
}
impl Debug for Gateway {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("config", &self.config)
			.field("tokens", &self.tokens)
			.field("cache_len", &self.cache.len())
			.field("metrics", &self.metrics)
			.finish()
	}
}

fn decode_payload(body: &[u8], status: u16) -> Result<Payload, UpstreamError> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(Payload::from_body(Value::Null));
	}

	let value: Value =
		serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(body))
			.map_err(|source| UpstreamError::Decode { source, status: Some(status) })?;

	Ok(Payload::from_body(value))
}
