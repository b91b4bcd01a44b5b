//! Token lifecycle manager: decides whether the stored access token is usable and refreshes
//! it single-flight when it is not.
//!
//! The manager owns the in-memory view of the single user's [`CredentialRecord`]. The record
//! is loaded lazily from the [`CredentialStore`] on first use and replaced whole after every
//! refresh. Expiry is evaluated lazily on each call; nothing runs in the background.
//!
//! A refresh rejected by the issuer drops the in-memory record and surfaces
//! [`Error::ReauthorizationRequired`]. The persisted blob is left in place so the external
//! setup flow can inspect or replace it, after which [`TokenManager::reload`] picks up the
//! new record. Transport failures keep the expired record so the next call retries.

// self
use crate::{
	_prelude::*,
	auth::{CredentialRecord, RefreshMetrics, TokenSecret, TokenStatus},
	error::ConfigError,
	exchange::{RefreshExchange, TokenGrant},
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::CredentialStore,
};

/// Default window before expiry in which the access token is refreshed proactively.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::minutes(5);

/// Coarse credential state reported by [`TokenManager::auth_status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
	/// No credential record is available.
	NoTokens,
	/// The access token has not reached its literal expiry.
	Valid,
	/// The access token is past its expiry or was rejected upstream.
	Expired,
}

/// Snapshot of the credential state, computed without any network call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
	/// Coarse state.
	pub status: AuthState,
	/// Absolute expiry of the access token, when known.
	#[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<OffsetDateTime>,
	/// Instant the current record was issued.
	#[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
	pub issued_at: Option<OffsetDateTime>,
	/// Token type of the current record.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
	/// Whether a refresh token is stored.
	pub has_refresh_token: bool,
}
impl AuthStatus {
	/// Computes the status of `record` at `instant` using literal expiry.
	pub fn from_record_at(record: Option<&CredentialRecord>, instant: OffsetDateTime) -> Self {
		let Some(record) = record else {
			return Self {
				status: AuthState::NoTokens,
				expires_at: None,
				issued_at: None,
				token_type: None,
				has_refresh_token: false,
			};
		};
		let status = if record.is_expired_at(instant) { AuthState::Expired } else { AuthState::Valid };

		Self {
			status,
			expires_at: record.expires_at,
			issued_at: Some(record.issued_at),
			token_type: Some(record.token_type.clone()),
			has_refresh_token: record.can_refresh(),
		}
	}
}

#[derive(Debug)]
enum TokenState {
	Unloaded,
	Unauthenticated,
	Loaded(CredentialRecord),
}

enum Access {
	Serve(TokenSecret),
	Refresh(TokenSecret),
	Missing,
	Stale,
}

/// Owns the access/refresh token pair and keeps the access token usable.
pub struct TokenManager {
	store: Arc<dyn CredentialStore>,
	exchange: Arc<dyn RefreshExchange>,
	safety_margin: Duration,
	state: RwLock<TokenState>,
	refresh_guard: AsyncMutex<()>,
	refresh_metrics: Arc<RefreshMetrics>,
}
impl TokenManager {
	/// Creates a manager over `store` that refreshes through `exchange`.
	///
	/// Nothing is read from the store until the first call that needs the record.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		exchange: Arc<dyn RefreshExchange>,
		safety_margin: Duration,
	) -> Self {
		Self {
			store,
			exchange,
			safety_margin,
			state: RwLock::new(TokenState::Unloaded),
			refresh_guard: AsyncMutex::new(()),
			refresh_metrics: Arc::new(RefreshMetrics::default()),
		}
	}

	/// Window before expiry in which the token counts as expired.
	pub fn safety_margin(&self) -> Duration {
		self.safety_margin
	}

	/// Shared refresh counters.
	pub fn refresh_metrics(&self) -> Arc<RefreshMetrics> {
		Arc::clone(&self.refresh_metrics)
	}

	/// Returns an access token that is safe to send, refreshing it first when needed.
	///
	/// Valid tokens are returned without any I/O. An expired token with a refresh token is
	/// refreshed once even when many callers arrive together; the others reuse the result.
	pub async fn get_valid_access_token(&self) -> Result<TokenSecret> {
		self.ensure_loaded().await?;

		match self.classify(OffsetDateTime::now_utc()) {
			Access::Serve(token) => Ok(token),
			Access::Missing => Err(no_credentials()),
			Access::Stale => Err(self.drop_stale()),
			Access::Refresh(_) => self.refresh().await,
		}
	}

	/// Marks the current access token as rejected so the next call refreshes it.
	pub fn mark_expired(&self) {
		if let TokenState::Loaded(record) = &mut *self.state.write() {
			record.reject(OffsetDateTime::now_utc());
		}
	}

	/// Marks `token` as rejected, unless a refresh already replaced it.
	pub fn mark_rejected(&self, token: &TokenSecret) {
		if let TokenState::Loaded(record) = &mut *self.state.write()
			&& record.access_token == *token
		{
			record.reject(OffsetDateTime::now_utc());
		}
	}

	/// Persists a record minted by the external authorization exchange and starts using it.
	pub async fn install(&self, grant: TokenGrant) -> Result<()> {
		let _singleflight = self.refresh_guard.lock().await;
		let record =
			grant.into_record(None, OffsetDateTime::now_utc()).map_err(ConfigError::from)?;

		self.store.save(record.clone()).await?;
		*self.state.write() = TokenState::Loaded(record);

		tracing::info!("Installed new WHOOP credentials.");

		Ok(())
	}

	/// Re-reads the record from the store, discarding the in-memory view.
	pub async fn reload(&self) -> Result<()> {
		let _singleflight = self.refresh_guard.lock().await;

		self.load_locked().await
	}

	/// Removes the persisted record and forgets the in-memory one.
	///
	/// Returns `true` when a persisted record existed.
	pub async fn logout(&self) -> Result<bool> {
		let _singleflight = self.refresh_guard.lock().await;
		let existed = self.store.clear().await?;

		*self.state.write() = TokenState::Unauthenticated;

		tracing::info!(existed, "Cleared WHOOP credentials.");

		Ok(existed)
	}

	/// Reports the credential state using literal expiry. Never touches the network.
	pub async fn auth_status(&self) -> Result<AuthStatus> {
		self.ensure_loaded().await?;

		Ok(self.auth_status_at(OffsetDateTime::now_utc()))
	}

	/// Reports the in-memory credential state at `instant` without loading from the store.
	pub fn auth_status_at(&self, instant: OffsetDateTime) -> AuthStatus {
		match &*self.state.read() {
			TokenState::Loaded(record) => AuthStatus::from_record_at(Some(record), instant),
			TokenState::Unloaded | TokenState::Unauthenticated =>
				AuthStatus::from_record_at(None, instant),
		}
	}

	async fn ensure_loaded(&self) -> Result<()> {
		if !matches!(*self.state.read(), TokenState::Unloaded) {
			return Ok(());
		}

		let _singleflight = self.refresh_guard.lock().await;

		if !matches!(*self.state.read(), TokenState::Unloaded) {
			return Ok(());
		}

		self.load_locked().await
	}

	async fn load_locked(&self) -> Result<()> {
		let loaded = self.store.load().await?;

		tracing::debug!(found = loaded.is_some(), "Loaded WHOOP credentials from store.");

		*self.state.write() = match loaded {
			Some(record) => TokenState::Loaded(record),
			None => TokenState::Unauthenticated,
		};

		Ok(())
	}

	fn classify(&self, instant: OffsetDateTime) -> Access {
		let state = self.state.read();
		let TokenState::Loaded(record) = &*state else {
			return Access::Missing;
		};

		match (record.status_at(instant, self.safety_margin), &record.refresh_token) {
			(TokenStatus::Active, _) => Access::Serve(record.access_token.clone()),
			(_, Some(refresh)) => Access::Refresh(refresh.clone()),
			// Nothing to refresh with, but the token itself still works.
			(TokenStatus::ExpiringSoon, None) => Access::Serve(record.access_token.clone()),
			(TokenStatus::Expired | TokenStatus::Rejected, None) => Access::Stale,
		}
	}

	fn drop_stale(&self) -> Error {
		*self.state.write() = TokenState::Unauthenticated;

		tracing::warn!("Access token expired and no refresh token is stored.");

		Error::reauthorize("the access token expired and no refresh token is stored")
	}

	async fn refresh(&self) -> Result<TokenSecret> {
		const KIND: OpKind = OpKind::Refresh;

		let span = OpSpan::new(KIND, "get_valid_access_token");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let _singleflight = self.refresh_guard.lock().await;
				// Another caller may have finished the refresh while this one waited.
				let refresh_token = match self.classify(OffsetDateTime::now_utc()) {
					Access::Serve(token) => return Ok(token),
					Access::Missing => return Err(no_credentials()),
					Access::Stale => return Err(self.drop_stale()),
					Access::Refresh(refresh_token) => refresh_token,
				};

				self.refresh_metrics.record_attempt();

				let outcome = self.exchange_locked(&refresh_token).await;

				match &outcome {
					Ok(_) => {
						self.refresh_metrics.record_success();

						tracing::info!("Refreshed WHOOP access token.");
					},
					Err(err @ Error::ReauthorizationRequired { .. }) => {
						self.refresh_metrics.record_failure();
						*self.state.write() = TokenState::Unauthenticated;

						tracing::warn!(error = %err, "Refresh token was rejected.");
					},
					Err(err) => {
						self.refresh_metrics.record_failure();

						tracing::warn!(error = %err, kind = err.kind(), "Token refresh failed.");
					},
				}

				outcome
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	async fn exchange_locked(&self, refresh_token: &TokenSecret) -> Result<TokenSecret> {
		let grant = self.exchange.refresh(refresh_token).await?;
		let record = grant
			.into_record(Some(refresh_token), OffsetDateTime::now_utc())
			.map_err(ConfigError::from)?;
		let access_token = record.access_token.clone();

		// Keep the new record in memory even if persisting it fails; a rotated refresh
		// token is unrecoverable once dropped.
		*self.state.write() = TokenState::Loaded(record.clone());
		self.store.save(record).await?;

		Ok(access_token)
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("safety_margin", &self.safety_margin)
			.field("state", &*self.state.read())
			.field("refresh_metrics", &self.refresh_metrics)
			.finish()
	}
}

fn no_credentials() -> Error {
	Error::reauthorize("no WHOOP credentials are stored")
}
