//! Refresh exchanges: turning a refresh token into a fresh token grant.
//!
//! The gateway ships two implementations. [`ProxyExchange`] speaks the JSON refresh
//! proxy used by the personal-integrations deployment; [`OAuth2Exchange`] performs a
//! standard `grant_type=refresh_token` call against an OAuth 2.0 token endpoint.
//! Both classify a rejected refresh token as [`Error::ReauthorizationRequired`] and
//! everything else as [`Error::UpstreamRequestFailed`], so the token manager can tell a
//! dead credential from a flaky network.

pub mod oauth;
pub mod proxy;

pub use oauth::OAuth2Exchange;
pub use proxy::ProxyExchange;

// self
use crate::{
	_prelude::*,
	auth::{CredentialRecord, CredentialRecordBuilderError, TokenSecret},
};

/// Boxed future returned by [`RefreshExchange::refresh`].
pub type ExchangeFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenGrant>> + 'a + Send>>;

/// Upstream call that mints a new access token from a refresh token.
pub trait RefreshExchange
where
	Self: Send + Sync,
{
	/// Exchanges `refresh_token` for a new grant.
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> ExchangeFuture<'a>;
}

/// Tokens returned by an authorization or refresh exchange.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
	/// New access token.
	pub access_token: String,
	/// Rotated refresh token, when the issuer sends one.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Issuer-reported token type.
	#[serde(default)]
	pub token_type: Option<String>,
	/// Lifetime of the access token in seconds.
	#[serde(default)]
	pub expires_in: Option<i64>,
}
impl TokenGrant {
	/// Creates a grant carrying only an access token.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self { access_token: access_token.into(), refresh_token: None, token_type: None, expires_in: None }
	}

	/// Attaches a refresh token.
	pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(token.into());

		self
	}

	/// Attaches a lifetime.
	pub fn with_expires_in(mut self, seconds: i64) -> Self {
		self.expires_in = Some(seconds);

		self
	}

	/// Builds the record that replaces the current one.
	///
	/// `previous_refresh` is carried over when the issuer does not rotate the refresh token.
	/// A missing, non-positive, or out-of-range `expires_in` yields a non-expiring record.
	pub fn into_record(
		self,
		previous_refresh: Option<&TokenSecret>,
		issued_at: OffsetDateTime,
	) -> Result<CredentialRecord, CredentialRecordBuilderError> {
		let mut builder = CredentialRecord::builder().access_token(self.access_token).issued_at(issued_at);

		if let Some(kind) = self.token_type {
			builder = builder.token_type(kind);
		}
		if let Some(secs) = self.expires_in.filter(|secs| *secs > 0) {
			builder = builder.expires_in(Duration::seconds(secs));
		}

		match self.refresh_token.filter(|token| !token.trim().is_empty()) {
			Some(rotated) => builder = builder.refresh_token(rotated),
			None =>
				if let Some(previous) = previous_refresh {
					builder = builder.refresh_token(previous.expose());
				},
		}

		builder.build()
	}
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::TokenStatus;

	#[test]
	fn grant_keeps_previous_refresh_when_not_rotated() {
		let previous = TokenSecret::new("refresh-old");
		let record = TokenGrant::new("access-new")
			.with_expires_in(3600)
			.into_record(Some(&previous), macros::datetime!(2025-01-01 00:00 UTC))
			.expect("Grant should convert.");

		assert_eq!(record.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-old"));
		assert_eq!(record.expires_at, Some(macros::datetime!(2025-01-01 01:00 UTC)));
	}

	#[test]
	fn grant_prefers_rotated_refresh_and_ignores_bad_lifetimes() {
		let previous = TokenSecret::new("refresh-old");
		let record = TokenGrant::new("access-new")
			.with_refresh_token("refresh-new")
			.with_expires_in(0)
			.into_record(Some(&previous), OffsetDateTime::now_utc())
			.expect("Grant should convert.");

		assert_eq!(record.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-new"));
		assert_eq!(record.expires_at, None);
	}

	#[test]
	fn grant_with_huge_lifetime_does_not_overflow() {
		let record = TokenGrant::new("access-new")
			.with_expires_in(i64::MAX)
			.into_record(None, OffsetDateTime::now_utc())
			.expect("Huge lifetime should still convert.");

		assert_eq!(record.expires_at, None);
		assert_eq!(record.status_at(OffsetDateTime::now_utc(), Duration::minutes(5)), TokenStatus::Active);
	}

	#[test]
	fn grant_debug_is_redacted() {
		let grant = TokenGrant::new("visible?").with_refresh_token("hidden?");
		let rendered = format!("{grant:?}");

		assert!(!rendered.contains("visible?"));
		assert!(!rendered.contains("hidden?"));
	}
}
