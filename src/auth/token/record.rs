//! Credential record struct, lifecycle helpers, and builder.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Lifecycle status for a credential record at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
	/// Token is valid and outside the safety margin.
	Active,
	/// Token is still valid but falls inside the safety margin.
	ExpiringSoon,
	/// Token is past its literal expiry.
	Expired,
	/// Upstream rejected the token with a 401.
	Rejected,
}

/// Errors produced by [`CredentialRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
}

/// Access/refresh token pair plus expiry metadata.
///
/// Records are replaced whole on every refresh so an access token is never paired with a
/// refresh token from another generation.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
	/// Bearer credential for the data API.
	pub access_token: TokenSecret,
	/// Longer-lived secret used to mint new access tokens.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Token type reported by the issuer (normally `Bearer`).
	pub token_type: String,
	/// Instant the record was issued.
	#[serde(with = "time::serde::rfc3339")]
	pub issued_at: OffsetDateTime,
	/// Absolute expiry; `None` means non-expiring until upstream rejects it.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub expires_at: Option<OffsetDateTime>,
	/// Instant upstream rejected the access token. Never persisted.
	#[serde(skip)]
	pub rejected_at: Option<OffsetDateTime>,
}
impl CredentialRecord {
	/// Default token type when the issuer does not report one.
	pub const DEFAULT_TOKEN_TYPE: &'static str = "Bearer";

	/// Returns a builder for constructing records.
	pub fn builder() -> CredentialRecordBuilder {
		CredentialRecordBuilder::default()
	}

	/// Computes the lifecycle status at `instant`, treating the last `margin` before expiry
	/// as [`TokenStatus::ExpiringSoon`].
	pub fn status_at(&self, instant: OffsetDateTime, margin: Duration) -> TokenStatus {
		if self.rejected_at.is_some() {
			return TokenStatus::Rejected;
		}

		let Some(expires_at) = self.expires_at else {
			return TokenStatus::Active;
		};

		if instant >= expires_at {
			return TokenStatus::Expired;
		}
		if expires_at.checked_sub(margin).is_none_or(|edge| instant >= edge) {
			return TokenStatus::ExpiringSoon;
		}

		TokenStatus::Active
	}

	/// Returns `true` if the record is past its literal expiry or was rejected.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant, Duration::ZERO), TokenStatus::Expired | TokenStatus::Rejected)
	}

	/// Returns `true` if a refresh token is available.
	pub fn can_refresh(&self) -> bool {
		self.refresh_token.is_some()
	}

	/// Marks the access token as rejected by upstream.
	pub fn reject(&mut self, instant: OffsetDateTime) {
		self.rejected_at = Some(instant);
	}
}
impl Debug for CredentialRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialRecord")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("token_type", &self.token_type)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("rejected_at", &self.rejected_at)
			.finish()
	}
}

/// Builder for [`CredentialRecord`].
#[derive(Clone, Debug, Default)]
pub struct CredentialRecordBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	token_type: Option<String>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CredentialRecordBuilder {
	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Convenience helper that stamps `issued_at` with the current clock.
	pub fn issued_now(self) -> Self {
		self.issued_at(OffsetDateTime::now_utc())
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	///
	/// A duration reaching past the representable range yields a non-expiring record.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value. Blank values are ignored.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		let secret = TokenSecret::new(token);

		self.refresh_token = if secret.is_blank() { None } else { Some(secret) };

		self
	}

	/// Overrides the token type.
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Consumes the builder and produces a [`CredentialRecord`].
	pub fn build(self) -> Result<CredentialRecord, CredentialRecordBuilderError> {
		let access_token = self
			.access_token
			.filter(|token| !token.is_blank())
			.ok_or(CredentialRecordBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) => issued_at.checked_add(delta),
			(None, None) => None,
		};

		Ok(CredentialRecord {
			access_token,
			refresh_token: self.refresh_token,
			token_type: self
				.token_type
				.filter(|kind| !kind.trim().is_empty())
				.unwrap_or_else(|| CredentialRecord::DEFAULT_TOKEN_TYPE.into()),
			issued_at,
			expires_at,
			rejected_at: None,
		})
	}
}
