//! Gateway-level error types shared across the pipeline, token manager, and stores.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure unrelated to decryption.
	#[error("{0}")]
	Storage(#[source] crate::store::StoreError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Upstream call failed for a reason other than auth or rate limiting.
	#[error(transparent)]
	UpstreamRequestFailed(#[from] UpstreamError),

	/// No usable credential exists and it cannot be recovered silently.
	#[error("WHOOP re-authorization is required: {reason}.")]
	ReauthorizationRequired {
		/// Why the stored credential cannot be used.
		reason: String,
	},
	/// Upstream rejected the current access token.
	#[error("Authentication failed. Please re-authorize your WHOOP account.")]
	AuthenticationFailed,
	/// Local admission gate or the upstream API refused the call.
	#[error("Rate limit exceeded ({origin}). Please wait before making more requests.")]
	RateLimitExceeded {
		/// Which side enforced the limit.
		origin: RateLimitOrigin,
		/// Suggested wait, when known.
		retry_after: Option<Duration>,
	},
	/// Stored credential blob cannot be decrypted.
	#[error("Stored credentials cannot be decrypted: {message}.")]
	Decryption {
		/// Human-readable failure description.
		message: String,
	},
}
impl Error {
	/// Returns a stable snake_case label for the error category.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Storage(_) => "storage",
			Self::Config(_) => "config",
			Self::UpstreamRequestFailed(_) => "upstream_request_failed",
			Self::ReauthorizationRequired { .. } => "reauthorization_required",
			Self::AuthenticationFailed => "authentication_failed",
			Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
			Self::Decryption { .. } => "decryption_error",
		}
	}

	pub(crate) fn reauthorize(reason: impl Into<String>) -> Self {
		Self::ReauthorizationRequired { reason: reason.into() }
	}
}
impl From<crate::store::StoreError> for Error {
	fn from(e: crate::store::StoreError) -> Self {
		match e {
			crate::store::StoreError::Decryption { message } => Self::Decryption { message },
			other => Self::Storage(other),
		}
	}
}

/// Side that enforced a rate limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitOrigin {
	/// The local fixed-window pre-check.
	Local,
	/// The upstream API answered 429.
	Upstream,
}
impl Display for RateLimitOrigin {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Local => f.write_str("local"),
			Self::Upstream => f.write_str("upstream"),
		}
	}
}

/// Configuration and validation failures raised by the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A configured URL cannot be used.
	#[error("Configured URL `{value}` is invalid.")]
	InvalidUrl {
		/// Offending value.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// An environment override could not be parsed.
	#[error("Environment variable `{name}` has an invalid value `{value}`.")]
	InvalidEnv {
		/// Variable name.
		name: &'static str,
		/// Raw value.
		value: String,
	},
	/// Storage directory could not be determined.
	#[error("Storage directory is not set and HOME is unavailable.")]
	MissingStorageDir,

	/// The rate-limit ceiling must admit at least one request.
	#[error("Rate limit ceiling must be positive.")]
	ZeroRateLimit,
	/// The network timeout must be positive.
	#[error("Request timeout must be positive.")]
	ZeroTimeout,
	/// A duration setting exceeds what the gateway accepts.
	#[error("Setting `{name}` is {value}s, above the maximum of {max}s.")]
	DurationTooLong {
		/// Setting name.
		name: &'static str,
		/// Configured seconds.
		value: u64,
		/// Largest accepted value in seconds.
		max: u64,
	},
	/// Query limit is outside what the upstream accepts.
	#[error("Result limit {limit} is outside the supported range 1..={max}.")]
	InvalidLimit {
		/// Requested limit.
		limit: u32,
		/// Upper bound accepted by the upstream.
		max: u32,
	},
	/// Endpoint name is not recognized.
	#[error("Unknown endpoint `{name}`.")]
	UnknownEndpoint {
		/// Requested endpoint name.
		name: String,
	},
	/// Credential record builder validation failed.
	#[error("Unable to build credential record.")]
	TokenBuild(#[from] crate::auth::CredentialRecordBuilderError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Upstream failures that are neither auth rejections nor rate limiting.
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// Upstream answered with a non-success status.
	#[error("API request failed with status {status}: {message}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Upstream-provided message when parseable, else a generic summary.
		message: String,
	},
	/// The call did not finish within the configured timeout.
	#[error("Request to {target} timed out. Please try again.")]
	Timeout {
		/// Logical target (endpoint name or `token_refresh`).
		target: String,
	},
	/// Network-level failure (DNS, TCP, TLS).
	#[error("Network error occurred while calling {target}.")]
	Network {
		/// Logical target (endpoint name or `token_refresh`).
		target: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Upstream responded with a body that could not be decoded.
	#[error("Upstream returned malformed JSON.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl UpstreamError {
	/// Wraps a transport-specific network error.
	pub fn network(
		target: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { target: target.into(), source: Box::new(src) }
	}

	/// Classifies a reqwest failure into a timeout or network error.
	pub fn from_reqwest(target: impl Into<String>, e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout { target: target.into() } } else { Self::network(target, e) }
	}

	/// Returns the HTTP status attached to the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status { status, .. } => Some(*status),
			Self::Decode { status, .. } => *status,
			Self::Timeout { .. } | Self::Network { .. } => None,
		}
	}

	/// Returns `true` when the call timed out.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn decryption_store_errors_become_top_level_decryption() {
		let err: Error = StoreError::Decryption { message: "bad tag".into() }.into();

		assert!(matches!(err, Error::Decryption { .. }));
		assert_eq!(err.kind(), "decryption_error");
	}

	#[test]
	fn backend_store_errors_keep_their_source() {
		let store_error = StoreError::Backend { message: "disk full".into() };
		let err: Error = store_error.clone().into();

		assert!(matches!(err, Error::Storage(_)));
		assert!(err.to_string().contains("disk full"));

		let source = StdError::source(&err).expect("Storage errors should expose their source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn rate_limit_message_names_origin() {
		let err = Error::RateLimitExceeded { origin: RateLimitOrigin::Upstream, retry_after: None };

		assert!(err.to_string().contains("upstream"));
		assert_eq!(err.kind(), "rate_limit_exceeded");
	}
}
