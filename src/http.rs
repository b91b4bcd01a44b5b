//! Transport primitives shared by the data pipeline and the refresh exchanges.
//!
//! [`ReqwestHttpClient`] wraps the one reqwest client every outbound call goes through.
//! [`ResponseMetadataSlot`] lets the `oauth2` adapter report the HTTP status and
//! `Retry-After` hint of a failed token call back to the error mapper.

// std
use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
use reqwest::{
	header::{HeaderMap, RETRY_AFTER},
	redirect::Policy,
};
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::ConfigError};

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Redirects are never followed: neither the data API nor the token endpoints delegate
/// to another URI, and following one would forward the bearer credential.
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient(pub ReqwestClient);
impl ReqwestHttpClient {
	/// Builds a client whose every request is bounded by `timeout`.
	pub fn with_timeout(timeout: std::time::Duration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.timeout(timeout)
			.redirect(Policy::none())
			.user_agent(concat!("whoop-gateway/", env!("CARGO_PKG_VERSION")))
			.build()?;

		Ok(Self(client))
	}

	/// Builds an instrumented handle for the `oauth2` crate that records outcomes in `slot`.
	pub(crate) fn instrumented(&self, slot: ResponseMetadataSlot) -> InstrumentedHandle {
		InstrumentedHandle(Arc::new(InstrumentedHttpClient { client: self.0.clone(), slot }))
	}
}
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

/// [`AsyncHttpClient`] adapter handed to `oauth2` request builders.
#[derive(Clone)]
pub(crate) struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let retry_after = parse_retry_after(&headers);

			client.slot.store(ResponseMetadata { status: Some(status.as_u16()), retry_after });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Reads `Retry-After` as delta-seconds or an HTTP date.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

/// Extracts a human-readable message from an upstream JSON error body.
pub(crate) fn upstream_message(body: &[u8]) -> Option<String> {
	const FIELDS: [&str; 4] = ["message", "error_description", "error", "detail"];

	let value: Value = serde_json::from_slice(body).ok()?;

	FIELDS.iter().find_map(|field| match value.get(field)? {
		Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
		Value::Object(inner) =>
			inner.get("message").and_then(Value::as_str).map(|text| text.trim().to_owned()),
		_ => None,
	})
}

#[cfg(test)]
mod tests {
	// crates.io
	use reqwest::header::HeaderValue;
	// self
	use super::*;

	#[test]
	fn retry_after_accepts_delta_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_static("42"));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(42)));
	}

	#[test]
	fn retry_after_ignores_past_dates_and_garbage() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));

		assert_eq!(parse_retry_after(&headers), None);

		headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));

		assert_eq!(parse_retry_after(&headers), None);
		assert_eq!(parse_retry_after(&HeaderMap::new()), None);
	}

	#[test]
	fn upstream_message_prefers_message_field() {
		assert_eq!(
			upstream_message(br#"{"error":"bad","message":"Limit must be <= 25"}"#),
			Some("Limit must be <= 25".into())
		);
		assert_eq!(
			upstream_message(br#"{"error":{"message":"nested"}}"#),
			Some("nested".into())
		);
		assert_eq!(upstream_message(b"<html>oops</html>"), None);
		assert_eq!(upstream_message(br#"{"message":"  "}"#), None);
	}

	#[test]
	fn metadata_slot_is_consumed_on_take() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata { status: Some(429), retry_after: None });

		assert_eq!(slot.take().and_then(|meta| meta.status), Some(429));
		assert!(slot.take().is_none());
	}
}
