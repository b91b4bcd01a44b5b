//! JSON refresh proxy exchange.
//!
//! The proxy holds the OAuth client secret on the server side; the gateway only posts
//! `{"refresh_token": ...}` and receives `{success, access_token, refresh_token,
//! expires_in, token_type}` or `{success: false, error}`.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, UpstreamError},
	exchange::{ExchangeFuture, RefreshExchange, TokenGrant},
	http::{self, ReqwestHttpClient},
};

const TARGET: &str = "token_refresh";

#[derive(Serialize)]
struct ProxyRequest<'a> {
	refresh_token: &'a str,
}

#[derive(Deserialize)]
struct ProxyResponse {
	#[serde(default)]
	success: Option<bool>,
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
}

/// Refresh exchange against the JSON refresh proxy.
#[derive(Clone, Debug)]
pub struct ProxyExchange {
	url: Url,
	http_client: ReqwestHttpClient,
}
impl ProxyExchange {
	/// Creates an exchange posting to `url`, bounded by `timeout`.
	pub fn new(url: Url, timeout: std::time::Duration) -> Result<Self, ConfigError> {
		Ok(Self { url, http_client: ReqwestHttpClient::with_timeout(timeout)? })
	}

	/// Creates an exchange reusing an existing HTTP client.
	pub fn with_http_client(url: Url, http_client: ReqwestHttpClient) -> Self {
		Self { url, http_client }
	}

	async fn refresh_now(&self, refresh_token: &TokenSecret) -> Result<TokenGrant> {
		let response = self
			.http_client
			.post(self.url.clone())
			.json(&ProxyRequest { refresh_token: refresh_token.expose() })
			.send()
			.await
			.map_err(|e| UpstreamError::from_reqwest(TARGET, e))?;
		let status = response.status();
		let body = response.bytes().await.map_err(|e| UpstreamError::from_reqwest(TARGET, e))?;

		if matches!(status.as_u16(), 400 | 401 | 403) {
			let reason = http::upstream_message(&body)
				.unwrap_or_else(|| format!("refresh token rejected with status {}", status.as_u16()));

			return Err(Error::reauthorize(reason));
		}
		if !status.is_success() {
			return Err(UpstreamError::Status {
				status: status.as_u16(),
				message: http::upstream_message(&body)
					.unwrap_or_else(|| format!("Token refresh failed with status {}", status.as_u16())),
			}
			.into());
		}

		let parsed: ProxyResponse =
			serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(&body))
				.map_err(|source| UpstreamError::Decode { source, status: Some(status.as_u16()) })?;

		if parsed.success == Some(false) {
			return Err(Error::reauthorize(
				parsed.error.unwrap_or_else(|| "refresh proxy reported failure".into()),
			));
		}

		let access_token = parsed.access_token.filter(|token| !token.trim().is_empty()).ok_or_else(
			|| UpstreamError::Status {
				status: status.as_u16(),
				message: "Refresh response did not include an access token".into(),
			},
		)?;

		Ok(TokenGrant {
			access_token,
			refresh_token: parsed.refresh_token,
			token_type: parsed.token_type,
			expires_in: parsed.expires_in,
		})
	}
}
impl RefreshExchange for ProxyExchange {
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> ExchangeFuture<'a> {
		Box::pin(self.refresh_now(refresh_token))
	}
}
