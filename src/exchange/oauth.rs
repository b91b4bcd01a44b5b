//! Standard OAuth 2.0 refresh grant via the `oauth2` crate.

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError, RefreshToken,
	RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{
		BasicClient, BasicErrorResponse, BasicErrorResponseType, BasicRequestTokenError,
		BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, UpstreamError},
	exchange::{ExchangeFuture, RefreshExchange, TokenGrant},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

const TARGET: &str = "token_refresh";

/// Refresh exchange against an RFC 6749 token endpoint.
pub struct OAuth2Exchange {
	oauth_client: ConfiguredBasicClient,
	http_client: ReqwestHttpClient,
	scopes: Vec<String>,
}
impl OAuth2Exchange {
	/// Creates an exchange for `token_url` authenticating with `client_id`/`client_secret`.
	///
	/// Client credentials are sent in the request body, which is what WHOOP expects.
	pub fn new(
		token_url: &Url,
		client_id: impl Into<String>,
		client_secret: Option<String>,
		http_client: ReqwestHttpClient,
	) -> Result<Self, ConfigError> {
		let token_url = TokenUrl::new(token_url.to_string())
			.map_err(|source| ConfigError::InvalidUrl { value: token_url.to_string(), source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(client_id.into()))
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		if let Some(secret) = client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret));
		}

		Ok(Self { oauth_client, http_client, scopes: Vec::new() })
	}

	/// Requests `scopes` on every refresh (WHOOP needs `offline` to rotate refresh tokens).
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	async fn refresh_now(&self, refresh_token: &TokenSecret) -> Result<TokenGrant> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.instrumented(meta.clone());
		let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
		let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

		for scope in &self.scopes {
			request = request.add_scope(Scope::new(scope.to_owned()));
		}

		let response = request
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(meta.take(), err))?;
		let expires_in = response
			.expires_in()
			.map(|lifetime| i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX));
		let token_type = match response.token_type() {
			BasicTokenType::Bearer => "Bearer".to_owned(),
			BasicTokenType::Mac => "MAC".to_owned(),
			BasicTokenType::Extension(kind) => kind.clone(),
		};

		Ok(TokenGrant {
			access_token: response.access_token().secret().to_owned(),
			refresh_token: response.refresh_token().map(|token| token.secret().to_owned()),
			token_type: Some(token_type),
			expires_in,
		})
	}
}
impl RefreshExchange for OAuth2Exchange {
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> ExchangeFuture<'a> {
		Box::pin(self.refresh_now(refresh_token))
	}
}
impl Debug for OAuth2Exchange {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuth2Exchange")
			.field("client_id", self.oauth_client.client_id())
			.field("scopes", &self.scopes)
			.finish()
	}
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> Error {
	let status = meta.as_ref().and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(status, response),
		RequestTokenError::Request(error) => map_transport_error(status, error),
		RequestTokenError::Parse(source, _body) => UpstreamError::Decode { source, status }.into(),
		RequestTokenError::Other(message) => UpstreamError::Status {
			status: status.unwrap_or_default(),
			message: format!("Token endpoint returned an unexpected response: {message}"),
		}
		.into(),
	}
}

fn map_server_response_error(status: Option<u16>, response: BasicErrorResponse) -> Error {
	let message = match response.error_description() {
		Some(description) => description.clone(),
		None => response.error().as_ref().to_owned(),
	};

	match response.error() {
		BasicErrorResponseType::InvalidGrant
		| BasicErrorResponseType::InvalidClient
		| BasicErrorResponseType::UnauthorizedClient => Error::reauthorize(message),
		_ if matches!(status, Some(401)) => Error::reauthorize(message),
		_ => UpstreamError::Status { status: status.unwrap_or(400), message }.into(),
	}
}

fn map_transport_error(status: Option<u16>, err: HttpClientError<ReqwestError>) -> Error {
	match err {
		HttpClientError::Reqwest(inner) => UpstreamError::from_reqwest(TARGET, *inner).into(),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => UpstreamError::network(TARGET, inner).into(),
		HttpClientError::Other(message) => UpstreamError::Status {
			status: status.unwrap_or_default(),
			message: format!("HTTP client error occurred while calling the token endpoint: {message}"),
		}
		.into(),
		_ => UpstreamError::Status {
			status: status.unwrap_or_default(),
			message: "HTTP client error occurred while calling the token endpoint".into(),
		}
		.into(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn builds_request_body_client() {
		let url = Url::parse("https://api.prod.whoop.com/oauth/oauth2/token")
			.expect("Failed to parse token endpoint URL.");
		let http_client = ReqwestHttpClient::with_timeout(std::time::Duration::from_secs(5))
			.expect("Failed to build HTTP client.");
		let exchange =
			OAuth2Exchange::new(&url, "client-id", Some("secret".into()), http_client)
				.expect("Exchange should build.")
				.with_scopes(["offline", "read:recovery"]);

		assert_eq!(exchange.scopes, vec!["offline".to_owned(), "read:recovery".to_owned()]);
		assert!(format!("{exchange:?}").contains("client-id"));
	}

	#[test]
	fn invalid_grant_requires_reauthorization() {
		let response = BasicErrorResponse::new(
			BasicErrorResponseType::InvalidGrant,
			Some("refresh token revoked".into()),
			None,
		);
		let err = map_server_response_error(Some(400), response);

		assert!(matches!(err, Error::ReauthorizationRequired { ref reason } if reason == "refresh token revoked"));
	}

	#[test]
	fn server_errors_stay_upstream_failures() {
		let response = BasicErrorResponse::new(BasicErrorResponseType::InvalidRequest, None, None);
		let err = map_server_response_error(Some(400), response);

		assert!(matches!(
			err,
			Error::UpstreamRequestFailed(UpstreamError::Status { status: 400, .. })
		));
	}
}
