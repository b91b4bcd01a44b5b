// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use whoop_gateway::{
	_preludet::*,
	auth::TokenManager,
	exchange::{OAuth2Exchange, RefreshExchange},
	http::ReqwestHttpClient,
	store::{CredentialStore, MemoryStore},
};

const CLIENT_ID: &str = "client-whoop";
const CLIENT_SECRET: &str = "secret-whoop";

fn build_manager(server: &MockServer) -> (TokenManager, Arc<MemoryStore>) {
	let token_url = Url::parse(&server.url("/oauth/oauth2/token"))
		.expect("Mock token endpoint should parse successfully.");
	let http_client = ReqwestHttpClient::with_timeout(std::time::Duration::from_secs(5))
		.expect("HTTP client should build successfully.");
	let exchange: Arc<dyn RefreshExchange> = Arc::new(
		OAuth2Exchange::new(&token_url, CLIENT_ID, Some(CLIENT_SECRET.into()), http_client)
			.expect("OAuth2 exchange should build successfully.")
			.with_scopes(["offline"]),
	);
	let backend = Arc::new(MemoryStore::with_record(Some(expired_record(
		"access-old",
		Some("refresh-old"),
	))));
	let store: Arc<dyn CredentialStore> = backend.clone();

	(TokenManager::new(store, exchange, Duration::minutes(5)), backend)
}

#[tokio::test]
async fn oauth2_refresh_rotates_tokens() {
	let server = MockServer::start_async().await;
	let (manager, store) = build_manager(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/oauth2/token")
				.body_includes("grant_type=refresh_token")
				.body_includes("refresh_token=refresh-old")
				.body_includes("client_id=client-whoop")
				.body_includes("scope=offline");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"access_token": "access-new",
				"refresh_token": "refresh-new",
				"token_type": "bearer",
				"expires_in": 3600
			}));
		})
		.await;
	let token = manager.get_valid_access_token().await.expect("OAuth2 refresh should succeed.");

	mock.assert_async().await;

	assert_eq!(token.expose(), "access-new");

	let persisted = store.snapshot().expect("Refreshed record should be persisted.");

	assert_eq!(persisted.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-new"));
	assert!(persisted.expires_at.is_some());
}

#[tokio::test]
async fn oauth2_invalid_grant_requires_reauthorization() {
	let server = MockServer::start_async().await;
	let (manager, _) = build_manager(&server);

	server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/oauth2/token");
			then.status(400).header("content-type", "application/json").json_body(json!({
				"error": "invalid_grant",
				"error_description": "The refresh token is invalid."
			}));
		})
		.await;

	let err = manager.get_valid_access_token().await.expect_err("invalid_grant should fail.");

	assert!(matches!(err, Error::ReauthorizationRequired { .. }));
}
