// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use whoop_gateway::{
	_preludet::*,
	auth::{AuthState, CredentialRecord},
	endpoint::DataQuery,
	error::UpstreamError,
};

#[tokio::test]
async fn expired_token_refreshes_once_for_concurrent_requests() {
	let server = MockServer::start_async().await;
	let (gateway, store) =
		build_test_gateway(&server.base_url(), Some(expired_record("access-old", Some("refresh-1"))));
	let gateway = Arc::new(gateway);
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200)
				.delay(std::time::Duration::from_millis(150))
				.json_body(json!({ "success": true, "access_token": "access-new", "expires_in": 3600 }));
		})
		.await;
	let data = server
		.mock_async(|when, then| {
			when.method(GET).path("/cycle").header("authorization", "Bearer access-new");
			then.status(200).json_body(json!({ "records": [] }));
		})
		.await;
	let mut handles = Vec::new();

	// Distinct limits keep the requests from coalescing so each one asks for a token.
	for limit in 1..=4 {
		let gateway = Arc::clone(&gateway);

		handles.push(tokio::spawn(async move {
			gateway.cycles(DataQuery::default().limit(limit)).await
		}));
	}
	for handle in handles {
		handle.await.expect("Task should join.").expect("Request should succeed after refresh.");
	}

	refresh.assert_calls_async(1).await;
	data.assert_calls_async(4).await;

	let persisted = store.snapshot().expect("Refreshed record should be persisted.");

	assert_eq!(persisted.access_token.expose(), "access-new");
	assert_eq!(
		persisted.refresh_token.as_ref().map(|secret| secret.expose()),
		Some("refresh-1"),
		"Refresh token is carried over when the proxy does not rotate it."
	);

	let metrics = gateway.tokens().refresh_metrics();

	assert_eq!(metrics.attempts(), 1);
	assert_eq!(metrics.successes(), 1);
}

#[tokio::test]
async fn rejected_refresh_requires_reauthorization() {
	let server = MockServer::start_async().await;
	let (gateway, _) =
		build_test_gateway(&server.base_url(), Some(expired_record("access-old", Some("refresh-dead"))));
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).json_body(json!({ "success": false, "error": "invalid_grant" }));
		})
		.await;
	let data = server
		.mock_async(|when, then| {
			when.method(GET).path("/user/profile/basic");
			then.status(200).json_body(json!({ "user_id": 1 }));
		})
		.await;
	let err = gateway.profile().await.expect_err("Rejected refresh should fail.");

	match &err {
		Error::ReauthorizationRequired { reason } => assert!(reason.contains("invalid_grant")),
		other => panic!("Unexpected error: {other:?}"),
	}

	let err = gateway.profile().await.expect_err("Unauthenticated state should persist.");

	assert_eq!(err.kind(), "reauthorization_required");
	refresh.assert_calls_async(1).await;
	data.assert_calls_async(0).await;

	let status = gateway.auth_status().await.expect("Status should be readable.");

	assert_eq!(status.status, AuthState::NoTokens);
}

#[tokio::test]
async fn proxy_http_rejection_requires_reauthorization() {
	let server = MockServer::start_async().await;
	let (tokens, _) = build_test_tokens(
		&test_config(&server.base_url()),
		Some(expired_record("access-old", Some("refresh-dead"))),
	);

	server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(400).json_body(json!({ "error": "invalid_grant", "error_description": "Refresh token revoked" }));
		})
		.await;

	let err = tokens.get_valid_access_token().await.expect_err("400 should reject the refresh.");

	assert!(matches!(err, Error::ReauthorizationRequired { ref reason } if reason == "Refresh token revoked"));
}

#[tokio::test]
async fn proxy_outage_leaves_token_expired_for_retry() {
	let server = MockServer::start_async().await;
	let (tokens, store) = build_test_tokens(
		&test_config(&server.base_url()),
		Some(expired_record("access-old", Some("refresh-1"))),
	);
	let mut outage = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(503).body("maintenance");
		})
		.await;
	let err = tokens.get_valid_access_token().await.expect_err("503 should fail the refresh.");

	assert!(matches!(err, Error::UpstreamRequestFailed(UpstreamError::Status { status: 503, .. })));
	assert_eq!(tokens.auth_status().await.expect("Status.").status, AuthState::Expired);

	outage.delete_async().await;

	let recovered = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).json_body(json!({
				"success": true,
				"access_token": "access-new",
				"refresh_token": "refresh-2",
				"expires_in": 3600
			}));
		})
		.await;
	let token = tokens.get_valid_access_token().await.expect("Retry should succeed.");

	recovered.assert_calls_async(1).await;

	assert_eq!(token.expose(), "access-new");
	assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn near_expiry_without_refresh_token_keeps_serving() {
	let server = MockServer::start_async().await;
	let record = CredentialRecord::builder()
		.access_token("access-last")
		.issued_now()
		.expires_in(Duration::minutes(2))
		.build()
		.expect("Record fixture should build.");
	let (gateway, _) = build_test_gateway(&server.base_url(), Some(record));
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).json_body(json!({ "success": true, "access_token": "unused" }));
		})
		.await;
	let data = server
		.mock_async(|when, then| {
			when.method(GET).path("/recovery").header("authorization", "Bearer access-last");
			then.status(200).json_body(json!({ "records": [] }));
		})
		.await;

	gateway.recovery(DataQuery::default()).await.expect("Token inside margin should be served.");

	data.assert_calls_async(1).await;
	refresh.assert_calls_async(0).await;
}

#[tokio::test]
async fn missing_credentials_fail_without_network() {
	let server = MockServer::start_async().await;
	let (gateway, _) = build_test_gateway(&server.base_url(), None);
	let any = server
		.mock_async(|_when, then| {
			then.status(200).json_body(json!({}));
		})
		.await;
	let err = gateway.profile().await.expect_err("Missing credentials should fail.");

	assert!(matches!(err, Error::ReauthorizationRequired { .. }));
	any.assert_calls_async(0).await;
}
