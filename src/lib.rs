//! Single-user WHOOP data gateway: encrypted token lifecycle, fixed-window admission, and
//! short-lived response caching behind one request pipeline.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod exchange;
pub mod http;
pub mod obs;
pub mod pipeline;
pub mod store;
pub mod tools;

#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{CredentialRecord, TokenManager},
		config::GatewayConfig,
		exchange::{ProxyExchange, RefreshExchange},
		pipeline::Gateway,
		store::{CredentialStore, MemoryStore},
	};

	/// Builds a config pointing both the data API and the refresh proxy at `base_url`.
	///
	/// The refresh proxy lives under `/auth/refresh` so mocks can tell the two apart.
	pub fn test_config(base_url: &str) -> GatewayConfig {
		let base = Url::parse(base_url).expect("Failed to parse mock server URL.");
		let refresh = base.join("/auth/refresh").expect("Failed to build mock refresh URL.");

		GatewayConfig::default().with_api_base(base).with_proxy_refresh(refresh)
	}

	/// Builds a record valid for one hour with both secrets present.
	pub fn valid_record(access: &str, refresh: &str) -> CredentialRecord {
		CredentialRecord::builder()
			.access_token(access)
			.refresh_token(refresh)
			.issued_now()
			.expires_in(Duration::hours(1))
			.build()
			.expect("Failed to build valid credential fixture.")
	}

	/// Builds a record that expired one minute ago.
	pub fn expired_record(access: &str, refresh: Option<&str>) -> CredentialRecord {
		let issued = OffsetDateTime::now_utc() - Duration::hours(1);
		let mut builder = CredentialRecord::builder()
			.access_token(access)
			.issued_at(issued)
			.expires_at(OffsetDateTime::now_utc() - Duration::minutes(1));

		if let Some(refresh) = refresh {
			builder = builder.refresh_token(refresh);
		}

		builder.build().expect("Failed to build expired credential fixture.")
	}

	/// Constructs a token manager over an in-memory store seeded with `record`.
	pub fn build_test_tokens(
		config: &GatewayConfig,
		record: Option<CredentialRecord>,
	) -> (Arc<TokenManager>, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::with_record(record));
		let store: Arc<dyn CredentialStore> = store_backend.clone();
		let refresh_url =
			config.refresh.proxy_url().cloned().expect("Test config should use the refresh proxy.");
		let exchange: Arc<dyn RefreshExchange> = Arc::new(
			ProxyExchange::new(refresh_url, config.request_timeout())
				.expect("Failed to build proxy exchange for tests."),
		);
		let tokens = TokenManager::new(store, exchange, config.token_safety_margin());

		(Arc::new(tokens), store_backend)
	}

	/// Constructs a [`Gateway`] backed by an in-memory store and the mock server at `base_url`.
	pub fn build_test_gateway(
		base_url: &str,
		record: Option<CredentialRecord>,
	) -> (Gateway, Arc<MemoryStore>) {
		build_test_gateway_with(test_config(base_url), record)
	}

	/// Same as [`build_test_gateway`] but with a caller-tuned config.
	pub fn build_test_gateway_with(
		config: GatewayConfig,
		record: Option<CredentialRecord>,
	) -> (Gateway, Arc<MemoryStore>) {
		let (tokens, store) = build_test_tokens(&config, record);
		let gateway = Gateway::new(config, tokens).expect("Failed to build test gateway.");

		(gateway, store)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
