//! Normalized request identity used as the cache and coalescing key.

// std
use std::{cmp::Ordering, sync::OnceLock};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, endpoint::Endpoint};

/// Endpoint plus sorted parameters with a stable fingerprint cache.
///
/// Parameters live in a [`BTreeMap`] so call-site ordering never changes equality, and
/// empty values are dropped so `limit=""` and an absent `limit` identify the same request.
/// The [`fingerprint`](Self::fingerprint) is a base64 (no padding) SHA-256 digest of the
/// canonical form and backs the [`Hash`] implementation.
pub struct RequestIdentity {
	endpoint: Endpoint,
	params: BTreeMap<String, String>,
	fingerprint_cache: OnceLock<String>,
}
impl RequestIdentity {
	/// Builds an identity, dropping parameters whose value is empty.
	pub fn new<I, K, V>(endpoint: Endpoint, params: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let params = params
			.into_iter()
			.map(|(key, value)| (key.into(), value.into()))
			.filter(|(key, value)| !key.is_empty() && !value.is_empty())
			.collect();

		Self { endpoint, params, fingerprint_cache: OnceLock::new() }
	}

	/// Target endpoint.
	pub fn endpoint(&self) -> Endpoint {
		self.endpoint
	}

	/// Normalized query parameters.
	pub fn params(&self) -> &BTreeMap<String, String> {
		&self.params
	}

	/// Canonical `endpoint?k=v&k=v` rendering (not URL-encoded).
	pub fn canonical(&self) -> String {
		let mut rendered = self.endpoint.as_str().to_owned();

		for (i, (key, value)) in self.params.iter().enumerate() {
			rendered.push(if i == 0 { '?' } else { '&' });
			rendered.push_str(key);
			rendered.push('=');
			rendered.push_str(value);
		}

		rendered
	}

	/// Stable fingerprint of the canonical form, cached after first use.
	pub fn fingerprint(&self) -> &str {
		self.fingerprint_cache.get_or_init(|| compute_fingerprint(self.endpoint, &self.params))
	}
}
impl Clone for RequestIdentity {
	fn clone(&self) -> Self {
		Self {
			endpoint: self.endpoint,
			params: self.params.clone(),
			fingerprint_cache: self.fingerprint_cache.clone(),
		}
	}
}
impl PartialEq for RequestIdentity {
	fn eq(&self, other: &Self) -> bool {
		self.endpoint == other.endpoint && self.params == other.params
	}
}
impl Eq for RequestIdentity {}
impl PartialOrd for RequestIdentity {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for RequestIdentity {
	fn cmp(&self, other: &Self) -> Ordering {
		self.endpoint.cmp(&other.endpoint).then_with(|| self.params.cmp(&other.params))
	}
}
impl Hash for RequestIdentity {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.fingerprint().hash(state);
	}
}
impl Debug for RequestIdentity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("RequestIdentity").field(&self.canonical()).finish()
	}
}
impl Display for RequestIdentity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.canonical())
	}
}

fn compute_fingerprint(endpoint: Endpoint, params: &BTreeMap<String, String>) -> String {
	let mut hasher = Sha256::new();

	hasher.update(endpoint.as_str().as_bytes());

	// Length prefixes keep `a=b&c` and `a=b&c=` style collisions apart.
	for (key, value) in params {
		hasher.update((key.len() as u64).to_be_bytes());
		hasher.update(key.as_bytes());
		hasher.update((value.len() as u64).to_be_bytes());
		hasher.update(value.as_bytes());
	}

	STANDARD_NO_PAD.encode(hasher.finalize())
}
