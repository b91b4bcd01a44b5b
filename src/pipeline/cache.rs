//! Time-boxed response memo keyed by [`RequestIdentity`].

// self
use crate::{_prelude::*, endpoint::Payload, pipeline::identity::RequestIdentity};

#[derive(Clone, Debug)]
struct CacheEntry {
	payload: Payload,
	// `None` when the TTL reaches past the representable range.
	expires_at: Option<OffsetDateTime>,
}

/// In-memory response cache with lazy expiry.
///
/// Entries observed at or past their expiry are evicted by the lookup that sees them;
/// there is no background sweeper.
#[derive(Debug)]
pub struct ResponseCache {
	ttl: Duration,
	entries: Mutex<HashMap<RequestIdentity, CacheEntry>>,
}
impl ResponseCache {
	/// Creates an empty cache whose entries live for `ttl`.
	pub fn new(ttl: Duration) -> Self {
		Self { ttl, entries: Mutex::new(HashMap::new()) }
	}

	/// Entry lifetime.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Returns the live payload for `identity`.
	pub fn get(&self, identity: &RequestIdentity) -> Option<Payload> {
		self.get_at(identity, OffsetDateTime::now_utc())
	}

	/// Returns the payload for `identity` if it is still live at `instant`.
	pub fn get_at(&self, identity: &RequestIdentity, instant: OffsetDateTime) -> Option<Payload> {
		let mut entries = self.entries.lock();

		match entries.get(identity) {
			Some(entry) if entry.expires_at.is_none_or(|expires_at| instant < expires_at) =>
				Some(entry.payload.clone()),
			Some(_) => {
				entries.remove(identity);

				None
			},
			None => None,
		}
	}

	/// Stores `payload`, replacing any previous entry.
	pub fn put(&self, identity: RequestIdentity, payload: Payload) {
		self.put_at(identity, payload, OffsetDateTime::now_utc());
	}

	/// Stores `payload` as if written at `instant`.
	pub fn put_at(&self, identity: RequestIdentity, payload: Payload, instant: OffsetDateTime) {
		let entry = CacheEntry { payload, expires_at: instant.checked_add(self.ttl) };

		self.entries.lock().insert(identity, entry);
	}

	/// Drops every entry and returns the identities that were held.
	pub fn clear(&self) -> Vec<RequestIdentity> {
		let mut cleared: Vec<_> = self.entries.lock().drain().map(|(identity, _)| identity).collect();

		cleared.sort();

		cleared
	}

	/// Number of entries not yet evicted, including expired ones no lookup has seen.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Returns `true` when no entries are held.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}
