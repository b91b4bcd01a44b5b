//! Thread-safe in-memory [`CredentialStore`] for tests and embedding hosts.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::CredentialRecord,
	store::{CredentialStore, StoreError, StoreFuture},
};

/// Keeps the record in-process and counts writes so tests can assert persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
	record: RwLock<Option<CredentialRecord>>,
	saves: AtomicU64,
}
impl MemoryStore {
	/// Creates a store pre-seeded with `record`.
	pub fn with_record(record: Option<CredentialRecord>) -> Self {
		Self { record: RwLock::new(record), saves: AtomicU64::new(0) }
	}

	/// Returns a copy of the stored record without going through the async contract.
	pub fn snapshot(&self) -> Option<CredentialRecord> {
		self.record.read().clone()
	}

	/// Number of successful [`CredentialStore::save`] calls.
	pub fn save_count(&self) -> u64 {
		self.saves.load(Ordering::Relaxed)
	}

	fn save_now(&self, record: CredentialRecord) -> Result<(), StoreError> {
		*self.record.write() = Some(record);
		self.saves.fetch_add(1, Ordering::Relaxed);

		Ok(())
	}
}
impl CredentialStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<CredentialRecord>> {
		let record = self.snapshot();

		Box::pin(async move { Ok(record) })
	}

	fn save(&self, record: CredentialRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.save_now(record) })
	}

	fn clear(&self) -> StoreFuture<'_, bool> {
		let existed = self.record.write().take().is_some();

		Box::pin(async move { Ok(existed) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn save_load_clear_cycle() {
		let store = MemoryStore::default();
		let record = CredentialRecord::builder()
			.access_token("access-1")
			.build()
			.expect("Record fixture should build.");

		assert!(store.load().await.expect("Load should succeed.").is_none());

		store.save(record).await.expect("Save should succeed.");

		let loaded = store.load().await.expect("Load should succeed.").expect("Record should exist.");

		assert_eq!(loaded.access_token.expose(), "access-1");
		assert_eq!(store.save_count(), 1);
		assert!(store.clear().await.expect("Clear should succeed."));
		assert!(store.snapshot().is_none());
	}
}
