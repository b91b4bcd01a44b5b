//! Storage contract and built-in credential stores.

pub mod cipher;
pub mod file;
pub mod memory;

pub use cipher::CredentialCipher;
pub use file::EncryptedFileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::CredentialRecord};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for the single user's credential record.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the stored record, or `None` on first run.
	///
	/// A blob that fails authentication is [`StoreError::Decryption`]; one that decrypts but
	/// does not parse as a record is [`StoreError::Serialization`].
	fn load(&self) -> StoreFuture<'_, Option<CredentialRecord>>;

	/// Atomically replaces the stored record.
	fn save(&self, record: CredentialRecord) -> StoreFuture<'_, ()>;

	/// Removes the stored record; returns `true` if one existed.
	fn clear(&self) -> StoreFuture<'_, bool>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// The key is missing or invalid, or the blob is corrupt.
	#[error("Decryption failed: {message}.")]
	Decryption {
		/// Human-readable error payload.
		message: String,
	},
}
impl StoreError {
	pub(crate) fn backend(message: impl Into<String>) -> Self {
		Self::Backend { message: message.into() }
	}

	pub(crate) fn decryption(message: impl Into<String>) -> Self {
		Self::Decryption { message: message.into() }
	}
}
