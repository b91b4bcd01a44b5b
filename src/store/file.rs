//! Encrypted file-backed [`CredentialStore`] for the single local user.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::CredentialRecord,
	store::{
		CredentialStore, StoreError, StoreFuture,
		cipher::{CredentialCipher, SealedBlob},
	},
};

/// Persists the credential record as an AES-256-GCM blob next to a separate key file.
///
/// Both files are restricted to the owner on Unix. Every write goes to a temporary
/// sibling first and is renamed over the target, so external readers never observe a
/// half-written blob.
#[derive(Debug)]
pub struct EncryptedFileStore {
	blob_path: PathBuf,
	key_path: PathBuf,
	write_lock: Mutex<()>,
}
impl EncryptedFileStore {
	/// Blob file name inside the storage directory.
	pub const BLOB_FILE: &'static str = "tokens.enc";
	/// Key file name inside the storage directory.
	pub const KEY_FILE: &'static str = ".encryption_key";

	/// Opens the store rooted at `dir`, creating the directory and, on first run, the key.
	pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
		let dir = dir.as_ref();

		Self::open_with_paths(dir.join(Self::BLOB_FILE), dir.join(Self::KEY_FILE))
	}

	/// Opens the store using explicit blob and key locations.
	pub fn open_with_paths(
		blob_path: impl Into<PathBuf>,
		key_path: impl Into<PathBuf>,
	) -> Result<Self, StoreError> {
		let store =
			Self { blob_path: blob_path.into(), key_path: key_path.into(), write_lock: Mutex::new(()) };

		ensure_parent_exists(&store.blob_path)?;
		ensure_parent_exists(&store.key_path)?;

		// A blob without its key stays unreadable; generating a key here would hide that.
		if !store.blob_path.exists() && !store.key_path.exists() {
			let _guard = store.write_lock.lock();

			store.create_key()?;
		}

		Ok(store)
	}

	/// Location of the encrypted blob.
	pub fn blob_path(&self) -> &Path {
		&self.blob_path
	}

	/// Location of the key file.
	pub fn key_path(&self) -> &Path {
		&self.key_path
	}

	fn read_key(&self) -> Result<Option<CredentialCipher>, StoreError> {
		match fs::read_to_string(&self.key_path) {
			Ok(encoded) => CredentialCipher::from_encoded(&encoded).map(Some),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
			Err(e) => Err(StoreError::decryption(format!(
				"Failed to read encryption key {}: {e}",
				self.key_path.display()
			))),
		}
	}

	fn create_key(&self) -> Result<CredentialCipher, StoreError> {
		let cipher = CredentialCipher::generate();

		write_atomic(&self.key_path, cipher.encoded_key().as_bytes())?;
		tracing::info!(path = %self.key_path.display(), "Generated new credential encryption key.");

		Ok(cipher)
	}

	fn load_now(&self) -> Result<Option<CredentialRecord>, StoreError> {
		let bytes = match fs::read(&self.blob_path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
			Err(e) =>
				return Err(StoreError::backend(format!(
					"Failed to read {}: {e}",
					self.blob_path.display()
				))),
		};

		if bytes.is_empty() {
			return Ok(None);
		}

		let cipher = self.read_key()?.ok_or_else(|| {
			StoreError::decryption(format!(
				"Encryption key {} is missing; re-run authorization",
				self.key_path.display()
			))
		})?;
		let blob: SealedBlob = serde_json::from_slice(&bytes).map_err(|e| {
			StoreError::decryption(format!("Credential blob {} is corrupt: {e}", self.blob_path.display()))
		})?;
		let plaintext = cipher.open(&blob)?;
		let record = serde_json::from_slice(&plaintext).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse decrypted credential record: {e}"),
		})?;

		Ok(Some(record))
	}

	fn save_now(&self, record: &CredentialRecord) -> Result<(), StoreError> {
		let _guard = self.write_lock.lock();
		let cipher = match self.read_key()? {
			Some(cipher) => cipher,
			None => self.create_key()?,
		};
		let plaintext = serde_json::to_vec(record).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize credential record: {e}"),
		})?;
		let blob = cipher.seal(&plaintext)?;
		let serialized = serde_json::to_vec_pretty(&blob).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize credential blob: {e}"),
		})?;

		write_atomic(&self.blob_path, &serialized)
	}

	fn clear_now(&self) -> Result<bool, StoreError> {
		let _guard = self.write_lock.lock();

		match fs::remove_file(&self.blob_path) {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
			Err(e) => Err(StoreError::backend(format!(
				"Failed to remove {}: {e}",
				self.blob_path.display()
			))),
		}
	}
}
impl CredentialStore for EncryptedFileStore {
	fn load(&self) -> StoreFuture<'_, Option<CredentialRecord>> {
		Box::pin(async move { self.load_now() })
	}

	fn save(&self, record: CredentialRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.save_now(&record) })
	}

	fn clear(&self) -> StoreFuture<'_, bool> {
		Box::pin(async move { self.clear_now() })
	}
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| {
			StoreError::backend(format!("Failed to create store directory {}: {e}", parent.display()))
		})?;
	}

	Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
	let mut tmp_path = path.as_os_str().to_owned();

	tmp_path.push(".tmp");

	let tmp_path = PathBuf::from(tmp_path);

	{
		let mut file = owner_only_file(&tmp_path).map_err(|e| {
			StoreError::backend(format!("Failed to create {}: {e}", tmp_path.display()))
		})?;

		file.write_all(contents).map_err(|e| {
			StoreError::backend(format!("Failed to write {}: {e}", tmp_path.display()))
		})?;
		file.sync_all().map_err(|e| {
			StoreError::backend(format!("Failed to sync {}: {e}", tmp_path.display()))
		})?;
	}

	restrict_permissions(&tmp_path)?;
	fs::rename(&tmp_path, path)
		.map_err(|e| StoreError::backend(format!("Failed to replace {}: {e}", path.display())))
}

#[cfg(unix)]
fn owner_only_file(path: &Path) -> std::io::Result<File> {
	use std::os::unix::fs::OpenOptionsExt;

	OpenOptions::new().write(true).create(true).truncate(true).mode(0o600).open(path)
}

#[cfg(not(unix))]
fn owner_only_file(path: &Path) -> std::io::Result<File> {
	OpenOptions::new().write(true).create(true).truncate(true).open(path)
}

// `mode` only applies on creation, so a stale temp file keeps its old bits without this.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), StoreError> {
	use std::os::unix::fs::PermissionsExt;

	fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
		StoreError::backend(format!("Failed to restrict permissions on {}: {e}", path.display()))
	})
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), StoreError> {
	Ok(())
}
