//! AES-256-GCM sealing of serialized credential records.
//!
//! Each blob is sealed with a fresh random 96-bit nonce that travels next to the
//! ciphertext. The 256-bit key lives in its own file, base64 encoded.

// crates.io
use aes_gcm::{
	Aes256Gcm, Key, Nonce,
	aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{_prelude::*, store::StoreError};

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// On-disk envelope of a sealed record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlob {
	/// Envelope format version.
	pub version: u8,
	/// Base64 nonce used for this blob.
	pub nonce: String,
	/// Base64 ciphertext including the GCM tag.
	pub ciphertext: String,
}
impl SealedBlob {
	/// Current envelope version.
	pub const VERSION: u8 = 1;
}

/// Symmetric cipher bound to a single 256-bit key.
#[derive(Clone)]
pub struct CredentialCipher {
	key: [u8; KEY_SIZE],
}
impl CredentialCipher {
	/// Generates a cipher with a fresh random key.
	pub fn generate() -> Self {
		Self { key: rand::random() }
	}

	/// Rebuilds a cipher from the base64 key-file contents.
	pub fn from_encoded(encoded: &str) -> Result<Self, StoreError> {
		let bytes = STANDARD
			.decode(encoded.trim())
			.map_err(|e| StoreError::decryption(format!("Encryption key is not valid base64: {e}")))?;
		let key = <[u8; KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
			StoreError::decryption(format!(
				"Encryption key must be {KEY_SIZE} bytes, got {} bytes",
				bytes.len()
			))
		})?;

		Ok(Self { key })
	}

	/// Returns the base64 form written to the key file.
	pub fn encoded_key(&self) -> String {
		STANDARD.encode(self.key)
	}

	/// Encrypts `plaintext` under a new random nonce.
	pub fn seal(&self, plaintext: &[u8]) -> Result<SealedBlob, StoreError> {
		let nonce_bytes: [u8; NONCE_SIZE] = rand::random();
		let ciphertext = self
			.aead()
			.encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
			.map_err(|e| StoreError::backend(format!("Encryption failed: {e}")))?;

		Ok(SealedBlob {
			version: SealedBlob::VERSION,
			nonce: STANDARD.encode(nonce_bytes),
			ciphertext: STANDARD.encode(ciphertext),
		})
	}

	/// Decrypts a sealed blob; any tampering or key mismatch fails.
	pub fn open(&self, blob: &SealedBlob) -> Result<Vec<u8>, StoreError> {
		if blob.version != SealedBlob::VERSION {
			return Err(StoreError::decryption(format!(
				"Unsupported credential blob version {}",
				blob.version
			)));
		}

		let nonce = STANDARD
			.decode(&blob.nonce)
			.map_err(|e| StoreError::decryption(format!("Nonce is not valid base64: {e}")))?;

		if nonce.len() != NONCE_SIZE {
			return Err(StoreError::decryption(format!(
				"Invalid nonce size: expected {NONCE_SIZE}, got {}",
				nonce.len()
			)));
		}

		let ciphertext = STANDARD
			.decode(&blob.ciphertext)
			.map_err(|e| StoreError::decryption(format!("Ciphertext is not valid base64: {e}")))?;

		self.aead().decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref()).map_err(|_| {
			StoreError::decryption("Wrong key or corrupted credential blob")
		})
	}

	fn aead(&self) -> Aes256Gcm {
		Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
	}
}
impl Debug for CredentialCipher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("CredentialCipher(<redacted>)")
	}
}
