//! Fernet encryption for OAuth tokens stored at rest.
//!
//! Tokens are written by the onboarding app with the same `ENCRYPTION_KEY`,
//! so the format must stay standard Fernet (URL-safe base64, 32-byte key).

use fernet::Fernet;
use secrecy::{ExposeSecret, SecretString};

use crate::error::CryptoError;
use crate::store::models::OAuthToken;

/// Symmetric cipher for OAuth token fields.
pub struct TokenCipher {
    fernet: Fernet,
}

impl TokenCipher {
    /// Build a cipher from a URL-safe base64 Fernet key.
    pub fn new(key: &SecretString) -> Result<Self, CryptoError> {
        let fernet = Fernet::new(key.expose_secret().trim()).ok_or_else(|| {
            CryptoError::InvalidKey(
                "expected 32 url-safe base64-encoded bytes; generate one with \
                 `kerjasama-agent generate-key`"
                    .to_string(),
            )
        })?;
        Ok(Self { fernet })
    }

    /// Generate a fresh random key.
    pub fn generate_key() -> String {
        Fernet::generate_key()
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        self.fernet.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let bytes = self
            .fernet
            .decrypt(ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::InvalidUtf8)
    }

    /// Return a copy of `token` with its access and refresh tokens decrypted.
    ///
    /// Logs and returns `None` if either field fails to decrypt. Empty fields
    /// pass through unchanged.
    pub fn reveal(&self, mut token: OAuthToken) -> Option<OAuthToken> {
        token.access_token = self.decrypt_field(&token.access_token)?;
        if let Some(refresh) = token.refresh_token.take() {
            token.refresh_token = Some(self.decrypt_field(&refresh)?);
        }
        Some(token)
    }

    fn decrypt_field(&self, value: &str) -> Option<String> {
        if value.is_empty() {
            return Some(String::new());
        }
        match self.decrypt(value) {
            Ok(plain) => Some(plain),
            Err(e) => {
                tracing::error!("Failed to decrypt token: {}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher([REDACTED])")
    }
}
