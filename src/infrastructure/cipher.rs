use crate::domain::ports::SecretCipher;
use crate::error::{PaymentError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::SecretString;

/// Secrets are stored as-is.
#[derive(Debug, Default, Clone)]
pub struct PlainSecretCipher;

impl SecretCipher for PlainSecretCipher {
    fn decrypt(&self, ciphertext: &str) -> Result<SecretString> {
        Ok(SecretString::from(ciphertext.to_string()))
    }
}

/// Secrets are stored base64-encoded. Keeps passwords out of casual view in config files;
/// it is not encryption.
#[derive(Debug, Default, Clone)]
pub struct Base64SecretCipher;

impl Base64SecretCipher {
    pub fn encrypt(&self, plaintext: &str) -> String {
        STANDARD.encode(plaintext.as_bytes())
    }
}

impl SecretCipher for Base64SecretCipher {
    fn decrypt(&self, ciphertext: &str) -> Result<SecretString> {
        let bytes = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| PaymentError::Config(format!("secret is not valid base64: {e}")))?;
        let plain = String::from_utf8(bytes)
            .map_err(|_| PaymentError::Config("secret is not valid UTF-8".into()))?;
        Ok(SecretString::from(plain))
    }
}
