//! At-rest encryption for vendor credentials.
//!
//! Credentials are stored as `(email, password)` pairs per platform, each
//! field encrypted independently with AES-256-GCM under the server's
//! `Config.encryption_key`. The nonce is generated per-encryption and stored
//! alongside the ciphertext; it is not a secret.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, Context, Result};
use rand::RngCore;
use sqlx::PgPool;

const NONCE_LEN: usize = 12;

pub struct SecretStore {
    pool: PgPool,
    cipher: Aes256Gcm,
}

fn parse_key(hex_key: &str) -> Result<[u8; 32]> {
    let key_bytes = hex::decode(hex_key).context("ENCRYPTION_KEY must be valid hex")?;
    key_bytes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow!("ENCRYPTION_KEY must decode to 32 bytes, got {}", v.len()))
}

impl SecretStore {
    /// `hex_key` must decode to exactly 32 bytes (AES-256).
    pub fn new(pool: PgPool, hex_key: &str) -> Result<Self> {
        let key_bytes = parse_key(hex_key)?;
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            pool,
            cipher: Aes256Gcm::new(key),
        })
    }

    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("encryption failed: {e}"))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            combined,
        ))
    }

    fn decrypt(&self, encoded: &str) -> Result<String> {
        let combined = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
            .context("stored secret is not valid base64")?;
        if combined.len() < NONCE_LEN {
            return Err(anyhow!("stored secret is too short to contain a nonce"));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| anyhow!("decryption failed: {e}"))?;
        String::from_utf8(plaintext).context("decrypted secret is not valid UTF-8")
    }

    /// Store (or overwrite) the credential pair for `platform` (e.g. "coros", "garmin").
    pub async fn put(&self, platform: &str, email: &str, password: &str) -> Result<()> {
        let email_enc = self.encrypt(email)?;
        let password_enc = self.encrypt(password)?;

        sqlx::query(
            r#"
            INSERT INTO transfer_accounts (platform, email_encrypted, password_encrypted, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (platform) DO UPDATE
            SET email_encrypted = EXCLUDED.email_encrypted,
                password_encrypted = EXCLUDED.password_encrypted,
                updated_at = now()
            "#,
        )
        .bind(platform)
        .bind(&email_enc)
        .bind(&password_enc)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch and decrypt the credential pair for `platform`.
    pub async fn get(&self, platform: &str) -> Result<Option<(String, String)>> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT email_encrypted, password_encrypted FROM transfer_accounts WHERE platform = $1",
        )
        .bind(platform)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((email_enc, password_enc)) => {
                let email = self.decrypt(&email_enc)?;
                let password = self.decrypt(&password_enc)?;
                Ok(Some((email, password)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> String {
        "00".repeat(32)
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        // SecretStore::new only needs the pool for get/put, not for encrypt/decrypt,
        // but PgPool has no synchronous constructor, so roundtrip the cipher directly.
        let key_bytes = hex::decode(test_key()).unwrap();
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        let cipher = Aes256Gcm::new(key);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, b"hunter2".as_slice()).unwrap();
        let decrypted = cipher.decrypt(nonce, ciphertext.as_slice()).unwrap();
        assert_eq!(decrypted, b"hunter2");
    }

    #[test]
    fn rejects_short_key() {
        assert!(parse_key("00ff").is_err());
    }

    #[test]
    fn accepts_32_byte_key() {
        assert!(parse_key(&test_key()).is_ok());
    }
}
