//! Router credential encryption using AES-256-GCM
//!
//! Credentials are encrypted at rest with a key derived from
//! machine-binding material, so a copied registry file is useless on
//! another machine. Stored form is base64(nonce || ciphertext).

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, Context, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

const APP_KDF_CONTEXT: &str = "netguard-2026-router-credentials-aes256-gcm";
const ARGON2_SALT: &[u8] = b"netguard-2026-kdf-salt";
const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 1;
const NONCE_LEN: usize = 12;

/// Derive the 256-bit credential key from machine-specific material
pub fn get_encryption_key() -> Result<[u8; 32]> {
    let machine_material = get_machine_binding_material();
    derive_key_argon2(&format!("{}-{}", machine_material, APP_KDF_CONTEXT))
}

fn get_machine_binding_material() -> String {
    match machine_uid::get() {
        Ok(machine_id) => machine_id,
        Err(e) => {
            tracing::warn!("Could not get machine ID: {}, using fallback", e);
            format!(
                "{}-{}",
                whoami::username(),
                whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string())
            )
        }
    }
}

fn derive_key_argon2(input: &str) -> Result<[u8; 32]> {
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(32),
    )
    .map_err(|e| anyhow!("Argon2 parameter error: {}", e))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; 32];
    argon2
        .hash_password_into(input.as_bytes(), ARGON2_SALT, &mut key)
        .map_err(|e| anyhow!("Argon2 key derivation failed: {}", e))?;
    Ok(key)
}

/// Encrypt a credential for storage
pub fn encrypt_secret(plaintext: &str) -> Result<String> {
    let key_bytes = get_encryption_key()?;
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("Credential encryption failed: {}", e))?;

    let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(output))
}

/// Decrypt a stored credential
pub fn decrypt_secret(encoded: &str) -> Result<String> {
    let data = BASE64
        .decode(encoded)
        .context("Stored credential is not valid base64")?;
    if data.len() < NONCE_LEN {
        return Err(anyhow!("Stored credential is too short"));
    }

    let nonce = Nonce::from_slice(&data[..NONCE_LEN]);
    let ciphertext = &data[NONCE_LEN..];

    let key_bytes = get_encryption_key()?;
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("Credential decryption failed: {}", e))?;
    String::from_utf8(plaintext).context("Decrypted credential is not UTF-8")
}
