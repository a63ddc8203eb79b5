// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM sealing for encrypted key/value entries, plus the local
//! key file the store unlocks with.
//!
//! Each [`seal`] draws a fresh 96-bit nonce from the system CSPRNG.

use std::path::Path;

use aishell_core::AiShellError;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::info;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

fn crypto_err(message: &str) -> AiShellError {
    AiShellError::Storage {
        source: message.to_string().into(),
    }
}

fn key_for(key: &[u8; KEY_LEN]) -> Result<LessSafeKey, AiShellError> {
    let unbound =
        UnboundKey::new(&AES_256_GCM, key).map_err(|_| crypto_err("invalid AES-256-GCM key"))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypts `plaintext`, returning `(ciphertext || tag, nonce)`.
pub fn seal(
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; NONCE_LEN]), AiShellError> {
    let sealing = key_for(key)?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| crypto_err("nonce generation failed"))?;

    let mut buf = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut buf,
        )
        .map_err(|_| crypto_err("encryption failed"))?;
    Ok((buf, nonce_bytes))
}

/// Decrypts a value produced by [`seal`]. Fails on a wrong key or tampering.
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, AiShellError> {
    let opening = key_for(key)?;
    let mut buf = ciphertext.to_vec();
    let plain = opening
        .open_in_place(Nonce::assume_unique_for_key(*nonce), Aad::empty(), &mut buf)
        .map_err(|_| crypto_err("decryption failed: wrong key or corrupted value"))?;
    Ok(plain.to_vec())
}

pub fn generate_key() -> Result<[u8; KEY_LEN], AiShellError> {
    let mut key = [0u8; KEY_LEN];
    SystemRandom::new()
        .fill(&mut key)
        .map_err(|_| crypto_err("key generation failed"))?;
    Ok(key)
}

/// Reads the hex key file at `path`, creating it with a random key if absent.
pub fn load_or_create_key(path: &Path) -> Result<[u8; KEY_LEN], AiShellError> {
    let io_err = |e: std::io::Error| AiShellError::Storage {
        source: Box::new(e),
    };

    if path.exists() {
        let text = std::fs::read_to_string(path).map_err(io_err)?;
        let bytes = hex::decode(text.trim()).map_err(|e| AiShellError::Storage {
            source: Box::new(e),
        })?;
        return bytes
            .try_into()
            .map_err(|_| crypto_err("storage key file must hold 32 bytes"));
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let key = generate_key()?;
    std::fs::write(path, hex::encode(key)).map_err(io_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }
    info!(path = %path.display(), "created storage encryption key");
    Ok(key)
}
