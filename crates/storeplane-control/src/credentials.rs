//! Per-store credential generation.

use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{ControlError, ControlResult};

/// Characters generated passwords are drawn from.
pub const PASSWORD_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*";

/// Length of generated database passwords.
pub const PASSWORD_LENGTH: usize = 16;

/// Generate a password of `length` characters from [`PASSWORD_CHARSET`].
///
/// Bytes come from the OS CSPRNG. Bytes at or above the largest multiple of
/// the charset size are rejected so every character is equally likely.
pub fn generate_password(length: usize) -> ControlResult<String> {
    let charset_len = PASSWORD_CHARSET.len();
    let cutoff = 256 - (256 % charset_len);

    let mut password = String::with_capacity(length);
    let mut buf = [0u8; 32];

    while password.len() < length {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| ControlError::Credentials(e.to_string()))?;

        for &byte in &buf {
            let byte = usize::from(byte);
            if byte >= cutoff {
                continue;
            }
            password.push(char::from(PASSWORD_CHARSET[byte % charset_len]));
            if password.len() == length {
                break;
            }
        }
    }

    Ok(password)
}

/// Database credentials generated for one store.
pub struct StoreCredentials {
    /// Database root password.
    pub root_password: String,
    /// Application database user password.
    pub db_password: String,
}

impl StoreCredentials {
    /// Generate fresh credentials.
    pub fn generate() -> ControlResult<Self> {
        Ok(Self {
            root_password: generate_password(PASSWORD_LENGTH)?,
            db_password: generate_password(PASSWORD_LENGTH)?,
        })
    }
}

impl std::fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentials").finish_non_exhaustive()
    }
}
