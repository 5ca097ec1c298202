use std::fmt;

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};
use crate::util::{hex_decode, hex_encode, random_bytes};

const OUTPUT_LEN: usize = 32;
const SALT_LEN: usize = 16;
const SCHEME: &str = "pbkdf2-sha256";

/// One-way password hash with verification.
///
/// The credential store only ever sees the encoded string returned by
/// [`PasswordHasher::hash`]; swapping the primitive does not touch the schema.
pub trait PasswordHasher: Send + Sync + fmt::Debug {
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// `false` for a mismatch and for anything it cannot parse.
    fn verify(&self, plaintext: &str, encoded: &str) -> bool;
}

/// PBKDF2-HMAC-SHA256 with a random per-password salt.
///
/// Encoded as `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>` so the
/// iteration count can be raised without invalidating stored hashes.
#[derive(Debug, Clone)]
pub struct Pbkdf2Hasher {
    iterations: u32,
}

impl Pbkdf2Hasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }
}

impl PasswordHasher for Pbkdf2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = random_bytes(SALT_LEN)?;
        let out = derive(plaintext.as_bytes(), &salt, self.iterations);
        Ok(format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            hex_encode(&salt),
            hex_encode(&out)
        ))
    }

    fn verify(&self, plaintext: &str, encoded: &str) -> bool {
        let mut parts = encoded.split('$');
        let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return false;
        };
        if scheme != SCHEME {
            return false;
        }
        let Ok(iterations) = iterations.parse::<u32>() else {
            return false;
        };
        let (Some(salt), Some(expected)) = (hex_decode(salt), hex_decode(expected)) else {
            return false;
        };
        if iterations == 0 || expected.len() != OUTPUT_LEN {
            return false;
        }

        // Derive and constant-time compare.
        let out = derive(plaintext.as_bytes(), &salt, iterations);
        out.as_slice().ct_eq(expected.as_slice()).into()
    }
}

fn derive(secret: &[u8], salt: &[u8], iterations: u32) -> [u8; OUTPUT_LEN] {
    let mut out = [0u8; OUTPUT_LEN];
    pbkdf2_hmac::<Sha256>(secret, salt, iterations, &mut out);
    out
}

/// Hex SHA-256 of a bearer secret (session token or API key).
pub fn hash_secret(secret: &str) -> String {
    hex_encode(&Sha256::digest(secret.as_bytes()))
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// A well-formed hash no password matches. Verified against when the email is
/// unknown so that path costs the same as a wrong password.
pub(crate) fn decoy_hash(hasher: &dyn PasswordHasher) -> Result<String> {
    hasher.hash("decoy-password-never-matches")
}

pub(crate) fn ensure_password_policy(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

pub const MIN_PASSWORD_LENGTH: usize = 8;
