//! Secret and password generation.
//!
//! Both generators draw from the thread-local CSPRNG.

use rand::{Rng, RngCore};

/// Characters that survive unescaped inside connection-string URLs.
const URL_SAFE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Hex-encoded secret of exactly `length` characters.
pub fn generate_secret(length: usize) -> String {
    let mut bytes = vec![0u8; length.div_ceil(2)];
    rand::rng().fill_bytes(&mut bytes);
    let mut secret = hex::encode(bytes);
    secret.truncate(length);
    secret
}

/// Password of `length` characters from a URL-safe alphabet (no `:`, `/`,
/// `@`, `%`).
pub fn generate_password(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..URL_SAFE_ALPHABET.len());
            URL_SAFE_ALPHABET[idx] as char
        })
        .collect()
}
