//! Invitation token generation.

use rand::Rng;

/// Generate a single-use invitation token: `byte_len` random bytes,
/// hex-encoded. Tokens are compared in full and never logged.
pub fn generate_invite_token(byte_len: usize) -> String {
    let mut rng = rand::rng();
    let random_bytes: Vec<u8> = (0..byte_len).map(|_| rng.random()).collect();
    hex::encode(random_bytes)
}
