//! Deterministic fallback avatars
//!
//! When the member directory has no avatar for a name (or is unreachable),
//! clients render a generated identicon keyed by the name. The reference must
//! be stable across sessions so every client derives the same image.

use sha2::{Digest, Sha256};

/// Generated avatar reference for a participant name
///
/// Same name, same reference; the digest keys the identicon.
pub fn fallback_avatar(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    format!("avatar://identicon/{}", hex::encode(&digest[..8]))
}
