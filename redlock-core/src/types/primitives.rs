use std::fmt;

use serde::{Deserialize, Serialize};

/// Alphabet for owner tokens: URL-safe, so tokens can travel in keys or logs unescaped.
const TOKEN_ALPHABET: [char; 64] = [
    '_', '-', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g',
    'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S',
    'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

/// 32 symbols of a 64-symbol alphabet: 192 random bits.
const TOKEN_LEN: usize = 32;

/// Proof of ownership bound to one `acquire` call.
///
/// A fresh token is drawn for every acquisition and never reused. Stores
/// compare it on release and extension, so a holder can only ever remove
/// or refresh its own keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerToken(String);

impl OwnerToken {
    /// Draws a new random token.
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(TOKEN_LEN, &TOKEN_ALPHABET))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OwnerToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Normalizes a caller-supplied resource list: drops duplicates while
/// keeping first-seen order, so a store never sees the same key twice in
/// one atomic operation.
pub fn normalize_resources<I, S>(resources: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for resource in resources {
        let resource = resource.into();
        if !out.contains(&resource) {
            out.push(resource);
        }
    }
    out
}
