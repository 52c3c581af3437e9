use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Prefix carried by every upload id.
pub const ID_PREFIX: &str = "u_";

const RANDOM_SUFFIX_LEN: usize = 8;
const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identifier of one upload session.
///
/// Generated ids have the form `u_<base36-timestamp><8-char-base36-random>`,
/// which sorts roughly by creation time while staying collision-resistant
/// within a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "openapi", schema(value_type = String))]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    /// Generate a fresh upload id from the current time and a random suffix.
    #[must_use]
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut id = String::with_capacity(2 + 9 + RANDOM_SUFFIX_LEN);
        id.push_str(ID_PREFIX);
        id.push_str(&base36(millis));

        let mut rng = rand::thread_rng();
        for _ in 0..RANDOM_SUFFIX_LEN {
            let idx = rng.gen_range(0..BASE36_ALPHABET.len());
            id.push(BASE36_ALPHABET[idx] as char);
        }
        Self(id)
    }

    /// Returns `true` if `value` is shaped like an upload id.
    ///
    /// Accepts any string that carries the `u_` prefix and at least one
    /// character beyond it; ids minted by other stores remain valid.
    #[must_use]
    pub fn is_valid(value: &str) -> bool {
        value.starts_with(ID_PREFIX) && value.len() > ID_PREFIX.len()
    }

    /// Return the inner string as a str slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UploadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UploadId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for UploadId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Encode `value` in lowercase base36.
fn base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_owned();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 alphabet is ASCII")
}
