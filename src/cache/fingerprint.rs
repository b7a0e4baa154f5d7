//! Deterministic cache fingerprints.
//!
//! A fingerprint names one cache entry. The digest input is a joined string
//! of the request-defining inputs, with absent optional parts replaced by the
//! literal `all` and selected keys sorted so that key order never changes the
//! digest.

use crate::models::identity::{sha256_hex, Identity};

/// Identifies a cache entry of a given kind for a given set of inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    kind: &'static str,
    digest: String,
}

impl Fingerprint {
    /// Fingerprint for an identity's corpus snapshot.
    pub fn corpus(identity: &Identity) -> Self {
        let digest = sha256_hex(&format!(
            "{}_{}",
            identity.user_id(),
            identity.library_id()
        ));
        Self {
            kind: "corpus",
            digest,
        }
    }

    /// Fingerprint for a recommendation run.
    ///
    /// `selected_keys` of `None` and `Some(&[])` both mean "the whole
    /// library" and produce the same digest.
    pub fn recommendations(
        identity: &Identity,
        query: &str,
        date_range: Option<&str>,
        selected_keys: Option<&[String]>,
    ) -> Self {
        let keys = match selected_keys {
            Some(keys) if !keys.is_empty() => {
                let mut sorted: Vec<&str> = keys.iter().map(String::as_str).collect();
                sorted.sort_unstable();
                sorted.join(",")
            }
            _ => "all".to_string(),
        };
        let digest = sha256_hex(&format!(
            "{}_{}_{}_{}_{}",
            identity.user_id(),
            identity.library_id(),
            query,
            date_range.unwrap_or("all"),
            keys
        ));
        Self {
            kind: "recommendations",
            digest,
        }
    }

    /// File name for this entry inside an identity's cache directory.
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.kind, self.digest)
    }
}
