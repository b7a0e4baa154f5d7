//! Request identity derived from library credentials.

use sha2::{Digest, Sha256};

/// Raw credentials presented with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryCredentials {
    pub library_id: String,
    pub api_key: String,
}

impl LibraryCredentials {
    pub fn new(library_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            library_id: library_id.into(),
            api_key: api_key.into(),
        }
    }
}

/// Stable identity for cache scoping.
///
/// The user id is a digest of the library id and a key prefix, so the full
/// API key never lands on disk. The same credentials always map to the same
/// identity; different credentials get disjoint cache namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    user_id: String,
    library_id: String,
}

impl Identity {
    pub fn from_credentials(credentials: &LibraryCredentials) -> Self {
        let key_prefix: String = credentials.api_key.chars().take(10).collect();
        let user_id = sha256_hex(&format!("{}_{}", credentials.library_id, key_prefix));
        Self {
            user_id,
            library_id: credentials.library_id.clone(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn library_id(&self) -> &str {
        &self.library_id
    }
}

/// Lowercase hex SHA-256 of the input.
pub(crate) fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}
