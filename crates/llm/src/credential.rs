//! API credentials, passed explicitly to the client that uses them.

use crate::error::ModelError;

/// An API key. The value never appears in `Debug` output or logs.
#[derive(Clone)]
pub struct ApiCredential(String);

impl ApiCredential {
    pub fn new(key: impl Into<String>) -> Result<Self, ModelError> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(ModelError::MissingCredential);
        }
        Ok(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiCredential(***)")
    }
}
