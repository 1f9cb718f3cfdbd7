use std::time::Duration;

/// Errors from the external model layer.
///
/// Every variant is fatal to the batch job that issued the call.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The model API returned a non-2xx status code.
    #[error("Model API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response carried no candidate text.
    #[error("Model returned an empty response")]
    EmptyResponse,

    /// The call did not finish within the configured timeout.
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    /// No usable API key was supplied.
    #[error("Model API key is missing or blank")]
    MissingCredential,
}
