use thiserror::Error;

/// Failures talking to a remote backend.
///
/// Missing resources are expressed as `Ok(None)` by the client methods, not
/// as an error variant: the sweep treats "not found" and "unreachable" very
/// differently, so the distinction has to survive the client boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    UnexpectedStatus {
        service: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("unexpected response from {service}: {detail}")]
    UnexpectedResponse { service: String, detail: String },
}

impl BackendError {
    /// Helper for client code: turn a non-success response into an error,
    /// capturing the body for the log line.
    pub async fn from_response(service: &str, response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        BackendError::UnexpectedStatus {
            service: service.to_string(),
            status,
            body,
        }
    }
}
