use thiserror::Error;

use ackbucket_core::config::ConfigError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {address}: {message}")]
    Connect { address: String, message: String },
    #[error("session handshake failed: {0}")]
    Initialize(String),
    #[error("capability discovery failed: {0}")]
    Discovery(String),
    #[error("invocation of `{capability}` failed: {message}")]
    Invoke { capability: String, message: String },
    #[error("session close failed: {0}")]
    Close(String),
    #[error("session is already closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("inference transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("inference API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("inference API error: {0}")]
    Api(String),
    #[error("failed to decode inference response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("inference failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Errors that end the processing of one query.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::{AgentError, InferenceError, SessionError};

    #[test]
    fn agent_error_is_transparent_over_sources() {
        let error = AgentError::from(SessionError::Invoke {
            capability: "create-storage-bucket".to_string(),
            message: "connection reset".to_string(),
        });
        assert_eq!(
            error.to_string(),
            "invocation of `create-storage-bucket` failed: connection reset"
        );

        let error = AgentError::from(InferenceError::Status { status: 400, body: "bad".into() });
        assert_eq!(error.to_string(), "inference API error (400): bad");
    }
}
