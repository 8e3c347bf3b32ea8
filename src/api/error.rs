//! Error handling for the stitch service client and flow.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StitchError {
    /// The server rejected the submission; no job was created.
    #[error("submission rejected with status {status}: {message}")]
    Submission { status: u16, message: String },

    /// The server answered with something other than the documented shape.
    #[error("malformed server response: {0}")]
    Protocol(String),

    /// The server reports the job itself failed.
    #[error("stitching failed: {0}")]
    TaskFailed(String),

    /// The polling budget ran out without a terminal status.
    #[error("no terminal status after {attempts} checks")]
    Timeout { attempts: u32 },

    /// The result download was refused.
    #[error("result download failed with status {status}: {message}")]
    Download { status: u16, message: String },

    /// Reqwest error, typically related to network issues or request failures.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Local file handling failed.
    #[error("resource error: {0}")]
    Io(#[from] std::io::Error),
}

impl StitchError {
    /// Build a Submission error from a non-success response, preserving the
    /// server's status and whatever body text it sent.
    pub async fn submission_from_response(response: reqwest::Response) -> StitchError {
        let (status, message) = status_and_body(response).await;
        StitchError::Submission { status, message }
    }

    /// Build a Download error from a non-success response.
    pub async fn download_from_response(response: reqwest::Response) -> StitchError {
        let (status, message) = status_and_body(response).await;
        StitchError::Download { status, message }
    }
}

async fn status_and_body(response: reqwest::Response) -> (u16, String) {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read response text".to_string());
    (status, message)
}
