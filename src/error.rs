use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// One or more credentials are absent from both the environment and `.env`
    #[error("Missing {0}. Ensure you copied the .env file that you created earlier into the same directory as this program")]
    MissingSettings(String),

    #[error("The file {0} does not exist.")]
    SystemsFileMissing(PathBuf),

    #[error("The systems table has no '{0}' column")]
    MissingColumn(&'static str),

    #[error("Failed to read systems table: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream answered, but not with a success status
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("{service} response is missing '{field}'")]
    MalformedResponse {
        service: &'static str,
        field: &'static str,
    },

    #[error("Make sure none of the prompts in the input prompts are empty")]
    EmptyPrompt,

    #[error("Job {job_id} did not finish within {waited:?}")]
    PollTimeout { job_id: u64, waited: Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;

/// Turns a non-success response into `ChatError::Status`, keeping the body for the message.
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Status {
        service,
        status,
        body,
    })
}
