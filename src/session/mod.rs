mod blob;
mod store;

use thiserror::Error;

pub use blob::{SessionBlob, SessionSummary};
pub use store::SessionStore;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no saved session at {0}")]
    NotFound(String),
    #[error("session blob is malformed: {0}")]
    Format(String),
    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
