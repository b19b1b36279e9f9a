//! Fee lookups against the CNIPA interactive portal.

mod automaton;
mod login;
mod lookup;
pub mod selectors;

use std::time::Duration;

use thiserror::Error;

pub use automaton::{LookupState, NavStage, NavigationAutomaton, QueryForm, ResultSignal};
pub use login::capture_login;
pub use lookup::{query_string, FeeLookup};

use crate::{browser::DriverError, session::SessionError};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no portal entry page could be opened ({})", attempts.join("; "))]
    EntryUnreachable { attempts: Vec<String> },
    #[error("saved session is no longer signed in; log in again to refresh it")]
    SessionExpired,
    #[error("navigation target not found: {stage}")]
    NavigationTargetNotFound { stage: NavStage },
    #[error("query form did not appear within {elapsed:?}")]
    FormTimeout { elapsed: Duration },
    #[error("no saved session at {location}")]
    SessionMissing { location: String },
    #[error(transparent)]
    Session(SessionError),
    #[error("browser failed during {stage}: {source}")]
    Driver {
        stage: &'static str,
        #[source]
        source: DriverError,
    },
    #[error("`{0}` contains no digits to query with")]
    InvalidPatentNumber(String),
    #[error("lookup cancelled")]
    Cancelled,
    #[error("login was not completed within {elapsed:?}")]
    LoginTimeout { elapsed: Duration },
}

impl From<SessionError> for LookupError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(location) => LookupError::SessionMissing { location },
            other => LookupError::Session(other),
        }
    }
}
