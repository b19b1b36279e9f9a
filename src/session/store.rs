use std::{fs, io, path::PathBuf};

use parking_lot::Mutex;

use super::{SessionBlob, SessionError};

enum Backing {
    File(PathBuf),
    Memory(Mutex<Option<String>>),
}

/// Where the authenticated session blob lives between lookups.
pub struct SessionStore {
    backing: Backing,
}

impl SessionStore {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    pub fn in_memory(raw: Option<String>) -> Self {
        Self {
            backing: Backing::Memory(Mutex::new(raw)),
        }
    }

    pub fn location(&self) -> String {
        match &self.backing {
            Backing::File(path) => path.display().to_string(),
            Backing::Memory(_) => "<memory>".to_string(),
        }
    }

    /// Loads and validates the blob. A blob that is present but malformed is a
    /// [`SessionError::Format`], never treated as a usable session.
    pub fn load(&self) -> Result<SessionBlob, SessionError> {
        let raw = match &self.backing {
            Backing::File(path) => match fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    return Err(SessionError::NotFound(self.location()))
                }
                Err(err) => return Err(SessionError::Io(err)),
            },
            Backing::Memory(slot) => slot
                .lock()
                .clone()
                .ok_or_else(|| SessionError::NotFound(self.location()))?,
        };
        let blob = SessionBlob::parse(&raw)?;
        tracing::debug!(
            target: "session",
            location = %self.location(),
            cookies = blob.cookies().len(),
            "session loaded"
        );
        Ok(blob)
    }

    pub fn save(&self, blob: &SessionBlob) -> Result<(), SessionError> {
        let raw = blob.to_json();
        match &self.backing {
            Backing::File(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, raw)?;
            }
            Backing::Memory(slot) => *slot.lock() = Some(raw),
        }
        tracing::info!(target: "session", location = %self.location(), "session saved");
        Ok(())
    }

    /// Whether a blob is stored, without validating it.
    pub fn exists(&self) -> bool {
        match &self.backing {
            Backing::File(path) => path.is_file(),
            Backing::Memory(slot) => slot.lock().is_some(),
        }
    }
}
