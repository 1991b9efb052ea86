//! Credentials file
//!
//! ```toml
//! username = "student"
//! secret = "..."
//! ```

use nextup_api::Credential;
use nextup_host_api::{CredentialSource, HostError, HostResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Credential source reading a TOML file on every call
///
/// Reading on demand means a login written by another tool is picked up by
/// the next refresh without a restart.
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file. A missing file or empty username is `Ok(None)`.
    pub fn load(&self) -> HostResult<Option<Credential>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No credentials file");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let credential: Credential = toml::from_str(&content)
            .map_err(|e| HostError::Credentials(e.to_string()))?;

        if credential.username().trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(credential))
    }
}

impl CredentialSource for FileCredentials {
    fn current(&self) -> Option<Credential> {
        match self.load() {
            Ok(credential) => credential,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable credentials file");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileCredentials::new(dir.path().join("credentials.toml"));
        assert!(source.load().unwrap().is_none());
        assert!(source.current().is_none());
    }

    #[test]
    fn reads_username_and_secret() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        std::fs::write(&path, "username = \"student\"\nsecret = \"hunter2\"\n").unwrap();

        let cred = FileCredentials::new(&path).current().unwrap();
        assert_eq!(cred.username(), "student");
        assert_eq!(cred.secret(), "hunter2");
    }

    #[test]
    fn malformed_file_is_error_but_current_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        std::fs::write(&path, "username = ").unwrap();

        let source = FileCredentials::new(&path);
        assert!(matches!(source.load(), Err(HostError::Credentials(_))));
        assert!(source.current().is_none());
    }

    #[test]
    fn empty_username_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        std::fs::write(&path, "username = \"\"\nsecret = \"x\"\n").unwrap();

        assert!(FileCredentials::new(&path).current().is_none());
    }
}
