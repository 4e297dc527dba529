//! On-disk token vault: ingress/egress/agent credential records, written
//! atomically with restrictive permissions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

#[cfg(unix)]
const FILE_MODE: u32 = 0o600;
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// A single stored credential: the bearer value the gateway presents, and
/// enough metadata to decide when the refresher needs to replace it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTokenRecord {
    /// The credential itself (opaque to the vault)
    pub access_token: String,
    /// Refresh token, if the upstream supports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix timestamp this credential expires at
    pub expires_at: u64,
    /// OAuth scope string, if applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// When this record was last written, for observability
    pub updated_at: u64,
}

impl StoredTokenRecord {
    /// Whether this credential is expired, with a 60-second safety buffer
    /// matching the teacher's `TokenInfo::is_expired`.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        now + 60 >= self.expires_at
    }

    /// Whether this credential is within `buffer_secs` of expiring — the
    /// refresher's trigger condition.
    #[must_use]
    pub fn needs_refresh(&self, buffer_secs: u64) -> bool {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        now + buffer_secs >= self.expires_at
    }
}

/// On-disk credential store. File naming, per record kind:
///
/// - ingress (the token the gateway presents to its own clients): `ingress.json`
/// - egress to a provider, no specific server: `{provider}-egress.json`
/// - egress scoped to one downstream server: `{provider}-{server}-egress.json`
/// - a named agent's own long-lived token: `agent-{agent_name}-token.json`
pub struct TokenVault {
    dir: PathBuf,
}

impl TokenVault {
    /// Open (creating if needed) a vault rooted at `dir`, with `0700`
    /// permissions on the directory.
    pub fn open(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
        Ok(Self { dir })
    }

    /// Path for the ingress record.
    #[must_use]
    pub fn ingress_path(&self) -> PathBuf {
        self.dir.join("ingress.json")
    }

    /// Path for a provider-wide egress record.
    #[must_use]
    pub fn egress_path(&self, provider: &str) -> PathBuf {
        self.dir.join(format!("{provider}-egress.json"))
    }

    /// Path for a server-scoped egress record.
    #[must_use]
    pub fn server_egress_path(&self, provider: &str, server: &str) -> PathBuf {
        self.dir.join(format!("{provider}-{server}-egress.json"))
    }

    /// Path for a named agent's token record.
    #[must_use]
    pub fn agent_token_path(&self, agent_name: &str) -> PathBuf {
        self.dir.join(format!("agent-{agent_name}-token.json"))
    }

    /// Atomically write `record` to `path`: serialize to a temp file in the
    /// same directory, set `0600` permissions, then rename over the target
    /// so a concurrent reader never observes a partially-written file.
    pub fn write(&self, path: &Path, record: &StoredTokenRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(record)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        std::io::Write::write_all(&mut tmp, &json)?;
        std::io::Write::flush(&mut tmp)?;
        set_file_permissions(tmp.path())?;

        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Read a record back, if present.
    pub fn read(&self, path: &Path) -> Result<Option<StoredTokenRecord>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        let record = serde_json::from_str(&text).map_err(|e| Error::VaultCorrupt(format!("{}: {e}", path.display())))?;
        Ok(Some(record))
    }

    /// Remove a record, if present.
    pub fn remove(&self, path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// List every record path currently in the vault, for the refresher's
    /// scan cycle.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(DIR_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(expires_at: u64) -> StoredTokenRecord {
        StoredTokenRecord {
            access_token: "secret-token".to_string(),
            refresh_token: Some("refresh-token".to_string()),
            expires_at,
            scope: Some("read write".to_string()),
            updated_at: 0,
        }
    }

    #[test]
    fn writes_and_reads_back_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let vault = TokenVault::open(dir.path().to_path_buf()).unwrap();
        let path = vault.ingress_path();

        let record = sample_record(9_999_999_999);
        vault.write(&path, &record).unwrap();

        let read_back = vault.read(&path).unwrap().unwrap();
        assert_eq!(read_back.access_token, "secret-token");
    }

    #[test]
    fn file_naming_matches_the_convention() {
        let dir = tempfile::tempdir().unwrap();
        let vault = TokenVault::open(dir.path().to_path_buf()).unwrap();

        assert_eq!(vault.ingress_path().file_name().unwrap(), "ingress.json");
        assert_eq!(vault.egress_path("cognito").file_name().unwrap(), "cognito-egress.json");
        assert_eq!(
            vault.server_egress_path("cognito", "fininfo").file_name().unwrap(),
            "cognito-fininfo-egress.json"
        );
        assert_eq!(vault.agent_token_path("ci-bot").file_name().unwrap(), "agent-ci-bot-token.json");
    }

    #[test]
    fn missing_record_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let vault = TokenVault::open(dir.path().to_path_buf()).unwrap();
        assert!(vault.read(&vault.ingress_path()).unwrap().is_none());
    }

    #[test]
    fn corrupt_record_is_reported_not_panicked_on() {
        let dir = tempfile::tempdir().unwrap();
        let vault = TokenVault::open(dir.path().to_path_buf()).unwrap();
        std::fs::write(vault.ingress_path(), b"not json").unwrap();
        assert!(matches!(vault.read(&vault.ingress_path()), Err(Error::VaultCorrupt(_))));
    }

    #[test]
    fn needs_refresh_respects_the_buffer() {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let record = sample_record(now + 100);
        assert!(record.needs_refresh(600));
        assert!(!record.needs_refresh(10));
    }

    #[cfg(unix)]
    #[test]
    fn file_permissions_are_restrictive() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let vault = TokenVault::open(dir.path().to_path_buf()).unwrap();
        let path = vault.ingress_path();
        vault.write(&path, &sample_record(9_999_999_999)).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
