//! Client TLS identity for mutually authenticated ClickHouse connections.
//!
//! A connection that asks for `tls_config=spiffe` gets a [`TlsSettings`]
//! whose identity source always answers with the identity currently on
//! disk. The filesystem watcher reloads the PEM pair in the background
//! whenever either file changes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Minimum protocol version required on mTLS connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

/// A client certificate/key pair in PEM form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

/// Yields the identity a connection should present right now.
pub trait IdentitySource: Send + Sync {
    fn client_identity(&self) -> std::io::Result<ClientIdentity>;
}

/// TLS material attached to a connection record.
#[derive(Clone)]
pub struct TlsSettings {
    pub min_version: TlsVersion,
    pub identity: Arc<dyn IdentitySource>,
}

impl std::fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSettings")
            .field("min_version", &self.min_version)
            .finish_non_exhaustive()
    }
}

/// How often the watcher polls the certificate files for changes.
const RELOAD_POLL_INTERVAL: Duration = Duration::from_secs(10);

struct WatchedIdentity {
    identity: ClientIdentity,
    cert_mtime: SystemTime,
    key_mtime: SystemTime,
}

/// Filesystem-backed identity source with background reload.
pub struct FsIdentityWatcher {
    cert_path: PathBuf,
    key_path: PathBuf,
    current: Mutex<WatchedIdentity>,
}

impl FsIdentityWatcher {
    /// Load the identity from disk and spawn the reload task.
    ///
    /// # Errors
    /// Returns an error if either file is missing or unreadable.
    pub fn spawn(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> std::io::Result<Arc<Self>> {
        let cert_path = cert_path.as_ref().to_path_buf();
        let key_path = key_path.as_ref().to_path_buf();

        let current = Mutex::new(Self::load(&cert_path, &key_path)?);
        let watcher = Arc::new(Self {
            cert_path,
            key_path,
            current,
        });

        let weak = Arc::downgrade(&watcher);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RELOAD_POLL_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(watcher) = weak.upgrade() else {
                    break;
                };
                watcher.reload_if_changed();
            }
        });

        Ok(watcher)
    }

    fn load(cert_path: &Path, key_path: &Path) -> std::io::Result<WatchedIdentity> {
        let cert_pem = std::fs::read(cert_path)?;
        let key_pem = std::fs::read(key_path)?;
        let cert_mtime = std::fs::metadata(cert_path)?.modified()?;
        let key_mtime = std::fs::metadata(key_path)?.modified()?;
        Ok(WatchedIdentity {
            identity: ClientIdentity { cert_pem, key_pem },
            cert_mtime,
            key_mtime,
        })
    }

    fn reload_if_changed(&self) {
        let changed = {
            let current = self.current.lock().expect("identity lock poisoned");
            let cert_mtime = std::fs::metadata(&self.cert_path).and_then(|m| m.modified());
            let key_mtime = std::fs::metadata(&self.key_path).and_then(|m| m.modified());
            match (cert_mtime, key_mtime) {
                (Ok(c), Ok(k)) => c != current.cert_mtime || k != current.key_mtime,
                _ => false,
            }
        };
        if !changed {
            return;
        }

        match Self::load(&self.cert_path, &self.key_path) {
            Ok(fresh) => {
                tracing::info!(
                    cert = %self.cert_path.display(),
                    "Reloaded client TLS identity"
                );
                *self.current.lock().expect("identity lock poisoned") = fresh;
            }
            Err(e) => {
                tracing::warn!(
                    cert = %self.cert_path.display(),
                    error = %e,
                    "Failed to reload client TLS identity, keeping previous"
                );
            }
        }
    }
}

impl IdentitySource for FsIdentityWatcher {
    fn client_identity(&self) -> std::io::Result<ClientIdentity> {
        Ok(self
            .current
            .lock()
            .expect("identity lock poisoned")
            .identity
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_watcher_requires_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.pem");
        assert!(FsIdentityWatcher::spawn(&missing, &missing).is_err());
    }

    #[tokio::test]
    async fn test_watcher_serves_current_identity() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("tls.crt");
        let key = dir.path().join("tls.key");
        std::fs::File::create(&cert)
            .unwrap()
            .write_all(b"CERT")
            .unwrap();
        std::fs::File::create(&key)
            .unwrap()
            .write_all(b"KEY")
            .unwrap();

        let watcher = FsIdentityWatcher::spawn(&cert, &key).unwrap();
        let identity = watcher.client_identity().unwrap();
        assert_eq!(identity.cert_pem, b"CERT");
        assert_eq!(identity.key_pem, b"KEY");
    }
}
