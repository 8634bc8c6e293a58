//! Trust store loading for the TLS stage.
//!
//! The trust store is the webpki root set plus every PEM certificate found
//! in a configured directory. An unreadable directory degrades to the root
//! set alone with a warning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::RootCertStore;
use tracing::{debug, warn};

use crate::error::TrustStoreError;

/// Supplies the certificate set used to verify probed servers.
pub trait TrustStoreProvider: Send + Sync {
    fn load(&self) -> Result<RootCertStore, TrustStoreError>;
}

/// System roots plus the PEM files in one directory.
#[derive(Debug, Clone)]
pub struct DirTrustStore {
    dir: PathBuf,
}

impl DirTrustStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TrustStoreProvider for DirTrustStore {
    fn load(&self) -> Result<RootCertStore, TrustStoreError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| TrustStoreError::Unreadable {
            path: self.dir.clone(),
            source,
        })?;

        let mut roots = system_roots();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            append_pem_file(&mut roots, &path);
        }
        debug!(dir = ?self.dir, roots = roots.len(), "trust store loaded");
        Ok(roots)
    }
}

/// Append every certificate in one PEM file. Bad files are logged and skipped.
fn append_pem_file(roots: &mut RootCertStore, path: &Path) {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(?path, error = %e, "failed to read certificate file");
            return;
        }
    };

    let certs = match rustls_pemfile::certs(&mut bytes.as_slice()).collect::<Result<Vec<_>, _>>() {
        Ok(certs) => certs,
        Err(e) => {
            warn!(?path, error = %e, "failed to parse certificate file");
            return;
        }
    };

    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        warn!(?path, ignored, "failed to append certificate file to trust store");
    } else {
        debug!(?path, added, ignored, "appended certificates");
    }
}

/// The Mozilla root set shipped with `webpki-roots`.
pub fn system_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

/// Load from `provider`, falling back to the system roots on failure.
pub fn load_or_system_roots(provider: &dyn TrustStoreProvider) -> RootCertStore {
    match provider.load() {
        Ok(roots) => roots,
        Err(e) => {
            warn!(error = %e, "custom trust store unavailable, using system roots");
            system_roots()
        }
    }
}

/// Build a TLS client config verifying against `roots`.
pub fn client_config(roots: RootCertStore) -> Result<Arc<rustls::ClientConfig>, TrustStoreError> {
    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|e| TrustStoreError::Config(format!("tls protocol version error: {e}")))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(Arc::new(config))
}
