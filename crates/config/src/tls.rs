//! Certificate and key used by the HTTPS listeners.
//!
//! The same pair serves the API listener and, when one is configured, the
//! dedicated health listener.

use std::path::PathBuf;

use serde::Deserialize;

/// PEM-encoded certificate chain and private key.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsServerConfig {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

impl TlsServerConfig {
    /// Fails early when either file is missing, instead of at the first bind.
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        for (field, path) in [("certificate", &self.certificate), ("key", &self.key)] {
            if !path.is_file() {
                anyhow::bail!("server.tls.{field} '{}' is not a readable file", path.display());
            }
        }

        Ok(())
    }
}
