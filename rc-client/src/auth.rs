//! Authorization gate in front of every socket open.

use std::path::PathBuf;
use std::sync::Arc;

use rc_protocol::{AuthError, Signer};
use tracing::debug;

use crate::config::TransportOptions;

/// Obtains a signed authorization header before a socket is opened.
///
/// Failures are returned as-is; retrying is the transport layer's job, and
/// a bad key should fail fast.
#[derive(Clone)]
pub struct AuthGate {
    signer: Arc<dyn Signer>,
    key_name: String,
    key_dir: PathBuf,
}

impl AuthGate {
    /// Create a gate signing with `key_name` from `key_dir`.
    pub fn new(
        signer: Arc<dyn Signer>,
        key_name: impl Into<String>,
        key_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            signer,
            key_name: key_name.into(),
            key_dir: key_dir.into(),
        }
    }

    /// Sign and store the header in `options` for the next open.
    ///
    /// On failure `options` is left untouched.
    pub async fn authenticate(&self, options: &mut TransportOptions) -> Result<(), AuthError> {
        let header = self.signer.sign(&self.key_name, &self.key_dir).await?;
        debug!(key_name = %self.key_name, "authorization header signed");
        options.set_authorization(header);
        Ok(())
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("key_name", &self.key_name)
            .field("key_dir", &self.key_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use std::path::Path;

    struct FixedSigner(Result<&'static str, &'static str>);

    impl Signer for FixedSigner {
        fn sign<'a>(
            &'a self,
            key_name: &'a str,
            _key_dir: &'a Path,
        ) -> BoxFuture<'a, Result<String, AuthError>> {
            let result = self
                .0
                .map(|sig| format!("{key_name}:{sig}"))
                .map_err(AuthError::provider);
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn test_header_stored() {
        let gate = AuthGate::new(Arc::new(FixedSigner(Ok("sig"))), "ops", "/keys");
        let mut options = TransportOptions::default();

        gate.authenticate(&mut options).await.unwrap();
        assert_eq!(options.authorization(), Some("ops:sig"));
    }

    #[tokio::test]
    async fn test_failure_leaves_options_untouched() {
        let gate = AuthGate::new(Arc::new(FixedSigner(Err("no key"))), "ops", "/keys");
        let mut options = TransportOptions::default();
        options.set_authorization("previous");

        let err = gate.authenticate(&mut options).await.unwrap_err();
        assert!(matches!(err, AuthError::Provider(_)));
        assert_eq!(options.authorization(), Some("previous"));
    }
}
