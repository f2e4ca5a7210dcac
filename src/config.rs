//! Client configuration.

use std::time::Duration;

/// Static configuration for a [`RequestPipeline`](crate::RequestPipeline).
///
/// Per-call knobs (timeout override, display modes, encryption flag) live in
/// [`RequestOptions`](crate::RequestOptions); this struct carries only what is
/// fixed for the lifetime of the client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every request path is joined against.
    pub base_url: String,
    /// Value of the `Clientid` header attached to every request.
    pub client_id: String,
    /// Default per-request deadline when the caller sets none.
    pub default_timeout: Duration,
    /// Locale used for the language headers when the store holds none.
    pub default_locale: String,
    /// PEM-encoded RSA public key (SPKI) used to wrap session keys on
    /// encrypted requests. Without it, encryption requests fall back to
    /// plaintext.
    pub rsa_public_key_pem: Option<String>,
    /// PEM-encoded RSA private key (PKCS#8) used to unwrap response keys.
    /// Without it, encrypted response bodies pass through untouched.
    pub rsa_private_key_pem: Option<String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client_id: String::new(),
            default_timeout: Duration::from_secs(30),
            default_locale: "en-US".to_string(),
            rsa_public_key_pem: None,
            rsa_private_key_pem: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    pub fn with_rsa_public_key(mut self, pem: impl Into<String>) -> Self {
        self.rsa_public_key_pem = Some(pem.into());
        self
    }

    pub fn with_rsa_private_key(mut self, pem: impl Into<String>) -> Self {
        self.rsa_private_key_pem = Some(pem.into());
        self
    }
}
