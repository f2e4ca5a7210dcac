//! The request pipeline: the single choke point for every network call.
//!
//! One attempt flows through, in order: option/default merge, pre-flight auth
//! gate, URL and query assembly, best-effort body encryption, header
//! assembly, bearer attach, dispatch under a deadline or an adopted cancel
//! signal, response decryption, and envelope interpretation. A business 401
//! triggers the session's single-flight invalidation before the error
//! propagates.

mod cancel;
mod options;
mod query;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use options::RequestOptions;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::multipart::Form;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::crypto::{self, ENCRYPT_KEY_HEADER};
use crate::envelope::{self, Outcome, ResponseKind};
use crate::error::{Error, Result, SESSION_EXPIRED_MESSAGE};
use crate::notify::{DisplayMode, LogNotifier, Notifier, Severity};
use crate::session::{AuthSession, LogLogout, LogoutHandler};
use crate::storage::{KeyValueStore, MemoryStore, LOCALE_KEY};

/// Unwrapped response for callers that opt out of envelope transformation.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

enum Payload {
    Empty,
    Json(Value),
    Multipart(Form),
}

/// Builder for [`RequestPipeline`]; collaborators default to logging stubs.
pub struct PipelineBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    logout: Option<Arc<dyn LogoutHandler>>,
}

impl PipelineBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            store: None,
            notifier: None,
            logout: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn logout(mut self, logout: Arc<dyn LogoutHandler>) -> Self {
        self.logout = Some(logout);
        self
    }

    pub fn build(self) -> Result<RequestPipeline> {
        let mut base = Url::parse(&self.config.base_url)?;
        // A trailing slash keeps Url::join from replacing the last path
        // segment of a prefixed base like `https://host/api`.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));
        let logout = self.logout.unwrap_or_else(|| Arc::new(LogLogout));
        let session = Arc::new(AuthSession::new(store.clone(), logout));

        Ok(RequestPipeline {
            http,
            base,
            config: self.config,
            session,
            notifier,
            store,
        })
    }
}

pub struct RequestPipeline {
    http: reqwest::Client,
    base: Url,
    config: ClientConfig,
    session: Arc<AuthSession>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn KeyValueStore>,
}

impl RequestPipeline {
    pub fn builder(config: ClientConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn new(config: ClientConfig) -> Result<Self> {
        PipelineBuilder::new(config).build()
    }

    /// The auth session backing this pipeline (token set/clear lives here).
    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<Value> {
        self.send_json(Method::GET, path, Payload::Empty, options)
            .await
    }

    pub async fn post(
        &self,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        let payload = body.map(Payload::Json).unwrap_or(Payload::Empty);
        self.send_json(Method::POST, path, payload, options).await
    }

    pub async fn put(
        &self,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        let payload = body.map(Payload::Json).unwrap_or(Payload::Empty);
        self.send_json(Method::PUT, path, payload, options).await
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<Value> {
        self.send_json(Method::DELETE, path, Payload::Empty, options)
            .await
    }

    /// Multipart upload. The form passes through untouched: no encryption and
    /// no default `Content-Type` injection.
    pub async fn upload(&self, path: &str, form: Form, options: RequestOptions) -> Result<Value> {
        self.send_json(Method::POST, path, Payload::Multipart(form), options)
            .await
    }

    /// Fetch raw bytes (exports, previews). Envelope rules short-circuit for
    /// binary responses, so the payload comes back untouched even when it is
    /// not valid JSON.
    pub async fn download(&self, path: &str, mut options: RequestOptions) -> Result<Bytes> {
        options.response_kind = ResponseKind::Binary;
        let error_display = options.error_display;
        let request_id = Uuid::new_v4();
        let started = Instant::now();

        let outcome = self
            .execute(Method::GET, path, Payload::Empty, options, request_id)
            .await;
        match outcome {
            Ok(Outcome::Binary(bytes)) => Ok(bytes),
            Ok(other) => Err(self.conclude(other, error_display, path, request_id, started)),
            Err(e) => Err(self.report_error(e, error_display, path, request_id, started)),
        }
    }

    /// Escape hatch: run the full pipeline (auth, encryption, deadline,
    /// response decryption) but skip envelope interpretation and display,
    /// handing back the unwrapped response.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<RawResponse> {
        let payload = body.map(Payload::Json).unwrap_or(Payload::Empty);
        let request_id = Uuid::new_v4();
        let (status, headers, body) = self.dispatch(method, path, payload, options, request_id).await?;
        let body = self.maybe_decrypt(&headers, body);
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    /// JSON-envelope call: execute, interpret, display, map to data or error.
    async fn send_json(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
        options: RequestOptions,
    ) -> Result<Value> {
        let error_display = options.error_display;
        let success_display = options.success_display;
        let success_message = options.success_message.clone();
        let request_id = Uuid::new_v4();
        let started = Instant::now();

        let outcome = self.execute(method, path, payload, options, request_id).await;
        match outcome {
            Ok(Outcome::Success(data)) => {
                debug!(path, %request_id, duration_ms = started.elapsed().as_millis() as u64, "request succeeded");
                if success_display != DisplayMode::None {
                    if let Some(message) = &success_message {
                        self.notifier
                            .notify(message, Severity::Success, success_display);
                    }
                }
                Ok(data)
            }
            Ok(Outcome::Binary(_)) => Err(self.report_error(
                Error::Network("unexpected binary response body".to_string()),
                error_display,
                path,
                request_id,
                started,
            )),
            Ok(other) => Err(self.conclude(other, error_display, path, request_id, started)),
            Err(e) => Err(self.report_error(e, error_display, path, request_id, started)),
        }
    }

    /// Dispatch plus decryption plus envelope interpretation.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
        options: RequestOptions,
        request_id: Uuid,
    ) -> Result<Outcome> {
        let kind = options.response_kind;
        let (status, headers, body) = self.dispatch(method, path, payload, options, request_id).await?;
        let body = self.maybe_decrypt(&headers, body);
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(envelope::interpret(status, content_type.as_deref(), kind, body))
    }

    /// One wire attempt: build, send, read. No envelope interpretation.
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
        options: RequestOptions,
        request_id: Uuid,
    ) -> Result<(u16, HeaderMap, Bytes)> {
        let token = self.session.preflight(path, options.needs_auth)?;
        let timeout = options.timeout.unwrap_or(self.config.default_timeout);

        let mut url = self.base.join(path.trim_start_matches('/'))?;
        if method == Method::GET || method == Method::DELETE {
            if let Some(q) = &options.query {
                query::append_repeat_query(&mut url, q);
            }
            if options.params.is_some() {
                warn!(path, "params map is ignored on GET/DELETE, use query");
            }
        } else {
            if let Some(p) = &options.params {
                query::append_bracket_query(&mut url, p);
            }
            if options.query.is_some() {
                warn!(path, "query map is ignored on this method, use params");
            }
        }

        let mut headers = HeaderMap::new();
        // The client identifier travels on every request, even when the host
        // configured none.
        if let Ok(v) = HeaderValue::from_str(&self.config.client_id) {
            headers.insert(HeaderName::from_static("clientid"), v);
        }
        let locale = self
            .store
            .get(LOCALE_KEY)
            .unwrap_or_else(|| self.config.default_locale.clone());
        if let Ok(v) = HeaderValue::from_str(&locale) {
            headers.insert(reqwest::header::ACCEPT_LANGUAGE, v.clone());
            headers.insert(HeaderName::from_static("content-language"), v);
        }
        if let Ok(v) = HeaderValue::from_str(&request_id.to_string()) {
            headers.insert(HeaderName::from_static("x-request-id"), v);
        }

        // Best-effort encryption: JSON bodies on POST/PUT only. Any failure
        // (missing key material, wrap error) falls back to plaintext; the
        // request itself must never abort here.
        let mut encrypted_body: Option<String> = None;
        let encryptable_method = method == Method::POST || method == Method::PUT;
        if let (true, true, Payload::Json(body_value)) =
            (options.encrypt, encryptable_method, &payload)
        {
            match &self.config.rsa_public_key_pem {
                Some(pem) => match serde_json::to_vec(body_value) {
                    Ok(plain) => match crypto::encrypt_body(&plain, pem) {
                        Ok(sealed) => {
                            if let Ok(v) = HeaderValue::from_str(&sealed.wrapped_key) {
                                headers.insert(
                                    HeaderName::from_static(ENCRYPT_KEY_HEADER),
                                    v,
                                );
                                headers.insert(
                                    CONTENT_TYPE,
                                    HeaderValue::from_static("text/plain;charset=utf-8"),
                                );
                                encrypted_body = Some(sealed.cipher_text);
                            }
                        }
                        Err(e) => {
                            warn!(path, %request_id, error = %e, "body encryption failed, sending plaintext");
                        }
                    },
                    Err(e) => {
                        warn!(path, %request_id, error = %e, "body serialization for encryption failed, sending plaintext");
                    }
                },
                None => {
                    warn!(path, %request_id, "encryption requested without a public key, sending plaintext");
                }
            }
        }

        if !headers.contains_key(CONTENT_TYPE)
            && encrypted_body.is_none()
            && matches!(payload, Payload::Json(_))
        {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        // Caller headers always win over pipeline defaults.
        for (name, value) in &options.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = name.as_str(), "skipping invalid caller header"),
            }
        }

        let mut req = self.http.request(method, url).headers(headers);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req = match (encrypted_body, payload) {
            (Some(cipher_text), _) => req.body(cipher_text),
            (None, Payload::Json(body_value)) => req.body(serde_json::to_vec(&body_value)?),
            (None, Payload::Multipart(form)) => req.multipart(form),
            (None, Payload::Empty) => req,
        };

        let round_trip = async move {
            let resp = req.send().await?;
            let status = resp.status().as_u16();
            let headers = resp.headers().clone();
            let body = resp.bytes().await?;
            Ok::<_, Error>((status, headers, body))
        };

        // A caller-supplied cancel signal owns the request lifetime; the
        // pipeline starts no timer of its own in that case. Either way the
        // pending I/O is dropped on the losing branch, so no timer or socket
        // outlives this call.
        match options.cancel {
            Some(cancel) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    result = round_trip => result,
                }
            }
            None => match tokio::time::timeout(timeout, round_trip).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout),
            },
        }
    }

    /// Decrypt the response body when the server flagged it with an
    /// `encrypt-key` header; otherwise hand it back unmodified.
    fn maybe_decrypt(&self, headers: &HeaderMap, body: Bytes) -> Bytes {
        let Some(wrapped) = headers.get(ENCRYPT_KEY_HEADER).and_then(|v| v.to_str().ok()) else {
            return body;
        };
        let Some(private_pem) = &self.config.rsa_private_key_pem else {
            warn!("encrypted response received without a private key configured");
            return body;
        };
        Bytes::from(crypto::decrypt_body(&body, wrapped, private_pem))
    }

    /// Turn a non-success envelope outcome into a typed error, running the
    /// 401 single-flight side effect and the display decision.
    fn conclude(
        &self,
        outcome: Outcome,
        mode: DisplayMode,
        path: &str,
        request_id: Uuid,
        started: Instant,
    ) -> Error {
        match outcome {
            Outcome::Unauthorized => {
                let won = self.session.invalidate();
                info!(path, %request_id, won_invalidation = won, "unauthorized response, session invalidated");
                // The winning flight alone shows the notification, so any
                // number of concurrent 401s surface at most one message.
                if won && mode != DisplayMode::None {
                    self.notifier
                        .notify(SESSION_EXPIRED_MESSAGE, Severity::Error, mode);
                }
                Error::Unauthorized
            }
            Outcome::Business { code, message } => self.report_error(
                Error::Business { code, message },
                mode,
                path,
                request_id,
                started,
            ),
            Outcome::Transport { status, message } => self.report_error(
                Error::Transport { status, message },
                mode,
                path,
                request_id,
                started,
            ),
            // Success and Binary are consumed by the callers before this
            // point; mapping them keeps this total without a panic path.
            Outcome::Success(_) | Outcome::Binary(_) => self.report_error(
                Error::Network("unexpected response shape".to_string()),
                mode,
                path,
                request_id,
                started,
            ),
        }
    }

    fn report_error(
        &self,
        err: Error,
        mode: DisplayMode,
        path: &str,
        request_id: Uuid,
        started: Instant,
    ) -> Error {
        info!(
            path,
            %request_id,
            code = err.code(),
            duration_ms = started.elapsed().as_millis() as u64,
            "request failed: {err}"
        );
        if !err.suppress_display() && mode != DisplayMode::None {
            self.notifier.notify(&err.to_string(), Severity::Error, mode);
        }
        err
    }
}
