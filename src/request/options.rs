//! Per-call request configuration.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::envelope::ResponseKind;
use crate::notify::DisplayMode;
use crate::request::cancel::CancelToken;

/// Everything a caller can tune about a single request. Defaults mirror the
/// pipeline's behavior for an ordinary authenticated JSON call.
#[derive(Debug, Default)]
pub struct RequestOptions {
    /// Query map, repeat-encoded for GET/DELETE. Ignored (with a logged
    /// warning) on other methods.
    pub query: Option<Map<String, Value>>,
    /// Extra param map for non-GET methods, bracket-encoded into the URL.
    /// Ignored (with a logged warning) on GET/DELETE.
    pub params: Option<Map<String, Value>>,
    /// Caller headers; these always win over pipeline defaults.
    pub headers: Vec<(String, String)>,
    /// Per-call deadline; the client default applies when unset. Ignored when
    /// a [`CancelToken`] is adopted.
    pub timeout: Option<Duration>,
    /// Explicit auth override; `None` consults the public-path allow-list.
    pub needs_auth: Option<bool>,
    /// Request hybrid encryption of a JSON body (POST/PUT only; best-effort).
    pub encrypt: bool,
    pub response_kind: ResponseKind,
    pub error_display: DisplayMode,
    pub success_display: DisplayMode,
    /// Toast text shown on success when `success_display` is not `None`.
    pub success_message: Option<String>,
    /// Adopted cancellation signal; suppresses the internal timeout timer.
    pub cancel: Option<CancelToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self {
            success_display: DisplayMode::None,
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_auth(mut self, needs_auth: bool) -> Self {
        self.needs_auth = Some(needs_auth);
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypt = true;
        self
    }

    pub fn binary(mut self) -> Self {
        self.response_kind = ResponseKind::Binary;
        self
    }

    pub fn with_error_display(mut self, mode: DisplayMode) -> Self {
        self.error_display = mode;
        self
    }

    pub fn with_success_message(mut self, mode: DisplayMode, message: impl Into<String>) -> Self {
        self.success_display = mode;
        self.success_message = Some(message.into());
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
