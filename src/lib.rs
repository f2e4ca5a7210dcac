//! # studio-client
//!
//! Client protocol core for the studio content platform. Two concerns live
//! here and nothing else:
//!
//! - a hybrid-encrypted HTTP request pipeline that wraps every network call:
//!   bearer-token auth with a pre-flight gate, best-effort AES+RSA body
//!   encryption, backend envelope normalization, timeout/cancellation, and
//!   single-flight session invalidation on 401;
//! - a generic asynchronous task poller reused by every long-running
//!   generation job (video synthesis, background removal, image-to-video,
//!   avatar compositing).
//!
//! Presentation (toasts, dialogs, redirects) and persistence are external
//! collaborators injected through small traits: [`Notifier`],
//! [`KeyValueStore`], [`LogoutHandler`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use studio_client::{ClientConfig, RequestOptions, RequestPipeline, TaskPoller};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> studio_client::Result<()> {
//! let pipeline = Arc::new(RequestPipeline::new(
//!     ClientConfig::new("https://api.example.com").with_client_id("studio-web"),
//! )?);
//! pipeline.session().set_token("bearer-token");
//!
//! // Submit a job...
//! let task = pipeline
//!     .post("/video/task/submit", Some(json!({"templateId": 7})), RequestOptions::new())
//!     .await?;
//! let task_id = task["taskId"].as_str().unwrap_or_default().to_string();
//!
//! // ...then poll it until terminal.
//! let poll_target = format!("/video/task/{task_id}");
//! let poller = {
//!     let pipeline = pipeline.clone();
//!     TaskPoller::builder(task_id, move || {
//!         let pipeline = pipeline.clone();
//!         let path = poll_target.clone();
//!         async move { pipeline.get(&path, RequestOptions::new()).await }
//!     })
//! }
//! .interval(Duration::from_secs(5))
//! .max_attempts(60)
//! .on_success(|payload| println!("done: {payload}"))
//! .on_timeout(|| eprintln!("gave up"))
//! .build();
//! poller.start();
//! # Ok(())
//! # }
//! ```
//!
//! ## Module organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`request`] | The request pipeline: the choke point for every call |
//! | [`poller`] | Submit-then-poll controller for async jobs |
//! | [`envelope`] | Backend `{code, msg, data}` envelope normalization |
//! | [`session`] | Bearer token state and single-flight invalidation |
//! | [`crypto`] | Hybrid AES+RSA body encryption (best-effort) |
//! | [`notify`] | Display collaborator seam |
//! | [`storage`] | Persisted token/locale collaborator seam |

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod notify;
pub mod poller;
pub mod request;
pub mod session;
pub mod storage;

pub use config::ClientConfig;
pub use envelope::{Outcome, ResponseKind};
pub use error::{Error, Result, SESSION_EXPIRED_MESSAGE};
pub use notify::{DisplayMode, Notifier, Severity};
pub use poller::{TaskHandle, TaskPoller, TaskState};
pub use request::{
    cancel_pair, CancelHandle, CancelToken, PipelineBuilder, RawResponse, RequestOptions,
    RequestPipeline,
};
pub use session::{AuthSession, LogoutHandler};
pub use storage::{KeyValueStore, MemoryStore};
