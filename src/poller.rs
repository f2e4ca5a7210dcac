//! Generic submit-then-poll controller for long-running backend jobs.
//!
//! Every async generation feature (video synthesis, background removal,
//! image-to-video, avatar compositing) follows the same protocol: submit a
//! job through the request pipeline, get a task id back, then query the
//! status endpoint on an interval until a terminal status appears. This
//! module owns that loop once so call sites only supply the status query,
//! the status extraction, and the callbacks.
//!
//! State machine: `Init → Running → {Success | Fail | TimedOut}`, with
//! `Cancelled` reachable from `Init`/`Running` through [`TaskPoller::stop`].
//! No transition leaves a terminal state. Poll attempts are strictly
//! sequential, and at most one timer is pending per poller: starting again
//! aborts the previous loop before scheduling a new one.
//!
//! Outcomes are delivered only through callbacks, never as return values;
//! pollers run detached from any single awaiting caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default attempt budget (with the default interval: five minutes of wall
/// time). Per-call-site overrides are expected; constants vary per feature.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;
/// Default delay between poll attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Init,
    Running,
    Success,
    Fail,
    TimedOut,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Fail | TaskState::TimedOut | TaskState::Cancelled
        )
    }
}

/// Point-in-time snapshot of a poller.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub task_id: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub interval: Duration,
    pub state: TaskState,
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type RequestFn = Box<dyn FnMut() -> BoxFuture<Result<Value>> + Send>;
type ParseFn = Box<dyn Fn(&Value) -> Option<String> + Send>;
type StatusPredicate = Box<dyn Fn(&str) -> bool + Send>;
type ProgressFn = Box<dyn FnMut(&Value) + Send>;
type PayloadFn = Box<dyn FnMut(Value) + Send>;
type TimeoutFn = Box<dyn FnMut() + Send>;
type ErrorFn = Box<dyn FnMut(Error) + Send>;
type ContinueFn = Box<dyn Fn(&Error) -> bool + Send>;

struct PollerConfig {
    request: RequestFn,
    parse_status: ParseFn,
    is_success: StatusPredicate,
    is_failure: StatusPredicate,
    on_progress: Option<ProgressFn>,
    on_success: Option<PayloadFn>,
    on_failure: Option<PayloadFn>,
    on_timeout: Option<TimeoutFn>,
    on_error: Option<ErrorFn>,
    continue_on_error: ContinueFn,
}

/// Configures and builds a [`TaskPoller`].
pub struct PollerBuilder {
    task_id: String,
    interval: Duration,
    max_attempts: u32,
    cfg: PollerConfig,
}

impl PollerBuilder {
    /// Replace the status-token extractor. The default reads the `status`
    /// string field of the payload.
    pub fn parse_status(mut self, f: impl Fn(&Value) -> Option<String> + Send + 'static) -> Self {
        self.cfg.parse_status = Box::new(f);
        self
    }

    pub fn is_success(mut self, f: impl Fn(&str) -> bool + Send + 'static) -> Self {
        self.cfg.is_success = Box::new(f);
        self
    }

    pub fn is_failure(mut self, f: impl Fn(&str) -> bool + Send + 'static) -> Self {
        self.cfg.is_failure = Box::new(f);
        self
    }

    /// Invoked once per non-terminal poll with the raw status payload.
    pub fn on_progress(mut self, f: impl FnMut(&Value) + Send + 'static) -> Self {
        self.cfg.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_success(mut self, f: impl FnMut(Value) + Send + 'static) -> Self {
        self.cfg.on_success = Some(Box::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl FnMut(Value) + Send + 'static) -> Self {
        self.cfg.on_failure = Some(Box::new(f));
        self
    }

    pub fn on_timeout(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.cfg.on_timeout = Some(Box::new(f));
        self
    }

    /// Invoked when a poll error aborts the task (see
    /// [`continue_on_error`](Self::continue_on_error)).
    pub fn on_error(mut self, f: impl FnMut(Error) + Send + 'static) -> Self {
        self.cfg.on_error = Some(Box::new(f));
        self
    }

    /// Policy for transport/parse errors during a poll: `true` retries the
    /// attempt (still counted against the budget), `false` aborts the task
    /// through `on_error`. Default: always continue.
    pub fn continue_on_error(mut self, f: impl Fn(&Error) -> bool + Send + 'static) -> Self {
        self.cfg.continue_on_error = Box::new(f);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn build(self) -> TaskPoller {
        TaskPoller {
            shared: Arc::new(Shared {
                task_id: self.task_id,
                interval: self.interval,
                max_attempts: self.max_attempts,
                status: Mutex::new(StatusInner {
                    state: TaskState::Init,
                    attempts: 0,
                }),
            }),
            cfg: Arc::new(tokio::sync::Mutex::new(self.cfg)),
            join: Mutex::new(None),
        }
    }
}

struct StatusInner {
    state: TaskState,
    attempts: u32,
}

struct Shared {
    task_id: String,
    interval: Duration,
    max_attempts: u32,
    status: Mutex<StatusInner>,
}

impl Shared {
    fn still_running(&self) -> bool {
        self.status
            .lock()
            .map(|st| st.state == TaskState::Running)
            .unwrap_or(false)
    }

    /// Transition to a terminal state; a no-op when the loop was already
    /// stopped (so `Cancelled` is never overwritten).
    fn finish(&self, state: TaskState) -> bool {
        if let Ok(mut st) = self.status.lock() {
            if st.state == TaskState::Running {
                st.state = state;
                return true;
            }
        }
        false
    }
}

/// Drives one task's status polling. See the module docs for semantics.
pub struct TaskPoller {
    shared: Arc<Shared>,
    cfg: Arc<tokio::sync::Mutex<PollerConfig>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl TaskPoller {
    /// Start building a poller around one status-query thunk.
    pub fn builder<F, Fut>(task_id: impl Into<String>, mut request: F) -> PollerBuilder
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        PollerBuilder {
            task_id: task_id.into(),
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cfg: PollerConfig {
                request: Box::new(move || Box::pin(request())),
                parse_status: Box::new(|payload| {
                    payload
                        .get("status")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                }),
                is_success: Box::new(|token| token == "success"),
                is_failure: Box::new(|token| token == "fail" || token == "failed"),
                on_progress: None,
                on_success: None,
                on_failure: None,
                on_timeout: None,
                on_error: None,
                continue_on_error: Box::new(|_| true),
            },
        }
    }

    /// Begin polling: the first poll fires immediately, subsequent polls
    /// after the configured interval. Calling this while a previous cycle is
    /// still pending aborts that cycle first, so one poller never has two
    /// concurrent loops against the same task.
    pub fn start(&self) {
        self.abort_loop();
        if let Ok(mut st) = self.shared.status.lock() {
            st.state = TaskState::Running;
            st.attempts = 0;
        }
        debug!(task_id = %self.shared.task_id, "task polling started");
        let shared = self.shared.clone();
        let cfg = self.cfg.clone();
        let handle = tokio::spawn(run_loop(shared, cfg));
        if let Ok(mut join) = self.join.lock() {
            *join = Some(handle);
        }
    }

    /// Cancel polling. Idempotent and safe from unmount/cleanup paths even
    /// after the task already reached a terminal state; once this returns,
    /// the status thunk will not be invoked again.
    pub fn stop(&self) {
        if let Ok(mut st) = self.shared.status.lock() {
            if !st.state.is_terminal() {
                st.state = TaskState::Cancelled;
                info!(task_id = %self.shared.task_id, "task polling cancelled");
            }
        }
        self.abort_loop();
    }

    pub fn state(&self) -> TaskState {
        self.shared
            .status
            .lock()
            .map(|st| st.state)
            .unwrap_or(TaskState::Fail)
    }

    /// Snapshot of the poller's bookkeeping.
    pub fn handle(&self) -> TaskHandle {
        let (state, attempts) = self
            .shared
            .status
            .lock()
            .map(|st| (st.state, st.attempts))
            .unwrap_or((TaskState::Fail, 0));
        TaskHandle {
            task_id: self.shared.task_id.clone(),
            attempts,
            max_attempts: self.shared.max_attempts,
            interval: self.shared.interval,
            state,
        }
    }

    fn abort_loop(&self) {
        if let Ok(mut join) = self.join.lock() {
            if let Some(handle) = join.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for TaskPoller {
    fn drop(&mut self) {
        self.abort_loop();
    }
}

enum Gate {
    Poll,
    Budget,
    Stopped,
}

async fn run_loop(shared: Arc<Shared>, cfg: Arc<tokio::sync::Mutex<PollerConfig>>) {
    // Held for the whole run; a superseding start() aborts this task, which
    // releases the guard for the replacement loop.
    let mut cfg = cfg.lock().await;

    loop {
        let gate = match shared.status.lock() {
            Ok(mut st) => {
                if st.state != TaskState::Running {
                    Gate::Stopped
                } else if st.attempts >= shared.max_attempts {
                    st.state = TaskState::TimedOut;
                    Gate::Budget
                } else {
                    st.attempts += 1;
                    Gate::Poll
                }
            }
            Err(_) => Gate::Stopped,
        };
        match gate {
            Gate::Stopped => return,
            Gate::Budget => {
                info!(
                    task_id = %shared.task_id,
                    max_attempts = shared.max_attempts,
                    "task polling exhausted its attempt budget"
                );
                if let Some(cb) = cfg.on_timeout.as_mut() {
                    cb();
                }
                return;
            }
            Gate::Poll => {}
        }

        // On a multi-thread runtime stop() can land between the gate check
        // and the request; re-check so the thunk is never invoked after
        // cancellation.
        if !shared.still_running() {
            return;
        }

        match (cfg.request)().await {
            Ok(payload) => {
                if !shared.still_running() {
                    return;
                }
                let token = (cfg.parse_status)(&payload);
                match token {
                    Some(token) if (cfg.is_success)(&token) => {
                        shared.finish(TaskState::Success);
                        info!(task_id = %shared.task_id, status = %token, "task completed");
                        if let Some(cb) = cfg.on_success.as_mut() {
                            cb(payload);
                        }
                        return;
                    }
                    Some(token) if (cfg.is_failure)(&token) => {
                        shared.finish(TaskState::Fail);
                        info!(task_id = %shared.task_id, status = %token, "task failed");
                        if let Some(cb) = cfg.on_failure.as_mut() {
                            cb(payload);
                        }
                        return;
                    }
                    _ => {
                        if let Some(cb) = cfg.on_progress.as_mut() {
                            cb(&payload);
                        }
                    }
                }
            }
            Err(err) => {
                if !shared.still_running() {
                    return;
                }
                if !(cfg.continue_on_error)(&err) {
                    shared.finish(TaskState::Fail);
                    warn!(task_id = %shared.task_id, error = %err, "task polling aborted");
                    if let Some(cb) = cfg.on_error.as_mut() {
                        cb(err);
                    }
                    return;
                }
                warn!(task_id = %shared.task_id, error = %err, "poll attempt failed, retrying");
            }
        }

        tokio::time::sleep(shared.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Init.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Success.is_terminal());
        assert!(TaskState::Fail.is_terminal());
        assert!(TaskState::TimedOut.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
    }

    #[tokio::test]
    async fn stop_from_init_cancels_idempotently() {
        let poller = TaskPoller::builder("t-1", || async { Ok(Value::Null) }).build();
        assert_eq!(poller.state(), TaskState::Init);
        poller.stop();
        assert_eq!(poller.state(), TaskState::Cancelled);
        // Idempotent.
        poller.stop();
        assert_eq!(poller.state(), TaskState::Cancelled);
    }
}
