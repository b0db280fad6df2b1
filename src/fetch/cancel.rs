//! Cooperative cancellation for in-flight transfers

use crate::error::FetchError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How often a waiting caller re-checks its token.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cloneable cancellation flag.
///
/// Clones share the same flag: cancelling any of them is observed by the transfer
/// polling another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Run `work` on a dedicated thread and wait for it while polling `cancel`.
///
/// Blocking network calls cannot be interrupted from outside, so on cancellation the
/// caller returns [`FetchError::Cancelled`] right away and the worker is left to wind
/// down on its own (it observes the same token, and the transport timeout bounds it).
pub fn run_cancellable<T, F>(cancel: &CancelToken, url: &str, work: F) -> Result<T, FetchError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, FetchError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("repo-fetch-transfer".to_string())
        .spawn(move || {
            let _ = tx.send(work());
        })
        .map_err(|err| FetchError::Worker(err.to_string()))?;

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(result) => return result,
            Err(RecvTimeoutError::Timeout) if cancel.is_cancelled() => {
                tracing::debug!("Abandoning in-flight transfer of {}", url);
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(FetchError::Worker(format!("transfer of {url} panicked")));
            }
        }
    }
}
