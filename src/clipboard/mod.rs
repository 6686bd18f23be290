//! Copy-to-clipboard with automatic clearing.
//!
//! `ClipboardGuard` owns the pending clear timer and the value it last
//! wrote. Copying again cancels the pending timer before scheduling a new
//! one, so at most one timer per guard is ever live. A timer only clears
//! the clipboard if it still holds the value this guard wrote; anything
//! the user copied since is left alone.

#[cfg(feature = "system-clipboard")]
mod system;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::errors::Result;

#[cfg(feature = "system-clipboard")]
pub use system::SystemClipboard;

pub const DEFAULT_CLEAR_AFTER: Duration = Duration::from_secs(30);

/// Platform clipboard access.
pub trait ClipboardBackend: Send + Sync {
    /// Current text contents, `None` if the clipboard holds no text.
    fn read_text(&self) -> Result<Option<String>>;

    fn write_text(&self, text: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

#[derive(Default)]
struct GuardState {
    pending: Option<JoinHandle<()>>,
    last_written: Option<Zeroizing<String>>,
}

/// Clipboard writer that clears copied secrets after a delay.
pub struct ClipboardGuard {
    backend: Arc<dyn ClipboardBackend>,
    clear_after: Duration,
    state: Arc<Mutex<GuardState>>,
}

impl ClipboardGuard {
    pub fn new(backend: Arc<dyn ClipboardBackend>) -> Self {
        Self::with_clear_after(backend, DEFAULT_CLEAR_AFTER)
    }

    /// A guard using the configured `clipboard_clear_secs`.
    pub fn from_settings(backend: Arc<dyn ClipboardBackend>, settings: &Settings) -> Self {
        Self::with_clear_after(backend, settings.clipboard_clear_after())
    }

    pub fn with_clear_after(backend: Arc<dyn ClipboardBackend>, clear_after: Duration) -> Self {
        Self {
            backend,
            clear_after,
            state: Arc::new(Mutex::new(GuardState::default())),
        }
    }

    /// Write `value` and schedule it to be cleared.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn copy_secret(&self, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(pending) = state.pending.take() {
            pending.abort();
            debug!("superseded pending clipboard clear");
        }

        self.backend.write_text(value)?;
        state.last_written = Some(Zeroizing::new(value.to_string()));

        let backend = Arc::clone(&self.backend);
        let shared = Arc::clone(&self.state);
        let delay = self.clear_after;
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = shared.lock().await;
            state.pending = None;
            if let Err(e) = clear_if_owned(backend.as_ref(), &mut state) {
                warn!(error = %e, "scheduled clipboard clear failed");
            }
        }));
        Ok(())
    }

    /// Cancel the pending timer and clear now, if the value is still ours.
    pub async fn clear_now(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        clear_if_owned(self.backend.as_ref(), &mut state)
    }

    /// A clear is scheduled and has not run yet.
    pub async fn has_pending_clear(&self) -> bool {
        self.state.lock().await.pending.is_some()
    }
}

impl Drop for ClipboardGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_lock() {
            if let Some(pending) = state.pending.take() {
                pending.abort();
            }
        }
    }
}

fn clear_if_owned(backend: &dyn ClipboardBackend, state: &mut GuardState) -> Result<()> {
    let Some(written) = state.last_written.take() else {
        return Ok(());
    };
    let current = backend.read_text()?.map(Zeroizing::new);
    if current.as_deref().map(String::as_str) == Some(written.as_str()) {
        backend.clear()?;
        debug!("clipboard cleared");
    }
    Ok(())
}
