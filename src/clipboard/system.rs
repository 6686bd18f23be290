use std::sync::Mutex;

use crate::errors::{Result, VaultCoreError};

use super::ClipboardBackend;

/// The OS clipboard, via `arboard`.
pub struct SystemClipboard {
    inner: Mutex<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let clipboard = arboard::Clipboard::new().map_err(clipboard_err)?;
        Ok(Self {
            inner: Mutex::new(clipboard),
        })
    }

    fn with<T>(&self, f: impl FnOnce(&mut arboard::Clipboard) -> Result<T>) -> Result<T> {
        let mut clipboard = self
            .inner
            .lock()
            .map_err(|_| VaultCoreError::Io(std::io::Error::other("clipboard lock poisoned")))?;
        f(&mut clipboard)
    }
}

fn clipboard_err(e: arboard::Error) -> VaultCoreError {
    VaultCoreError::Io(std::io::Error::other(format!("clipboard: {e}")))
}

impl ClipboardBackend for SystemClipboard {
    fn read_text(&self) -> Result<Option<String>> {
        self.with(|c| match c.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(clipboard_err(e)),
        })
    }

    fn write_text(&self, text: &str) -> Result<()> {
        self.with(|c| c.set_text(text).map_err(clipboard_err))
    }

    fn clear(&self) -> Result<()> {
        self.with(|c| c.clear().map_err(clipboard_err))
    }
}
