// src/diagnostics.rs
//! Process-wide log observer.
//!
//! Exactly one callback can be registered at a time. Registering again
//! replaces the previous observer, [`unregister_log_callback`] removes it.
//! Every message also goes through the `log` facade, so hosts that install a
//! regular logger see the same output without registering anything.

use parking_lot::{const_rwlock, RwLock};

/// Message severity. The discriminants are the raw integers handed to
/// foreign callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum Severity {
    Error = 0,
    Info = 1,
    Debug = 2,
    Warning = 5,
}

impl Severity {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    fn level(self) -> log::Level {
        match self {
            Severity::Error => log::Level::Error,
            Severity::Warning => log::Level::Warn,
            Severity::Info => log::Level::Info,
            Severity::Debug => log::Level::Debug,
        }
    }
}

/// Observer signature: message, severity, message length in bytes.
pub type LogCallback = Box<dyn Fn(&str, Severity, usize) + Send + Sync>;

static LOG_CALLBACK: RwLock<Option<LogCallback>> = const_rwlock(None);

/// Install `callback` as the single observer, replacing any previous one.
pub fn register_log_callback<F>(callback: F)
where
    F: Fn(&str, Severity, usize) + Send + Sync + 'static,
{
    *LOG_CALLBACK.write() = Some(Box::new(callback));
}

/// Remove the current observer. Returns whether one was installed.
pub fn unregister_log_callback() -> bool {
    LOG_CALLBACK.write().take().is_some()
}

pub fn has_log_callback() -> bool {
    LOG_CALLBACK.read().is_some()
}

// The callback runs under the read lock; it must not register or unregister.
pub(crate) fn emit(severity: Severity, message: &str) {
    log::log!(target: "flatbvh", severity.level(), "{message}");
    if let Some(cb) = LOG_CALLBACK.read().as_ref() {
        cb(message, severity, message.len());
    }
}
