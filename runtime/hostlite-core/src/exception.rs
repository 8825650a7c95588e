//!
//! Last-Error Slot
//!
//! Foreign entry points never unwind into the host. A failing call returns a
//! sentinel (-1 or null) and records the failure in a thread-local slot the
//! host inspects afterwards.
//!
//! Error kind IDs:
//! - 0: None
//! - 1: DBError (engine status code + message)
//! - 2: InvalidHandle (handle closed, finalized or never issued)
//! - 3: DecodeError (unexpected column type, unencodable text)
//! - 4: ConfigError
//! - 5: ArgumentError
//!

use std::cell::RefCell;

use crate::value::{host_string, HostString};

pub const ERROR_KIND_NONE: i64 = 0;
pub const ERROR_KIND_DB_ERROR: i64 = 1;
pub const ERROR_KIND_INVALID_HANDLE: i64 = 2;
pub const ERROR_KIND_DECODE_ERROR: i64 = 3;
pub const ERROR_KIND_CONFIG_ERROR: i64 = 4;
pub const ERROR_KIND_ARGUMENT_ERROR: i64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct LastError {
    pub kind: i64,
    pub code: i64,
    pub message: String,
}

thread_local! {
    static LAST_ERROR: RefCell<Option<LastError>> = const { RefCell::new(None) };
}

/// Record a failure for the current thread, replacing any previous one
pub fn set_last_error(kind: i64, code: i64, message: impl Into<String>) {
    let error = LastError { kind, code, message: message.into() };
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(error));
}

/// Snapshot of the current thread's failure, if any
pub fn last_error() -> Option<LastError> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// 1 if a failure is pending on this thread
#[unsafe(no_mangle)]
pub extern "C" fn hostlite_error_check() -> i64 {
    LAST_ERROR.with(|slot| if slot.borrow().is_some() { 1 } else { 0 })
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlite_error_kind() -> i64 {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(ERROR_KIND_NONE, |e| e.kind))
}

/// Engine status code of the pending failure (-1 for non-engine errors)
#[unsafe(no_mangle)]
pub extern "C" fn hostlite_error_code() -> i64 {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(0, |e| e.code))
}

/// Message of the pending failure as a new string (empty when none)
#[unsafe(no_mangle)]
pub extern "C" fn hostlite_error_message() -> *mut HostString {
    LAST_ERROR.with(|slot| match slot.borrow().as_ref() {
        Some(e) => host_string(&e.message),
        None => host_string(""),
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlite_error_clear() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}
