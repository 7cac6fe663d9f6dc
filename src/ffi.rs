//! FFI bindings for doomscope
//!
//! C-compatible functions for embedding the detector in mobile hosts.
//! Strings are null-terminated; every returned string is allocated here and
//! must be freed with `doomscope_free_string`.
//!
//! A monitor handle owns a single-worker tokio runtime that drives the
//! analysis clock, so hosts only feed gestures and poll events. Timestamps
//! are Unix milliseconds. Enum arguments are ordinals:
//!
//! - preset: 0 low, 1 medium, 2 high
//! - power mode: 0 full, 1 balanced, 2 reduced, 3 minimal, 4 suspended
//! - intervention kind: 0 gentle, 1 firm, 2 mandatory break
//! - intervention result: 0 completed, 1 took break, 2 skipped, 3 continued, 4 timed out

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::clock::SystemClock;
use crate::config::{DetectionConfig, SensitivityPreset};
use crate::error::DetectorError;
use crate::monitor::{MonitorEvent, MonitoringController};
use crate::types::{InterventionKind, InterventionResult, PowerMode, Vector2};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn json_to_cstr<T: Serialize + ?Sized>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn ordinal<T: Copy>(values: &[T], index: i32, what: &str) -> Option<T> {
    let value = usize::try_from(index).ok().and_then(|i| values.get(i).copied());
    if value.is_none() {
        set_last_error(&format!("Invalid {} ordinal: {}", what, index));
    }
    value
}

fn timestamp_from_millis(ms: i64) -> Option<DateTime<Utc>> {
    let at = DateTime::<Utc>::from_timestamp_millis(ms);
    if at.is_none() {
        set_last_error(&format!("Timestamp out of range: {}", ms));
    }
    at
}

unsafe fn handle_ref<'a>(handle: *mut MonitorHandle) -> Option<&'a mut MonitorHandle> {
    if handle.is_null() {
        set_last_error("Null monitor pointer");
        return None;
    }
    Some(&mut *handle)
}

// ============================================================================
// Monitor lifecycle
// ============================================================================

/// Opaque handle to a monitoring controller and its runtime
pub struct MonitorHandle {
    controller: MonitoringController,
    events: broadcast::Receiver<MonitorEvent>,
    // Declared last so the controller (and its clock task) drops first
    _runtime: Runtime,
}

impl MonitorHandle {
    fn new(config: DetectionConfig) -> Result<Self, DetectorError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("doomscope-analysis")
            .enable_time()
            .build()
            .map_err(|e| DetectorError::RuntimeError(e.to_string()))?;

        let controller =
            MonitoringController::with_runtime(config.validated()?, runtime.handle().clone(), Arc::new(SystemClock));
        let events = controller.subscribe();
        Ok(Self {
            controller,
            events,
            _runtime: runtime,
        })
    }

    fn into_raw(result: Result<Self, DetectorError>) -> *mut MonitorHandle {
        match result {
            Ok(handle) => Box::into_raw(Box::new(handle)),
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        }
    }
}

/// Create a monitor from a sensitivity preset ordinal.
///
/// # Safety
/// - Returns a newly allocated monitor that must be freed with `doomscope_monitor_free`.
/// - Returns NULL on error; call `doomscope_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_new(preset: i32) -> *mut MonitorHandle {
    clear_last_error();

    let Some(preset) = ordinal(&SensitivityPreset::ALL, preset, "preset") else {
        return ptr::null_mut();
    };
    MonitorHandle::into_raw(MonitorHandle::new(DetectionConfig::preset(preset)))
}

/// Create a monitor from a JSON configuration.
///
/// Missing sections take the medium preset's values. The configuration must
/// pass validation.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string.
/// - Returns a newly allocated monitor that must be freed with `doomscope_monitor_free`.
/// - Returns NULL on error; call `doomscope_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_new_with_config(config_json: *const c_char) -> *mut MonitorHandle {
    clear_last_error();

    let Some(json) = cstr_to_string(config_json) else {
        set_last_error("Invalid config string pointer");
        return ptr::null_mut();
    };
    MonitorHandle::into_raw(DetectionConfig::from_json(&json).and_then(MonitorHandle::new))
}

/// Free a monitor.
///
/// # Safety
/// - `monitor` must be a pointer returned by a `doomscope_monitor_new*` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_free(monitor: *mut MonitorHandle) {
    if !monitor.is_null() {
        drop(Box::from_raw(monitor));
    }
}

/// Start a monitoring session.
///
/// # Safety
/// - `monitor` must be a valid monitor pointer.
/// - `app_context` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_start(monitor: *mut MonitorHandle, app_context: *const c_char) -> i32 {
    clear_last_error();

    let Some(handle) = handle_ref(monitor) else {
        return -1;
    };
    let Some(app_context) = cstr_to_string(app_context) else {
        set_last_error("Invalid app context string pointer");
        return -1;
    };

    handle.controller.start_monitoring(&app_context);
    0
}

/// Pause the current session.
///
/// # Safety
/// - `monitor` must be a valid monitor pointer.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_pause(monitor: *mut MonitorHandle) -> i32 {
    clear_last_error();

    let Some(handle) = handle_ref(monitor) else {
        return -1;
    };
    handle.controller.pause_monitoring();
    0
}

/// Resume a paused session.
///
/// # Safety
/// - `monitor` must be a valid monitor pointer.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_resume(monitor: *mut MonitorHandle) -> i32 {
    clear_last_error();

    let Some(handle) = handle_ref(monitor) else {
        return -1;
    };
    handle.controller.resume_monitoring();
    0
}

/// Stop the current session and return its summary as JSON.
///
/// # Safety
/// - `monitor` must be a valid monitor pointer.
/// - Returns a newly allocated string that must be freed with `doomscope_free_string`.
/// - Returns NULL if no session was running or on error.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_stop(monitor: *mut MonitorHandle) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle_ref(monitor) else {
        return ptr::null_mut();
    };
    match handle.controller.stop_monitoring() {
        Some(summary) => json_to_cstr(&summary),
        None => {
            set_last_error("No active session");
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Gesture input
// ============================================================================

/// Record a content offset.
///
/// # Safety
/// - `monitor` must be a valid monitor pointer.
/// - Returns 1 if the sample was accepted, 0 if it was dropped, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_record_position(
    monitor: *mut MonitorHandle,
    x: f64,
    y: f64,
    timestamp_ms: i64,
) -> i32 {
    clear_last_error();

    let Some(handle) = handle_ref(monitor) else {
        return -1;
    };
    let Some(timestamp) = timestamp_from_millis(timestamp_ms) else {
        return -1;
    };

    handle.controller.process_scroll(Vector2::new(x, y), timestamp).is_some() as i32
}

/// Record a velocity computed by the host gesture recognizer.
///
/// # Safety
/// - `monitor` must be a valid monitor pointer.
/// - Returns 1 if the sample was accepted, 0 if it was dropped, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_record_velocity(
    monitor: *mut MonitorHandle,
    vx: f64,
    vy: f64,
    x: f64,
    y: f64,
    timestamp_ms: i64,
) -> i32 {
    clear_last_error();

    let Some(handle) = handle_ref(monitor) else {
        return -1;
    };
    let Some(timestamp) = timestamp_from_millis(timestamp_ms) else {
        return -1;
    };

    handle
        .controller
        .process_drag(Vector2::new(vx, vy), Vector2::new(x, y), timestamp)
        .is_some() as i32
}

// ============================================================================
// Control
// ============================================================================

/// Apply a power mode ordinal.
///
/// # Safety
/// - `monitor` must be a valid monitor pointer.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_set_power_mode(monitor: *mut MonitorHandle, mode: i32) -> i32 {
    clear_last_error();

    let Some(handle) = handle_ref(monitor) else {
        return -1;
    };
    let Some(mode) = ordinal(&PowerMode::ALL, mode, "power mode") else {
        return -1;
    };
    handle.controller.set_power_mode(mode);
    0
}

/// Report what the user did with a presented intervention.
///
/// # Safety
/// - `monitor` must be a valid monitor pointer.
/// - Returns 1 if applied, 0 if no matching intervention was presenting, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_report_result(monitor: *mut MonitorHandle, kind: i32, result: i32) -> i32 {
    clear_last_error();

    let Some(handle) = handle_ref(monitor) else {
        return -1;
    };
    let Some(kind) = ordinal(&InterventionKind::ALL, kind, "intervention kind") else {
        return -1;
    };
    let Some(result) = ordinal(&InterventionResult::ALL, result, "intervention result") else {
        return -1;
    };

    handle.controller.report_intervention_result(kind, result) as i32
}

/// Run one analysis pass now and return the intensity score.
///
/// # Safety
/// - `monitor` must be a valid monitor pointer.
/// - Returns a score in [0, 1], or -1.0 when nothing was analyzed.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_tick(monitor: *mut MonitorHandle) -> f64 {
    clear_last_error();

    let Some(handle) = handle_ref(monitor) else {
        return -1.0;
    };
    handle.controller.tick().map(|i| i.score).unwrap_or(-1.0)
}

// ============================================================================
// Output
// ============================================================================

/// Drain pending events as a JSON array.
///
/// # Safety
/// - `monitor` must be a valid monitor pointer.
/// - Returns a newly allocated string that must be freed with `doomscope_free_string`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_poll_events(monitor: *mut MonitorHandle) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle_ref(monitor) else {
        return ptr::null_mut();
    };

    let mut events = Vec::new();
    loop {
        match handle.events.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    json_to_cstr(&events)
}

/// Completed session summaries as a JSON array, oldest first.
///
/// # Safety
/// - `monitor` must be a valid monitor pointer.
/// - Returns a newly allocated string that must be freed with `doomscope_free_string`.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_session_history(monitor: *mut MonitorHandle) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle_ref(monitor) else {
        return ptr::null_mut();
    };
    json_to_cstr(&handle.controller.session_history())
}

/// Intervention ledger snapshot as JSON.
///
/// # Safety
/// - `monitor` must be a valid monitor pointer.
/// - Returns a newly allocated string that must be freed with `doomscope_free_string`.
#[no_mangle]
pub unsafe extern "C" fn doomscope_monitor_intervention_status(monitor: *mut MonitorHandle) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle_ref(monitor) else {
        return ptr::null_mut();
    };
    json_to_cstr(&handle.controller.intervention_status())
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by doomscope functions.
///
/// # Safety
/// - `ptr` must be a pointer returned by a doomscope function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn doomscope_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string, valid until the next
///   doomscope call on this thread. Do NOT free it.
/// - Returns NULL if the last call succeeded.
#[no_mangle]
pub unsafe extern "C" fn doomscope_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn doomscope_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
