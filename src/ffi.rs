//! FFI bindings for NeuroPlay analytics
//!
//! C-compatible entry points for game clients and host apps. All functions
//! take null-terminated UTF-8 strings and return newly allocated strings that
//! must be freed by the caller with `neuroplay_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::cohort::{CohortAnalyzer, CohortSession};
use crate::error::AnalyticsError;
use crate::metrics::MetricExtractor;
use crate::types::RawSessionData;

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

/// Run `f` on the decoded input and hand back its JSON, or NULL with the
/// error recorded.
unsafe fn with_json_input(
    input: *const c_char,
    f: impl FnOnce(&str) -> Result<String, AnalyticsError>,
) -> *mut c_char {
    clear_last_error();

    let input = match cstr_to_string(input) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match f(&input) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Analysis API
// ============================================================================

/// Extract session metrics from a raw session JSON object.
///
/// # Safety
/// - `session_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `neuroplay_free_string`.
/// - Returns NULL on error; call `neuroplay_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn neuroplay_extract_metrics(session_json: *const c_char) -> *mut c_char {
    with_json_input(session_json, |json| {
        let raw = RawSessionData::from_json(json)?;
        let metrics = MetricExtractor::default().extract(&raw);
        Ok(serde_json::to_string(&metrics)?)
    })
}

/// Analyze a JSON array of sessions and return the cohort outcome.
///
/// An "insufficient data" outcome is a successful call; NULL is only
/// returned for unreadable input.
///
/// # Safety
/// - `sessions_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `neuroplay_free_string`.
/// - Returns NULL on error; call `neuroplay_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn neuroplay_analyze_cohort(sessions_json: *const c_char) -> *mut c_char {
    with_json_input(sessions_json, |json| {
        let sessions: Vec<CohortSession> = serde_json::from_str(json)?;
        let outcome = CohortAnalyzer::default().analyze(&sessions);
        Ok(serde_json::to_string(&outcome)?)
    })
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by NeuroPlay functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a NeuroPlay function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn neuroplay_free_string(ptr: *mut c_char) {
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
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next NeuroPlay call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn neuroplay_last_error() -> *const c_char {
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
pub unsafe extern "C" fn neuroplay_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        neuroplay_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_extract_metrics() {
        let json = CString::new(
            r#"{"reaction_times": [0.5, 0.7], "obstacles_avoided": 3, "obstacles_hit": 1}"#,
        )
        .unwrap();

        unsafe {
            let result = take_string(neuroplay_extract_metrics(json.as_ptr()));
            let value: serde_json::Value = serde_json::from_str(&result).unwrap();
            assert!((value["reaction_mean"].as_f64().unwrap() - 0.6).abs() < 1e-9);
            assert_eq!(value["obstacle_avoidance_rate"], 75.0);
            assert!(neuroplay_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_extract_metrics_malformed() {
        let json = CString::new(r#"{"reaction_times": "fast"}"#).unwrap();

        unsafe {
            let result = neuroplay_extract_metrics(json.as_ptr());
            assert!(result.is_null());

            let error = neuroplay_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.contains("reaction_times"));
        }
    }

    #[test]
    fn test_ffi_null_input() {
        unsafe {
            assert!(neuroplay_extract_metrics(ptr::null()).is_null());
            assert!(!neuroplay_last_error().is_null());
            assert!(neuroplay_analyze_cohort(ptr::null()).is_null());
        }
    }

    #[test]
    fn test_ffi_analyze_cohort_insufficient_data() {
        let json = CString::new(r#"[{"id": "s-1", "session_data": {"reaction_times": []}}]"#)
            .unwrap();

        unsafe {
            let result = take_string(neuroplay_analyze_cohort(json.as_ptr()));
            let value: serde_json::Value = serde_json::from_str(&result).unwrap();
            assert_eq!(value["status"], "insufficient_data");
            assert_eq!(value["qualifying_sessions"], 0);
        }
    }

    #[test]
    fn test_ffi_analyze_cohort_report() {
        let json = CString::new(
            r#"[{"id": "s-1", "score": 120, "session_data": {"reaction_times": [0.5, 0.6], "attention_scores": [70, 75]}}]"#,
        )
        .unwrap();

        unsafe {
            let result = take_string(neuroplay_analyze_cohort(json.as_ptr()));
            let value: serde_json::Value = serde_json::from_str(&result).unwrap();
            assert_eq!(value["status"], "report");
            assert_eq!(value["anomaly_detection_applied"], false);
            assert_eq!(value["sessions"].as_array().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = neuroplay_version();
            assert!(!version.is_null());
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, env!("CARGO_PKG_VERSION"));
        }
    }
}
