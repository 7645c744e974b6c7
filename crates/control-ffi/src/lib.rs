//! C ABI for the control façade.
//!
//! The library keeps one process-wide [`Control`] and the tokio runtime that
//! drives it. Every entry point blocks the calling host thread until the
//! operation completes, so none of them may be called from inside a sink
//! callback.

use control::{Control, HostSink, Settings};
use libc::{c_char, c_void};
use std::ffi::{CStr, CString};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::runtime::Runtime;

struct Bridge {
    runtime: Runtime,
    control: Control,
}

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

fn bridge() -> Option<&'static Bridge> {
    if let Some(bridge) = BRIDGE.get() {
        return Some(bridge);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("control")
        .build()
    {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create runtime");
            return None;
        }
    };

    // A concurrent first call may win; its bridge is the one kept.
    let _ = BRIDGE.set(Bridge {
        runtime,
        control: Control::new(),
    });
    BRIDGE.get()
}

/// Host telemetry callbacks.
///
/// Both callbacks are optional. Strings handed to `on_log` are NUL-terminated
/// and only valid for the duration of the call.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CHostSink {
    /// Passed back unchanged as the first argument of every callback
    pub ctx: *mut c_void,

    pub on_traffic: Option<unsafe extern "C" fn(ctx: *mut c_void, upload_total: u64, download_total: u64)>,

    pub on_log: Option<unsafe extern "C" fn(ctx: *mut c_void, kind: *const c_char, payload: *const c_char)>,
}

/// A `CHostSink` the relays can hold.
struct ForeignSink(CHostSink);

// The host guarantees `ctx` may be used from any thread for as long as the
// sink stays registered.
unsafe impl Send for ForeignSink {}
unsafe impl Sync for ForeignSink {}

fn c_string(s: &str) -> CString {
    CString::new(s.replace('\0', " ")).unwrap_or_default()
}

impl HostSink for ForeignSink {
    fn on_traffic(&self, upload_total: u64, download_total: u64) {
        if let Some(callback) = self.0.on_traffic {
            unsafe { callback(self.0.ctx, upload_total, download_total) }
        }
    }

    fn on_log(&self, kind: &str, payload: &str) {
        if let Some(callback) = self.0.on_log {
            let kind = c_string(kind);
            let payload = c_string(payload);
            unsafe { callback(self.0.ctx, kind.as_ptr(), payload.as_ptr()) }
        }
    }
}

/// Read a C string argument
unsafe fn parse_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr).to_str().ok().map(str::to_string) }
}

unsafe fn parse_bytes<'a>(data: *const u8, len: usize) -> Option<&'a [u8]> {
    if data.is_null() {
        return None;
    }
    Some(unsafe { std::slice::from_raw_parts(data, len) })
}

unsafe fn parse_sink(sink: *const CHostSink) -> Option<Arc<dyn HostSink>> {
    if sink.is_null() {
        return None;
    }
    let sink = unsafe { *sink };
    Some(Arc::new(ForeignSink(sink)))
}

/// Initialize the engine from a YAML configuration and start the relays.
///
/// Also installs the tracing subscriber, configured by `control.yaml` in
/// `home_dir` when present. Returns 0 on success, -1 on error.
///
/// # Safety
///
/// `home_dir` must be a valid NUL-terminated string. `config` must point to
/// `config_len` readable bytes. `sink` must be null or point to a valid
/// `CHostSink` whose callbacks stay callable until replaced.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_setup(
    home_dir: *const c_char,
    config: *const u8,
    config_len: usize,
    sink: *const CHostSink,
) -> i32 {
    let Some(home_dir) = (unsafe { parse_c_string(home_dir) }) else {
        return -1;
    };
    let Some(config) = (unsafe { parse_bytes(config, config_len) }) else {
        return -1;
    };
    let sink = unsafe { parse_sink(sink) };
    let Some(bridge) = bridge() else {
        return -1;
    };

    let home_dir = PathBuf::from(home_dir);
    let logging = Settings::load_or_default(&home_dir).logging;
    let level = logging.level.as_deref().unwrap_or("info");
    // Already installed on repeated setup
    let _ = common::logging::try_init(level, logging.is_json());

    match bridge
        .runtime
        .block_on(bridge.control.setup(home_dir, config, sink))
    {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "control_setup failed");
            -1
        }
    }
}

/// Register, replace or (with null) clear the host sink.
///
/// # Safety
///
/// `sink` must be null or point to a valid `CHostSink`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_set_sink(sink: *const CHostSink) -> i32 {
    let Some(bridge) = bridge() else {
        return -1;
    };
    let sink = unsafe { parse_sink(sink) };
    bridge.runtime.block_on(bridge.control.set_sink(sink));
    0
}

/// Apply the profile stored under `<home_dir>/<uuid>/config.yaml`.
///
/// Returns 0 on success, -1 on error.
///
/// # Safety
///
/// `uuid` must be a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_apply_profile(uuid: *const c_char) -> i32 {
    let Some(uuid) = (unsafe { parse_c_string(uuid) }) else {
        return -1;
    };
    let Some(bridge) = bridge() else {
        return -1;
    };

    match bridge.runtime.block_on(bridge.control.apply_profile(&uuid)) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(profile = %uuid, error = %e, "control_apply_profile failed");
            -1
        }
    }
}

/// JSON snapshot of the base configuration's general section.
///
/// Returns NULL while uninitialized. Free the result with
/// `control_string_free`.
#[unsafe(no_mangle)]
pub extern "C" fn control_base_config_snapshot() -> *mut c_char {
    let Some(bridge) = bridge() else {
        return std::ptr::null_mut();
    };

    let snapshot = bridge
        .runtime
        .block_on(bridge.control.base_config_snapshot());
    match snapshot.and_then(|bytes| CString::new(bytes).ok()) {
        Some(s) => s.into_raw(),
        None => std::ptr::null_mut(),
    }
}

/// Free a string returned by this library.
///
/// # Safety
///
/// `s` must be null or a pointer returned by `control_base_config_snapshot`
/// that has not been freed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_string_free(s: *mut c_char) {
    if !s.is_null() {
        unsafe { drop(CString::from_raw(s)) }
    }
}

/// Set selections on every named selector group; bad entries are skipped.
///
/// Returns 0 on success, -1 if uninitialized or the patch is malformed.
///
/// # Safety
///
/// `data` must point to `len` readable bytes of JSON.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_patch_selectors(data: *const u8, len: usize) -> i32 {
    let Some(data) = (unsafe { parse_bytes(data, len) }) else {
        return -1;
    };
    let Some(bridge) = bridge() else {
        return -1;
    };

    match bridge.runtime.block_on(bridge.control.patch_selectors(data)) {
        Ok(report) => {
            tracing::debug!(
                applied = report.applied.len(),
                skipped = report.skipped.len(),
                "control_patch_selectors"
            );
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "control_patch_selectors failed");
            -1
        }
    }
}

/// Set the selection of the first patch entry that applies.
///
/// Returns true once one group was updated.
///
/// # Safety
///
/// `data` must point to `len` readable bytes of JSON.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_patch_first_selector(data: *const u8, len: usize) -> bool {
    let Some(data) = (unsafe { parse_bytes(data, len) }) else {
        return false;
    };
    let Some(bridge) = bridge() else {
        return false;
    };

    bridge
        .runtime
        .block_on(bridge.control.patch_first_selector(data))
}

/// Switch to "direct", "rule" or "global".
///
/// Returns 0 on success, -1 on error.
///
/// # Safety
///
/// `mode` must be a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_set_tunnel_mode(mode: *const c_char) -> i32 {
    let Some(mode) = (unsafe { parse_c_string(mode) }) else {
        return -1;
    };
    let Some(bridge) = bridge() else {
        return -1;
    };

    match bridge.runtime.block_on(bridge.control.set_tunnel_mode(&mode)) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(mode = %mode, error = %e, "control_set_tunnel_mode failed");
            -1
        }
    }
}

/// Measure the latency of `name` to `url` in milliseconds.
///
/// Returns 0 when the proxy is missing, the probe fails or the timeout
/// expires.
///
/// # Safety
///
/// `name` and `url` must be valid NUL-terminated strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_probe_latency(
    name: *const c_char,
    url: *const c_char,
    timeout_ms: u64,
) -> u64 {
    let (Some(name), Some(url)) = (unsafe { parse_c_string(name) }, unsafe { parse_c_string(url) })
    else {
        return 0;
    };
    let Some(bridge) = bridge() else {
        return 0;
    };

    bridge
        .runtime
        .block_on(bridge.control.probe_latency(&name, &url, timeout_ms))
}

/// Set the minimum level of relayed log events.
///
/// Returns 0 on success, -1 for an unknown level or while uninitialized.
///
/// # Safety
///
/// `level` must be a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_set_log_level(level: *const c_char) -> i32 {
    let Some(level) = (unsafe { parse_c_string(level) }) else {
        return -1;
    };
    let Some(bridge) = bridge() else {
        return -1;
    };

    match bridge.runtime.block_on(bridge.control.set_log_level(&level)) {
        Ok(()) => 0,
        Err(e) => {
            tracing::warn!(level = %level, error = %e, "control_set_log_level failed");
            -1
        }
    }
}

/// Stop the relays started by `control_setup`.
#[unsafe(no_mangle)]
pub extern "C" fn control_shutdown() {
    if let Some(bridge) = BRIDGE.get() {
        bridge.runtime.block_on(bridge.control.shutdown());
    }
}
