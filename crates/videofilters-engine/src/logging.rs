//! VideoFilters logging utilities.
//!
//! Every log line is shaped like:
//!     <timestamp> [TAG][thread] message
//!
//! stderr (the devtools console in the browser build) is always the primary
//! sink. `init` can add an append-only file sink for audit/debug. Both the
//! engine and the desktop harness log through the `logi!`, `logw!` and
//! `loge!` macros exported here.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_FILE: OnceLock<Mutex<Option<std::fs::File>>> = OnceLock::new();
static RUN_ID: OnceLock<String> = OnceLock::new();

/// Initialize logging. Call once at startup.
/// - If `log_file` is Some, all log lines are appended to that path as well.
///
/// Returns the generated run_id.
pub fn init(log_file: Option<PathBuf>) -> String {
    let rid = RUN_ID
        .get_or_init(|| {
            // Short correlation id: time xor pid
            let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
            format!("{:08x}", (now.as_nanos() as u64) ^ (std::process::id() as u64))
        })
        .clone();

    let _ = LOG_FILE.get_or_init(|| Mutex::new(None));

    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => {
                if let Some(m) = LOG_FILE.get() {
                    if let Ok(mut guard) = m.lock() {
                        *guard = Some(f);
                    }
                }
            }
            Err(e) => {
                // The macros route through log_line, which is fine here; the sink is just absent.
                log_line("WARN", "LOG", &format!("failed to open log file {}: {e}", path.display()));
            }
        }
    }

    rid
}

/// Current run id (empty if init() wasn't called).
pub fn run_id() -> &'static str {
    RUN_ID.get().map(|s| s.as_str()).unwrap_or("")
}

// Local time when available, UTC otherwise.
#[cfg(not(all(feature = "web", target_arch = "wasm32")))]
pub fn log_timestamp() -> String {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    let fmt = time::macros::format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    );
    now.format(&fmt).unwrap_or_else(|_| "<time-format-error>".to_string())
}

#[cfg(all(feature = "web", target_arch = "wasm32"))]
pub fn log_timestamp() -> String {
    String::from(js_sys::Date::new_0().to_iso_string())
}

pub fn log_thread_name() -> String {
    std::thread::current().name().unwrap_or("main").to_string()
}

/// Write one fully formatted line to stderr + optional file sink.
#[doc(hidden)]
pub fn log_line(_level: &str, tag: &str, msg: &str) {
    let line = format!("{} [{}][{}] {}", log_timestamp(), tag, log_thread_name(), msg);

    #[cfg(all(feature = "web", target_arch = "wasm32"))]
    web_sys::console::log_1(&line.as_str().into());
    #[cfg(not(all(feature = "web", target_arch = "wasm32")))]
    eprintln!("{line}");

    if let Some(m) = LOG_FILE.get() {
        if let Ok(mut guard) = m.lock() {
            if let Some(f) = guard.as_mut() {
                let _ = writeln!(f, "{line}");
                let _ = f.flush();
            }
        }
    }
}

#[macro_export]
macro_rules! logi {
    ($tag:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::logging::log_line("INFO", $tag, &msg);
    }};
}

#[macro_export]
macro_rules! logw {
    ($tag:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::logging::log_line("WARN", $tag, &msg);
    }};
}

#[macro_export]
macro_rules! loge {
    ($tag:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::logging::log_line("ERROR", $tag, &msg);
    }};
}
