use crate::config::AppConfig;
use std::{
    env, fs,
    io::Write,
    panic,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard, OnceLock,
    },
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const CRASH_LOG_MAX_BYTES: u64 = 256 * 1024;
static LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_CONTENT_ENABLED: AtomicBool = AtomicBool::new(false);
static DEBUG_LOG: OnceLock<Mutex<Option<RotatingLog>>> = OnceLock::new();

/// Path to the temp log file we rotate between runs.
pub fn log_file_path() -> PathBuf {
    env::temp_dir().join("voxfeed_coordinator.log")
}

/// Path to the crash log file (metadata only).
pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("voxfeed_crash.log")
}

/// Append-only log file that starts over once it would pass `max_bytes`.
struct RotatingLog {
    path: PathBuf,
    file: fs::File,
    max_bytes: u64,
    len: u64,
}

impl RotatingLog {
    fn open(path: PathBuf, max_bytes: u64) -> Option<Self> {
        let len = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;
        let mut log = Self {
            path,
            file,
            max_bytes,
            len,
        };
        if log.len > max_bytes {
            log.truncate();
        }
        Some(log)
    }

    fn truncate(&mut self) {
        if let Ok(file) = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
        {
            self.file = file;
            self.len = 0;
        }
    }

    fn append(&mut self, line: &str) {
        if self.len.saturating_add(line.len() as u64) > self.max_bytes {
            self.truncate();
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.len = self.len.saturating_add(line.len() as u64);
        }
    }
}

// Never route through `lock_or_recover`: it logs, and would re-enter here.
fn debug_log() -> MutexGuard<'static, Option<RotatingLog>> {
    DEBUG_LOG
        .get_or_init(|| Mutex::new(None))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

fn apply_log_flags(enabled: bool, content_enabled: bool) {
    LOG_ENABLED.store(enabled, Ordering::Relaxed);
    LOG_CONTENT_ENABLED.store(enabled && content_enabled, Ordering::Relaxed);
    *debug_log() = if enabled {
        RotatingLog::open(log_file_path(), LOG_MAX_BYTES)
    } else {
        None
    };
}

/// Configure logging based on CLI flags or environment.
pub fn init_logging(config: &AppConfig) {
    let enabled = (config.logs || config.log_timings) && !config.no_logs;
    apply_log_flags(enabled, config.log_content);
}

/// Write debug messages to a temp file so hosts can troubleshoot gesture/playback races.
///
/// Lines are tagged with the calling thread, since microphone capture and
/// stdin reading run off the coordinator thread.
pub fn log_debug(msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let current = thread::current();
    let line = format!(
        "[{}][{}] {msg}\n",
        now_ms(),
        current.name().unwrap_or("unnamed")
    );
    if let Some(log) = debug_log().as_mut() {
        log.append(&line);
    }
}

/// Write logs that may contain user content (transcript snippets, TTS text).
pub fn log_debug_content(msg: &str) {
    if !LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    log_debug(msg);
}

fn panic_payload(info: &panic::PanicHookInfo<'_>) -> String {
    if !LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        return "payload omitted (log-content disabled)".to_string();
    }
    let payload = info.payload();
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Write a minimal crash log entry, omitting user content unless explicitly enabled.
pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let line = format!(
        "[{}] voxfeed v{} panicked on '{}' at {location}: {}\n",
        now_ms(),
        env!("CARGO_PKG_VERSION"),
        thread::current().name().unwrap_or("unnamed"),
        panic_payload(info)
    );
    if let Some(mut log) = RotatingLog::open(crash_log_path(), CRASH_LOG_MAX_BYTES) {
        log.append(&line);
    }
}

#[cfg(test)]
pub(crate) fn set_logging_for_tests(enabled: bool, content_enabled: bool) {
    apply_log_flags(enabled, content_enabled);
}
