use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde_json::Value;

static SILENT: AtomicBool = AtomicBool::new(false);

#[derive(Serialize)]
struct LogEvent<'a> {
    level: &'a str,
    event: &'a str,
    message: &'a str,
    timestamp_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
}

thread_local! {
    static CAPTURED: RefCell<Option<Vec<CapturedEvent>>> = const { RefCell::new(None) };
}

/// Suppress all log output. Benches and noisy tests flip this on.
pub fn set_silent(silent: bool) {
    SILENT.store(silent, Ordering::Relaxed);
}

/// One event recorded by an [`EventCapture`].
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    pub level: String,
    pub event: String,
    pub metadata: Option<Value>,
}

/// Records every event emitted on the current thread until dropped, silent
/// or not. A current-thread tokio runtime keeps spawned tasks on that thread.
#[derive(Debug)]
pub struct EventCapture {
    _private: (),
}

impl EventCapture {
    pub fn start() -> Self {
        CAPTURED.with(|captured| *captured.borrow_mut() = Some(Vec::new()));
        Self { _private: () }
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        CAPTURED.with(|captured| captured.borrow().clone().unwrap_or_default())
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|entry| entry.event).collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events()
            .iter()
            .filter(|entry| entry.event == event)
            .count()
    }
}

impl Drop for EventCapture {
    fn drop(&mut self) {
        CAPTURED.with(|captured| *captured.borrow_mut() = None);
    }
}

fn record(level: &str, event: &str, metadata: Option<&Value>) {
    CAPTURED.with(|captured| {
        if let Some(events) = captured.borrow_mut().as_mut() {
            events.push(CapturedEvent {
                level: level.to_string(),
                event: event.to_string(),
                metadata: metadata.cloned(),
            });
        }
    });
}

fn emit(level: &str, event: &str, message: &str, metadata: Option<Value>) {
    record(level, event, metadata.as_ref());
    if SILENT.load(Ordering::Relaxed) {
        return;
    }

    let entry = LogEvent {
        level,
        event,
        message,
        timestamp_ms: current_timestamp_ms(),
        metadata,
    };

    match serde_json::to_string(&entry) {
        Ok(payload) => {
            if level == "error" {
                eprintln!("{payload}");
            } else {
                println!("{payload}");
            }
        }
        Err(err) => eprintln!(
            "{{\"level\":\"error\",\"event\":\"logging_failure\",\"message\":\"failed to serialise log\",\"error\":\"{err}\"}}"
        ),
    }
}

pub fn info(event: &str, message: &str, metadata: Value) {
    emit("info", event, message, Some(metadata));
}

pub fn warn(event: &str, message: &str, metadata: Value) {
    emit("warn", event, message, Some(metadata));
}

pub fn error(event: &str, message: &str, metadata: Value) {
    emit("error", event, message, Some(metadata));
}

pub fn info_simple(event: &str, message: &str) {
    emit("info", event, message, None);
}

pub fn warn_simple(event: &str, message: &str) {
    emit("warn", event, message, None);
}

fn current_timestamp_ms() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}
