use std::cell::RefCell;
use std::io::{stderr, stdout, Write};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use humantime::format_rfc3339_millis;
use log::{Level, LevelFilter, Log, Metadata, Record};
use serde_json::{Map, Value};

pub const LOG_ENV: &str = "SLOTFILL_LOG";

const ALLOWED_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

thread_local! {
    static TAG_STACK: RefCell<Vec<Map<String, Value>>> = const { RefCell::new(Vec::new()) };
}

fn current_timestamp() -> String {
    format_rfc3339_millis(std::time::SystemTime::now()).to_string()
}

/// Keeps scalar tags only; nested values are dropped.
fn stable_tags(tags: Map<String, Value>) -> Map<String, Value> {
    tags.into_iter()
        .filter(|(_, value)| {
            matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
        })
        .collect()
}

fn scope_tags() -> Map<String, Value> {
    TAG_STACK.with(|stack| {
        let mut merged = Map::new();
        for map in stack.borrow().iter() {
            for (key, value) in map {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    })
}

/// Runs `f` with `tags` attached to every record logged on this thread.
pub fn with_log_tags<R>(tags: Map<String, Value>, f: impl FnOnce() -> R) -> R {
    let tags = stable_tags(tags);
    let pushed = !tags.is_empty();
    if pushed {
        TAG_STACK.with(|stack| stack.borrow_mut().push(tags));
    }
    let result = f();
    if pushed {
        TAG_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
    result
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::Error => "error",
        Level::Warn => "warn",
        Level::Info => "info",
        Level::Debug => "debug",
        Level::Trace => "trace",
    }
}

pub fn parse_level(raw: &str) -> Result<LevelFilter> {
    let normalized = raw.trim().to_ascii_lowercase();
    if !ALLOWED_LEVELS.contains(&normalized.as_str()) {
        return Err(anyhow!("unsupported log level: {raw}"));
    }
    normalized
        .parse::<LevelFilter>()
        .map_err(|err| anyhow!("unsupported log level {raw}: {err}"))
}

/// One JSON object per record: level, message, target, timestamp and any scope tags.
pub fn log_entry(record: &Record<'_>) -> Map<String, Value> {
    let mut entry = Map::new();
    entry.insert(
        "level".to_string(),
        Value::String(level_name(record.level()).to_string()),
    );
    entry.insert(
        "message".to_string(),
        Value::String(record.args().to_string()),
    );
    entry.insert(
        "target".to_string(),
        Value::String(record.target().to_string()),
    );
    let tags = scope_tags();
    if !tags.is_empty() {
        entry.insert("tags".to_string(), Value::Object(tags));
    }
    entry.insert("timestamp".to_string(), Value::String(current_timestamp()));
    entry
}

fn write_entry(entry: &Map<String, Value>) {
    if let Ok(serialized) = serde_json::to_string(entry) {
        let is_error = entry.get("level").and_then(Value::as_str) == Some("error");
        if is_error {
            let _ = writeln!(stderr(), "{}", serialized);
        } else {
            let _ = writeln!(stdout(), "{}", serialized);
        }
    }
}

/// Records captured by a [`JsonLogger`] instead of being written out.
#[derive(Clone, Default)]
pub struct LogSink {
    entries: Arc<Mutex<Vec<Map<String, Value>>>>,
}

impl LogSink {
    pub fn entries(&self) -> Vec<Map<String, Value>> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, entry: Map<String, Value>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}

pub struct JsonLogger {
    level: LevelFilter,
    sink: Option<LogSink>,
}

impl JsonLogger {
    pub fn new(level: LevelFilter) -> Self {
        Self { level, sink: None }
    }

    pub fn capturing(level: LevelFilter) -> (Self, LogSink) {
        let sink = LogSink::default();
        (
            Self {
                level,
                sink: Some(sink.clone()),
            },
            sink,
        )
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

impl Log for JsonLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = log_entry(record);
        match &self.sink {
            Some(sink) => sink.push(entry),
            None => write_entry(&entry),
        }
    }

    fn flush(&self) {
        let _ = stdout().flush();
        let _ = stderr().flush();
    }
}

/// Installs the JSON logger. `SLOTFILL_LOG` wins over `level`; the default is `info`.
/// A second call keeps the first logger.
pub fn init_logging(level: Option<&str>) -> Result<LevelFilter> {
    let from_env = std::env::var(LOG_ENV).ok().filter(|v| !v.trim().is_empty());
    let filter = match from_env.as_deref().or(level) {
        Some(raw) => parse_level(raw)?,
        None => LevelFilter::Info,
    };
    if log::set_boxed_logger(Box::new(JsonLogger::new(filter))).is_ok() {
        log::set_max_level(filter);
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_with(logger: &JsonLogger, level: Level, message: &str) {
        logger.log(
            &Record::builder()
                .level(level)
                .target("slotfill::test")
                .args(format_args!("{message}"))
                .build(),
        );
    }

    #[test]
    fn entries_carry_level_message_and_timestamp() {
        let (logger, sink) = JsonLogger::capturing(LevelFilter::Info);
        record_with(&logger, Level::Warn, "slot 1 unresolved");
        record_with(&logger, Level::Debug, "hidden");

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["level"], json!("warn"));
        assert_eq!(entries[0]["message"], json!("slot 1 unresolved"));
        assert_eq!(entries[0]["target"], json!("slotfill::test"));
        let timestamp = entries[0]["timestamp"].as_str().unwrap();
        assert!(humantime::parse_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn scope_tags_nest_and_unwind() {
        let (logger, sink) = JsonLogger::capturing(LevelFilter::Trace);
        let outer = json!({ "flow": "duo", "nested": { "x": 1 } });
        let Value::Object(outer) = outer else { unreachable!() };
        with_log_tags(outer, || {
            let Value::Object(inner) = json!({ "slot": 2 }) else { unreachable!() };
            with_log_tags(inner, || record_with(&logger, Level::Info, "inner"));
            record_with(&logger, Level::Info, "outer");
        });
        record_with(&logger, Level::Info, "bare");

        let entries = sink.entries();
        assert_eq!(entries[0]["tags"], json!({ "flow": "duo", "slot": 2 }));
        assert_eq!(entries[1]["tags"], json!({ "flow": "duo" }));
        assert!(entries[2].get("tags").is_none());
    }

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("DEBUG").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level(" off ").unwrap(), LevelFilter::Off);
        assert!(parse_level("fatal").is_err());
    }

    #[test]
    fn init_logging_installs_the_first_logger_only() {
        if std::env::var(LOG_ENV).is_ok() {
            return;
        }
        assert_eq!(init_logging(Some("debug")).unwrap(), LevelFilter::Debug);
        assert_eq!(log::max_level(), LevelFilter::Debug);
        assert_eq!(init_logging(Some("warn")).unwrap(), LevelFilter::Warn);
        assert_eq!(log::max_level(), LevelFilter::Debug);
        assert!(init_logging(Some("fatal")).is_err());
    }
}
