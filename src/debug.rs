use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// JSONL trace of one or more assembly runs: one object per event. Runs that
/// share the logger each get their own id and counters.
#[derive(Clone)]
pub struct DebugLogger {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    next_run: Arc<AtomicU64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            next_run: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Writes `{"type": kind, ...fields}`. Non-object `fields` are stored under `data`.
    pub fn event(&self, kind: &str, fields: Value) {
        self.write_record(kind, None, fields);
    }

    /// Starts a run whose events carry `"run": <id>` and whose counters are
    /// summarized on their own.
    pub fn begin_run(&self, context: &str) -> DebugRun {
        DebugRun {
            logger: self.clone(),
            id: self.next_run.fetch_add(1, Ordering::Relaxed),
            context: context.to_string(),
            counters: BTreeMap::new(),
        }
    }

    pub fn flush(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }

    fn write_record(&self, kind: &str, run: Option<u64>, fields: Value) {
        let mut record = Map::new();
        record.insert("type".to_string(), Value::String(kind.to_string()));
        if let Some(run) = run {
            record.insert("run".to_string(), json!(run));
        }
        match fields {
            Value::Object(map) => record.extend(map),
            Value::Null => {}
            other => {
                record.insert("data".to_string(), other);
            }
        }
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", Value::Object(record));
        }
    }
}

impl std::fmt::Debug for DebugLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugLogger").finish_non_exhaustive()
    }
}

/// Events and counters of a single run.
#[derive(Debug)]
pub struct DebugRun {
    logger: DebugLogger,
    id: u64,
    context: String,
    counters: BTreeMap<String, u64>,
}

impl DebugRun {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn event(&self, kind: &str, fields: Value) {
        self.logger.write_record(kind, Some(self.id), fields);
    }

    pub fn increment(&mut self, key: &str, amount: u64) {
        let entry = self.counters.entry(key.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Writes this run's counters as a `debug.summary` record and flushes.
    pub fn emit_summary(self) {
        self.logger.write_record(
            "debug.summary",
            Some(self.id),
            json!({
                "context": self.context,
                "counts": self.counters,
            }),
        );
        self.logger.flush();
    }
}
