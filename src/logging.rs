// logging.rs - tracing subscriber setup and log callbacks.
//
// Two layers on one registry:
//   fmt layer      -> log file, filtered by `log_level` (or UNREAL_HOOK_LOG directives)
//   CallbackLayer  -> every registered callback, filtered by `console_level`, which can be
//                     changed later through `set_console_level`
//
// Callbacks get a `LogMessage` per event. An event logged from inside a callback is written
// to the file but not fed back to the callbacks.

use crate::config::Config;
use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use std::cell::Cell;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::{Filtered, LevelFilter};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Layer};

/// Crate version, logged once at init.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Full `EnvFilter` directives for the log file, overriding `log_level`.
const ENV_FILTER: &str = "UNREAL_HOOK_LOG";

// ============================================================
// Levels
// ============================================================

/// Log levels, least verbose first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    /// Diagnostics for people working on the hook itself
    DevWarning,
    Misc,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Info,
        LogLevel::DevWarning,
        LogLevel::Misc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::DevWarning => "dev_warning",
            LogLevel::Misc => "misc",
        }
    }

    pub fn as_tracing(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warning => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::DevWarning => Level::DEBUG,
            LogLevel::Misc => Level::TRACE,
        }
    }

    pub fn level_filter(self) -> LevelFilter {
        LevelFilter::from_level(self.as_tracing())
    }
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warning,
            Level::INFO => LogLevel::Info,
            Level::DEBUG => LogLevel::DevWarning,
            _ => LogLevel::Misc,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    /// Level names, any case. The tracing names work too.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "dev_warning" | "debug" => Ok(LogLevel::DevWarning),
            "misc" | "trace" => Ok(LogLevel::Misc),
            _ => Err(format!(
                "unknown log level {s:?}, expected one of error, warning, info, dev_warning, misc"
            )),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        s.parse()
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================
// Callbacks
// ============================================================

/// One log event as handed to callbacks.
#[derive(Debug, Clone)]
pub struct LogMessage {
    pub level: LogLevel,
    /// The formatted message, followed by any structured fields as `name=value`
    pub msg: String,
    pub target: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub time: SystemTime,
}

type LogCallback = Arc<dyn Fn(&LogMessage) + Send + Sync>;

static CALLBACKS: RwLock<Vec<(u64, LogCallback)>> = RwLock::new(Vec::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Register a callback for every event at or above the console level. Returns its id.
pub fn add_callback(callback: impl Fn(&LogMessage) + Send + Sync + 'static) -> u64 {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    CALLBACKS
        .write()
        .unwrap_or_else(|p| p.into_inner())
        .push((id, Arc::new(callback)));
    id
}

/// Unregister a callback. False if the id isn't registered.
pub fn remove_callback(id: u64) -> bool {
    let mut callbacks = CALLBACKS.write().unwrap_or_else(|p| p.into_inner());
    let before = callbacks.len();
    callbacks.retain(|(i, _)| *i != id);
    callbacks.len() != before
}

/// Clears the re-entrancy flag even if a callback panics.
struct Dispatching;

impl Drop for Dispatching {
    fn drop(&mut self) {
        DISPATCHING.with(|d| d.set(false));
    }
}

fn dispatch(message: &LogMessage) {
    let snapshot: Vec<LogCallback> = CALLBACKS
        .read()
        .unwrap_or_else(|p| p.into_inner())
        .iter()
        .map(|(_, cb)| cb.clone())
        .collect();
    if snapshot.is_empty() {
        return;
    }

    DISPATCHING.with(|d| d.set(true));
    let _reset = Dispatching;
    for callback in snapshot {
        callback(message);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(mut self) -> String {
        if !self.fields.is_empty() {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message.push_str(&self.fields);
        }
        self.message
    }

    fn field(&mut self) -> &mut String {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        &mut self.fields
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.field(), "{}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.field(), "{}={:?}", field.name(), value);
        }
    }
}

/// Feeds events to the registered callbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackLayer;

impl<S: Subscriber> Layer<S> for CallbackLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if DISPATCHING.with(Cell::get) {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let meta = event.metadata();
        dispatch(&LogMessage {
            level: LogLevel::from(*meta.level()),
            msg: visitor.finish(),
            target: meta.target().to_string(),
            file: meta.file().map(str::to_string),
            line: meta.line(),
            time: SystemTime::now(),
        });
    }
}

type SetLevel = dyn Fn(LevelFilter) -> std::result::Result<(), reload::Error> + Send + Sync;

/// Moves the callback layer's level after the subscriber is built.
#[derive(Clone)]
pub struct ConsoleLevelHandle(Arc<SetLevel>);

impl ConsoleLevelHandle {
    pub fn set(&self, level: LogLevel) -> Result<()> {
        (self.0)(level.level_filter())
            .map_err(|e| Error::Config(format!("console level: {e}")))
    }
}

impl std::fmt::Debug for ConsoleLevelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConsoleLevelHandle")
    }
}

/// `CallbackLayer` behind a level filter that can be changed at runtime.
pub fn callback_layer<S>(
    level: LogLevel,
) -> (
    Filtered<CallbackLayer, reload::Layer<LevelFilter, S>, S>,
    ConsoleLevelHandle,
)
where
    S: Subscriber + 'static,
{
    let (filter, handle) = reload::Layer::new(level.level_filter());
    let set = move |filter: LevelFilter| handle.reload(filter);
    (CallbackLayer.with_filter(filter), ConsoleLevelHandle(Arc::new(set)))
}

// ============================================================
// Subscriber
// ============================================================

static LOG_FILE: OnceCell<PathBuf> = OnceCell::new();
static CONSOLE_LEVEL: OnceCell<ConsoleLevelHandle> = OnceCell::new();

/// Change the minimum level forwarded to log callbacks and the in-game console.
pub fn set_console_level(level: LogLevel) -> Result<()> {
    let handle = CONSOLE_LEVEL.get().ok_or(Error::NotInitialized)?;
    handle.set(level)?;
    tracing::info!("console level is now {}", level);
    Ok(())
}

/// Install the global subscriber. Only the first call does anything; it returns true.
pub fn init(config: &Config) -> Result<bool> {
    let mut installed = false;
    LOG_FILE.get_or_try_init(|| {
        installed = true;
        install(config)
    })?;
    Ok(installed)
}

/// The log file in use, once `init` has run.
pub fn log_file() -> Option<&'static Path> {
    LOG_FILE.get().map(PathBuf::as_path)
}

fn install(config: &Config) -> Result<PathBuf> {
    let path = config.log_path();
    let file = std::fs::File::create(&path)?;

    let file_filter = EnvFilter::try_from_env(ENV_FILTER).unwrap_or_else(|_| {
        EnvFilter::new(format!("unreal_hook={}", config.log_level.level_filter()).to_lowercase())
    });
    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_ids(true)
        .with_filter(file_filter);
    let (callback_layer, console_level) = callback_layer(config.console_level);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(callback_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging: {e}")))?;
    // Only the first install gets this far
    let _ = CONSOLE_LEVEL.set(console_level);

    tracing::info!(
        "unreal_hook {} logging to {} (file {}, console {})",
        VERSION,
        path.display(),
        config.log_level,
        config.console_level
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Callbacks are global, so each test only looks at messages carrying its own marker.
    fn collect(marker: &'static str) -> (u64, Arc<Mutex<Vec<LogMessage>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = add_callback(move |m| {
            if m.msg.contains(marker) {
                sink.lock().unwrap().push(m.clone());
            }
        });
        (id, seen)
    }

    fn with_callbacks(level: LogLevel, f: impl FnOnce()) {
        let subscriber =
            tracing_subscriber::registry().with(CallbackLayer.with_filter(level.level_filter()));
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn test_level_names() {
        for level in LogLevel::ALL {
            assert_eq!(level.as_str().parse::<LogLevel>().unwrap(), level);
            assert_eq!(LogLevel::from(level.as_tracing()), level);
        }
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!(" Dev_Warning ".parse::<LogLevel>().unwrap(), LogLevel::DevWarning);
        assert!("loud".parse::<LogLevel>().is_err());
        assert!(LogLevel::Error < LogLevel::Misc);
    }

    #[test]
    fn test_callback_receives_filtered_events() {
        let (id, seen) = collect("[filtered]");
        with_callbacks(LogLevel::Info, || {
            tracing::warn!(count = 3, "[filtered] low ammo");
            tracing::debug!("[filtered] too quiet");
        });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].level, LogLevel::Warning);
        assert_eq!(seen[0].msg, "[filtered] low ammo count=3");
        assert_eq!(seen[0].target, module_path!());
        assert!(seen[0].line.is_some());
        assert!(remove_callback(id));
        assert!(!remove_callback(id));
    }

    #[test]
    fn test_removed_callback_is_not_called() {
        let (id, seen) = collect("[removed]");
        with_callbacks(LogLevel::Misc, || {
            tracing::info!("[removed] one");
            remove_callback(id);
            tracing::info!("[removed] two");
        });
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_logging_from_callback_does_not_recurse() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = add_callback(move |m| {
            if m.msg.contains("[recurse]") {
                counter.fetch_add(1, Ordering::SeqCst);
                tracing::error!("[recurse] from inside a callback");
            }
        });
        with_callbacks(LogLevel::Misc, || tracing::info!("[recurse] outer"));
        remove_callback(id);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_console_level_changes_at_runtime() {
        let (id, seen) = collect("[reload]");
        let (layer, handle) = callback_layer(LogLevel::Warning);
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("[reload] dropped");
            handle.set(LogLevel::Info).unwrap();
            tracing::info!("[reload] kept");
            handle.set(LogLevel::Error).unwrap();
            tracing::warn!("[reload] dropped again");
        });
        remove_callback(id);

        let seen = seen.lock().unwrap();
        let messages: Vec<&str> = seen.iter().map(|m| m.msg.as_str()).collect();
        assert_eq!(messages, ["[reload] kept"]);
    }

    #[test]
    fn test_set_console_level_needs_logging() {
        // No test installs the global subscriber
        assert!(matches!(
            set_console_level(LogLevel::Misc),
            Err(Error::NotInitialized)
        ));
    }

    #[test]
    fn test_level_from_config_string() {
        assert_eq!(LogLevel::try_from("Misc".to_string()), Ok(LogLevel::Misc));
        assert!(LogLevel::try_from("chatty".to_string()).unwrap_err().contains("chatty"));
    }
}
