use crate::config::{BridgeConfig, LogLevel};
use crate::utf8_safe::safe_prefix;
use std::fs::OpenOptions;
use std::io;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();
static LOG_CONTENT_ENABLED: AtomicBool = AtomicBool::new(false);

const CONTENT_PREVIEW_CHARS: usize = 80;

impl LogLevel {
    fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing(config: &BridgeConfig) {
    LOG_CONTENT_ENABLED.store(config.log_content && !config.no_logs, Ordering::Relaxed);
    if config.no_logs {
        return;
    }

    let _ = TRACING_INIT.get_or_init(|| {
        let level = config.log_level.filter();
        if let Some(path) = &config.log_file {
            let file = match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => file,
                Err(err) => {
                    eprintln!("scbridge: cannot open log file {}: {err}", path.display());
                    return;
                }
            };
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_max_level(level)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::sync::Mutex::new(file))
                .with_current_span(false)
                .with_span_list(false)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        } else {
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(level)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(io::stderr)
                .with_target(false)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    });
}

/// Whether user code may appear in logs.
pub fn content_logging_enabled() -> bool {
    LOG_CONTENT_ENABLED.load(Ordering::Relaxed)
}

/// Short preview of user content for debug logs, or a placeholder when
/// content logging is off.
pub fn content_preview(text: &str) -> String {
    if !content_logging_enabled() {
        return format!("<{} bytes>", text.len());
    }
    let preview = safe_prefix(text, CONTENT_PREVIEW_CHARS);
    if preview.len() < text.len() {
        format!("{preview}...")
    } else {
        preview.to_string()
    }
}

/// Log panics through tracing, omitting the payload unless content logging is on.
pub fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = if content_logging_enabled() {
            if let Some(text) = info.payload().downcast_ref::<&str>() {
                (*text).to_string()
            } else if let Some(text) = info.payload().downcast_ref::<String>() {
                text.clone()
            } else {
                "non-string panic payload".to_string()
            }
        } else {
            "panic payload omitted (log-content disabled)".to_string()
        };
        tracing::error!(%location, %payload, version = env!("CARGO_PKG_VERSION"), "panic");
        previous(info);
    }));
}

#[cfg(test)]
pub(crate) fn set_content_logging_for_tests(enabled: bool) {
    LOG_CONTENT_ENABLED.store(enabled, Ordering::Relaxed);
}
