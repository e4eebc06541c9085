use crate::config::AppConfig;
use std::fs::OpenOptions;
use std::io;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install the global subscriber once: JSON lines to `--trace-log` when set,
/// otherwise human-readable lines on stderr. `--no-logs` installs nothing.
pub fn init_tracing(config: &AppConfig) {
    if config.no_logs {
        return;
    }
    let level = LevelFilter::from_str(&config.log_level).unwrap_or(LevelFilter::INFO);

    let _ = TRACING_INIT.get_or_init(|| {
        if let Some(path) = &config.trace_log {
            let file = match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => file,
                Err(err) => {
                    eprintln!("voxrelay: cannot open trace log {}: {err}", path.display());
                    return;
                }
            };
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_max_level(level)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(file)
                .with_current_span(false)
                .with_span_list(false)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        } else {
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(level)
                .with_timer(UtcTime::rfc_3339())
                .with_thread_names(true)
                .with_writer(io::stderr)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    });
}
