//! Tracing setup: console output plus a daily rolling JSON file.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::Config;

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` when set, else from `MELODIA_LOG`. The
/// returned guard flushes the file writer and must live until shutdown.
pub fn init(cfg: &Config) -> anyhow::Result<WorkerGuard> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: MELODIA_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                EnvFilter::new("info")
            }
        },
    };

    std::fs::create_dir_all(&cfg.log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&cfg.log_dir, "melodia.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console = fmt::layer().with_target(true).with_thread_ids(true);
    let console = if cfg.log_json {
        console.json().boxed()
    } else {
        console.boxed()
    };
    let file = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .try_init()?;

    Ok(guard)
}
