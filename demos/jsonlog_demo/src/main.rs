//! Writes a handful of records, archives the log file and reads it back.
//!
//! Usage: `jsonlog_demo [LOG_DIRECTORY]`. Set `RUST_LOG` to see the diagnostics of `jsonlog`
//! itself, e.g. `RUST_LOG=jsonlog=debug`.

use std::{env, path::PathBuf, sync::Arc, time::Duration};

use jsonlog::{
    Field, JsonLogLayer, Logger, LoggerConfig, LoggerError, RecordFilter, filter_by_level,
    filter_by_time_range, read_all, read_filtered,
};
use time::OffsetDateTime;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[allow(clippy::print_stdout)]
fn main() -> Result<(), LoggerError> {
    let directory = env::args_os()
        .nth(1)
        .map_or_else(|| env::temp_dir().join("jsonlog_demo"), PathBuf::from);

    // Record timestamps are truncated to milliseconds.
    let started_at = OffsetDateTime::now_utc() - time::Duration::seconds(1);
    let logger = Arc::new(Logger::new(LoggerConfig {
        enable_console_output: true,
        ..LoggerConfig::new(&directory)
    })?);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env()))
        .with(JsonLogLayer::new(Arc::clone(&logger)))
        .init();

    logger.info("User login", &[Field::string("user_id", "user123")])?;
    logger.warn("Disk usage high", &[Field::uint("percent", 91_u64)])?;
    logger.error(
        "Database connection failed",
        &[
            Field::string("host", "localhost"),
            Field::duration("timeout", Duration::from_secs(5)),
        ],
    )?;
    logger.log_with_level("DEBUG", "Cache warmed", &[Field::int("entries", 1024)])?;
    tracing::error!(target: "checkout", order_id = 42, "Payment declined");

    logger.close()?;
    let archive = logger.compress_log_file()?;
    println!("Archived {} to {}", logger.path().display(), archive.display());

    let records = read_all(&archive)?;
    println!("Read {} records", records.len());

    let errors = read_filtered(&archive, filter_by_level("error"))?;
    for record in &errors {
        println!(
            "error at {}: {}",
            record.timestamp().unwrap_or("?"),
            record.message().unwrap_or_default()
        );
    }

    let window = filter_by_time_range(started_at, OffsetDateTime::now_utc());
    let recent_non_errors = read_filtered(&archive, window.and(filter_by_level("error").not()))?;
    println!("{} non-error records in this run", recent_non_errors.len());

    Ok(())
}
