use std::io::Write;

use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};

/// Install the global logger. `RUST_LOG`, when set, wins over `-v`.
pub fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Info,  // default: info and up
        1 => LevelFilter::Debug, // -v: debug and up
        _ => LevelFilter::Trace, // -vv: trace and up
    };

    let mut builder = Builder::new();
    builder.filter_level(level);

    // HTTP internals are noisy below warn unless tracing everything.
    if verbosity < 2 {
        for noisy in ["hyper", "hyper_util", "reqwest", "tower_http"] {
            builder.filter_module(noisy, LevelFilter::Warn);
        }
    }

    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    builder.format(|buf, record| {
        let level = record.level();

        let level_label = match level {
            Level::Error => "ERROR".red().bold(),
            Level::Warn  => "WARN ".yellow().bold(),
            Level::Info  => "INFO ".white().bold(),
            Level::Debug => "DEBUG".bright_black(),
            Level::Trace => "TRACE".bright_black(),
        };

        writeln!(
            buf,
            "{} {} {}",
            buf.timestamp_seconds().to_string().bright_black(),
            level_label,
            record.args()
        )
    });

    // Tests may install their own logger first.
    let _ = builder.try_init();
}
