use std::io::Write;

use env_logger::fmt::{Color, Formatter};
use env_logger::{Builder, Env};
use log::{Level, LevelFilter, Record};

/// Process-wide logger of the server: coloured levels, local timestamps,
/// and the emitting source location on error records.
#[derive(Debug)]
pub struct Logger;

impl Logger {
    /// Install the global logger at the level matching `verbosity` counts
    /// of `-v`. The `SNVNET_LOG` environment variable takes precedence.
    pub fn init(verbosity: u8) {
        Builder::new()
            .filter_level(verbosity_filter(verbosity))
            .format(write_record)
            .parse_env(Env::default().filter("SNVNET_LOG"))
            .try_init()
            .expect("Failed to install the global logger");
    }

    /// Raise or lower the global maximum after installation.
    pub fn set_level(verbosity: u8) {
        log::set_max_level(verbosity_filter(verbosity));
    }
}

fn verbosity_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn level_color(level: Level) -> Color {
    match level {
        Level::Error => Color::Red,
        Level::Warn  => Color::Yellow,
        Level::Info  => Color::Green,
        Level::Debug => Color::Blue,
        Level::Trace => Color::Cyan,
    }
}

fn write_record(buf: &mut Formatter, record: &Record) -> std::io::Result<()> {
    let mut level_style = buf.style();
    level_style.set_color(level_color(record.level())).set_bold(true);

    let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S");
    let header = format!(
        "[{timestamp} {: <5} {}]",
        level_style.value(record.level()),
        record.target(),
    );

    // Errors point back at their source line.
    if record.level() == Level::Error {
        writeln!(
            buf,
            "{header} (@ {}:{}) {}",
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args(),
        )
    } else {
        writeln!(buf, "{header} {}", record.args())
    }
}
