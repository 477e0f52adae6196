use colored::{Color, Colorize};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::{self, Write};
use std::sync::Mutex;

struct LoggerState {
    level: LevelFilter,
    /// Until the configured level is known, records are held back
    deferring: bool,
    deferred: Vec<(Level, String)>,
}

/// Colored stderr logger. Messages logged before the config has been
/// resolved are held until `print_deferred`, then filtered by the final level.
pub struct PrefixboxLogger {
    state: Mutex<LoggerState>,
    output: Mutex<Box<dyn Write + Send>>,
}

fn level_color(level: Level) -> Color {
    match level {
        Level::Error => Color::Red,
        Level::Warn => Color::Yellow,
        Level::Info => Color::White,
        Level::Debug => Color::Blue,
        Level::Trace => Color::BrightBlack,
    }
}

pub fn format_record(level: Level, target: &str, message: &str) -> String {
    let target = target.strip_prefix("prefixbox::").unwrap_or(target);
    let color = level_color(level);
    format!(
        "[{}] {}: {}",
        format!("{:<5}", level).color(color),
        target,
        message
    )
    .color(color)
    .to_string()
}

impl PrefixboxLogger {
    pub fn new(level: LevelFilter) -> &'static Self {
        Self::with_output(level, Box::new(io::stderr()))
    }

    pub fn with_output(
        level: LevelFilter,
        output: Box<dyn Write + Send>,
    ) -> &'static Self {
        Box::leak(Box::new(Self {
            state: Mutex::new(LoggerState {
                level,
                deferring: true,
                deferred: Vec::new(),
            }),
            output: Mutex::new(output),
        }))
    }

    pub fn init(&'static self) -> Result<&'static Self, log::SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(LevelFilter::Trace);
        Ok(self)
    }

    pub fn set_level(&self, level: LevelFilter) {
        self.state.lock().expect("Failed to lock logger state").level = level;
    }

    pub fn print_deferred(&self) {
        let (level, deferred) = {
            let mut state = self.state.lock().expect("Failed to lock logger state");
            state.deferring = false;
            (state.level, std::mem::take(&mut state.deferred))
        };
        let mut output = self.output.lock().expect("Failed to lock output");
        for (_, line) in deferred.iter().filter(|(l, _)| *l <= level) {
            let _ = writeln!(output, "{}", line);
        }
    }
}

impl Log for PrefixboxLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.state.lock().expect("Failed to lock logger state").level
    }

    fn log(&self, record: &Record) {
        let line = format_record(
            record.level(),
            record.target(),
            &record.args().to_string(),
        );
        {
            let mut state = self.state.lock().expect("Failed to lock logger state");
            if state.deferring {
                state.deferred.push((record.level(), line));
                return;
            }
            if record.level() > state.level {
                return;
            }
        }
        let _ = writeln!(self.output.lock().expect("Failed to lock output"), "{}", line);
    }

    fn flush(&self) {
        let _ = self.output.lock().expect("Failed to lock output").flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    fn log(logger: &PrefixboxLogger, level: Level, message: &str) {
        logger.log(
            &Record::builder()
                .level(level)
                .target("prefixbox::environment::create")
                .args(format_args!("{}", message))
                .build(),
        );
    }

    #[test]
    fn test_deferred_until_level_known() {
        colored::control::set_override(false);
        let capture = Capture::default();
        let logger =
            PrefixboxLogger::with_output(LevelFilter::Trace, Box::new(capture.clone()));

        log(logger, Level::Trace, "loading config");
        log(logger, Level::Warn, "odd config");
        assert_eq!(capture.text(), "");

        logger.set_level(LevelFilter::Info);
        logger.print_deferred();
        assert_eq!(capture.text(), "[WARN ] environment::create: odd config\n");

        log(logger, Level::Debug, "hidden");
        log(logger, Level::Info, "shown");
        assert!(capture.text().ends_with("[INFO ] environment::create: shown\n"));
        assert!(!capture.text().contains("hidden"));
    }
}
