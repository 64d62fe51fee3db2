//! Log plumbing: where formatted records go, and how client strings are made safe to print.
//!
//! Names arrive straight from game clients and may contain newlines, colour codes or
//! terminal escapes. [`escape_log`] keeps every record on one line.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::LoggingConfig;

/// Log target for bans, permission refusals and owner promotions.
pub const SECURITY_TARGET: &str = "security";

/// Longest client string echoed into a log line before it is cut with an ellipsis.
const MAX_PREVIEW: usize = 80;

/// Display adapter returned by [`escape_log`]. Escaping happens while formatting.
#[derive(Debug, Clone, Copy)]
pub struct Escaped<'a>(&'a str);

/// Wrap a client-supplied string for interpolation into a log record.
pub fn escape_log(s: &str) -> Escaped<'_> {
    Escaped(s)
}

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = self.0.chars();
        for ch in chars.by_ref().take(MAX_PREVIEW) {
            match ch {
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\r' => f.write_str("\\r")?,
                '\t' => f.write_str("\\t")?,
                c if c.is_control() => write!(f, "\\u{{{:x}}}", c as u32)?,
                c => write!(f, "{}", c)?,
            }
        }
        if chars.next().is_some() {
            f.write_str("…")?;
        }
        Ok(())
    }
}

/// Files a formatted record is appended to besides the console.
///
/// The security log is independent of the main log: it receives security-target
/// records whether or not a main log file is configured or could be opened.
#[derive(Debug, Default)]
pub struct LogSinks {
    main: Option<Mutex<File>>,
    security: Option<PathBuf>,
}

impl LogSinks {
    pub fn from_config(logging: &LoggingConfig) -> Self {
        let main = logging
            .file
            .as_ref()
            .and_then(|path| OpenOptions::new().create(true).append(true).open(path).ok())
            .map(Mutex::new);
        Self {
            main,
            security: logging.security_file.as_ref().map(PathBuf::from),
        }
    }

    pub fn has_main_file(&self) -> bool {
        self.main.is_some()
    }

    /// Append one finished line to every file that wants a record from `target`.
    pub fn record(&self, target: &str, line: &str) {
        if let Some(main) = &self.main {
            if let Ok(mut file) = main.lock() {
                let _ = writeln!(file, "{}", line);
            }
        }
        if target == SECURITY_TARGET {
            if let Some(path) = &self.security {
                // Opened per record so external rotation is picked up
                if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                    let _ = writeln!(file, "{}", line);
                }
            }
        }
    }
}
