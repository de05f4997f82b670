//! Parsing Traceur diagnostics out of its stderr stream.
//!
//! Traceur reports syntax errors on stderr as lines shaped like
//! `[Error: <path>:<line>:<column>: <message>`. The first non-blank line is
//! turned into a structured [`WatchingError`]; anything unrecognized is
//! surfaced verbatim so no output is lost.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use esdown_watch::WatchingError;

/// Title carried by every compilation diagnostic.
pub const COMPILATION_ERROR_TITLE: &str = "EcmaScript 6 Compilation Error";

/// The shape of a Traceur error line. The path it reports is ignored in
/// favor of the source file we asked it to compile.
const ERROR_LINE_PATTERN: &str = r"^\[Error: (.*):([0-9]*):([0-9]*):(.*)$";

fn error_line() -> &'static Regex {
    static ERROR_LINE: OnceLock<Regex> = OnceLock::new();
    ERROR_LINE.get_or_init(|| Regex::new(ERROR_LINE_PATTERN).expect("Invalid regex pattern"))
}

/// Parse compiler stderr into a diagnostic for `source`.
///
/// The first non-blank line is matched against the Traceur error shape; on a
/// match the line, column, and message are extracted. A line of any other
/// shape becomes the message as-is, and empty output falls back to a generic
/// message, so a failed compile always yields something readable.
#[must_use]
pub fn parse(stderr: &str, source: &Path) -> WatchingError {
    let Some(line) = stderr.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return WatchingError::new(
            COMPILATION_ERROR_TITLE,
            format!("error while compiling {}", source.display()),
        )
        .with_file(source);
    };

    if let Some(captures) = error_line().captures(line) {
        let position = captures[2]
            .parse::<u32>()
            .ok()
            .zip(captures[3].parse::<u32>().ok());
        if let Some((line_number, column)) = position {
            return WatchingError::new(COMPILATION_ERROR_TITLE, captures[4].trim())
                .with_file(source)
                .at_position(line_number, column);
        }
    }

    WatchingError::new(COMPILATION_ERROR_TITLE, line).with_file(source)
}
