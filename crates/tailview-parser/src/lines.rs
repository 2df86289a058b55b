use std::path::Path;

use serde_json::Value;

use crate::schema::LogEntry;

/// One diagnostic for a line that failed to parse.
///
/// `message` is prefixed `<path>:<line>:` so it can be forwarded to
/// subscribers verbatim.
#[derive(Debug, Clone)]
pub struct LineError {
    pub line_number: usize,
    pub message: String,
}

/// Parse a batch of raw transcript lines into records.
///
/// Never fails as a whole: malformed JSON and schema violations are captured
/// per line while the surrounding lines continue to parse. Blank lines are
/// skipped silently but still advance the absolute line numbering, which
/// starts at `start_line` for the first element of `lines`.
pub fn parse_lines(
    lines: &[String],
    file_path: &Path,
    start_line: usize,
) -> (Vec<LogEntry>, Vec<LineError>) {
    let mut entries = Vec::new();
    let mut errors = Vec::new();

    for (offset, line) in lines.iter().enumerate() {
        let line_number = start_line + offset;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        // Two stages so malformed JSON and invalid records report distinctly
        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(err) => {
                errors.push(LineError {
                    line_number,
                    message: format!(
                        "{}:{}: JSON parse failed: {}",
                        file_path.display(),
                        line_number,
                        err
                    ),
                });
                continue;
            }
        };

        let entry: LogEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(err) => {
                errors.push(LineError {
                    line_number,
                    message: format!(
                        "{}:{}: Schema validation failed: {}",
                        file_path.display(),
                        line_number,
                        err
                    ),
                });
                continue;
            }
        };

        if let Err(violation) = entry.validate() {
            errors.push(LineError {
                line_number,
                message: format!(
                    "{}:{}: Schema validation failed: {}",
                    file_path.display(),
                    line_number,
                    violation
                ),
            });
            continue;
        }

        entries.push(entry);
    }

    (entries, errors)
}
