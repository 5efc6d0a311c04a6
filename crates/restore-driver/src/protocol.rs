//! Success-marker protocol of the restore tool.
//!
//! The tool reports nothing structured. A successful run prints, somewhere in
//! its combined output, a line such as
//!
//! ```text
//! Restore of catalog https://example.org/ermrest/catalog/42 completed successfully
//! ```
//!
//! The catalog identifier is the text between the last [`START_MARKER`] and
//! the [`SUCCESS_MARKER`] following it, trimmed, taking the final `/`
//! separated segment and parsing it as an integer.

use crate::error::RestoreError;

pub const START_MARKER: &str = "Restore of catalog";
pub const SUCCESS_MARKER: &str = "completed successfully";

/// Extract the restored catalog identifier from the tool's combined output.
pub fn parse_restored_catalog(output: &str) -> Result<i64, RestoreError> {
    if !output.contains(SUCCESS_MARKER) {
        return Err(RestoreError::Failed {
            output: output.to_string(),
        });
    }

    let parse_err = |reason: &str| RestoreError::Parse {
        reason: reason.to_string(),
        output: output.to_string(),
    };

    let start = output
        .rfind(START_MARKER)
        .ok_or_else(|| parse_err("missing restore marker"))?;
    let tail = &output[start + START_MARKER.len()..];
    let end = tail
        .find(SUCCESS_MARKER)
        .ok_or_else(|| parse_err("success marker precedes restore marker"))?;

    let link = tail[..end].trim();
    let segment = link.rsplit('/').next().unwrap_or(link).trim();
    segment
        .parse::<i64>()
        .map_err(|_| parse_err(&format!("catalog identifier '{segment}' is not an integer")))
}
