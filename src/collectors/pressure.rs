use crate::error::PsiError;
use crate::models::pressure::{PressureRecord, Scope};
use log::warn;

/// Parse one report line: `"<scope> avg10=<f> avg60=<f> avg300=<f> total=<u>"`.
///
/// Anything other than a literal `some` in the first field is read as `full`,
/// and unparsable numbers become zero. Only a short line is an error.
pub fn parse_line(line: &str) -> Result<PressureRecord, PsiError> {
    let fields: Vec<&str> = line.split(' ').collect();
    if fields.len() < 5 {
        return Err(PsiError::Format { line: line.to_string() });
    }

    let scope = if fields[0] == "some" { Scope::Some } else { Scope::Full };

    Ok(PressureRecord {
        scope,
        avg10:  value(fields[1]).parse().unwrap_or(0.0),
        avg60:  value(fields[2]).parse().unwrap_or(0.0),
        avg300: value(fields[3]).parse().unwrap_or(0.0),
        total:  value(fields[4]).parse().unwrap_or(0),
    })
}

/// Parse every non-empty line of a report, in file order. The first bad
/// line aborts the whole report.
pub fn parse_report(text: &str) -> Result<Vec<PressureRecord>, PsiError> {
    text.split('\n')
        .filter(|line| !line.is_empty())
        .map(parse_line)
        .collect()
}

/// Like [`parse_report`], but malformed lines are logged and skipped.
pub fn parse_report_lenient(text: &str) -> Vec<PressureRecord> {
    text.split('\n')
        .filter(|line| !line.is_empty())
        .filter_map(|line| match parse_line(line) {
            Ok(rec) => Some(rec),
            Err(e)  => {
                warn!("skipping pressure line: {}", e);
                None
            }
        })
        .collect()
}

// "avg10=1.25" -> "1.25"; a field without '=' yields "" and parses as zero.
fn value(field: &str) -> &str {
    field.split_once('=').map(|(_, v)| v).unwrap_or("")
}
