/// Job file interchange format
///
/// One batch per row: `scene_path, mode, unit_ref, unit_ref, ...`. No header row.
/// Fields are trimmed and may be double-quoted when they contain commas.
use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::Path;

use super::{Batch, CacheUnitRef, ExecutionMode, JobDescriptor};
use crate::error::RowError;

/// A row that was skipped, with its 1-based line number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    pub line: usize,
    pub error: RowError,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.error)
    }
}

/// Result of parsing a job file
///
/// `warnings` are rows too short to describe a batch; `rejected` are rows that
/// looked like batches but could not be accepted (bad mode, broken quoting).
/// Neither stops the rest of the file from being read.
#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub job: JobDescriptor,
    pub warnings: Vec<RowIssue>,
    pub rejected: Vec<RowIssue>,
}

impl ParseReport {
    pub fn has_rejections(&self) -> bool {
        !self.rejected.is_empty()
    }
}

/// Parse job file contents
pub fn parse(input: &str) -> ParseReport {
    let mut report = ParseReport::default();
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);

    for (idx, raw_line) in input.lines().enumerate() {
        let line = idx + 1;
        if raw_line.trim().is_empty() {
            continue;
        }

        let mut fields = match split_fields(raw_line) {
            Ok(fields) => fields,
            Err(error) => {
                report.rejected.push(RowIssue { line, error });
                continue;
            }
        };

        while fields.last().is_some_and(|f| f.is_empty()) {
            fields.pop();
        }

        if fields.len() < 3 || fields[0].is_empty() {
            report.warnings.push(RowIssue {
                line,
                error: RowError::MalformedRow {
                    fields: fields.len(),
                },
            });
            continue;
        }

        let mode = match fields[1].parse::<ExecutionMode>() {
            Ok(mode) => mode,
            Err(error) => {
                report.rejected.push(RowIssue { line, error });
                continue;
            }
        };

        let units = fields[2..]
            .iter()
            .filter(|f| !f.is_empty())
            .map(|f| CacheUnitRef::new(f.as_str()))
            .collect();

        report.job.push_batch(&fields[0], Batch::new(mode, units));
    }

    report
}

/// Serialize a job, merging batches that share `(scene, mode)`
///
/// Rows come out in first-seen order of their `(scene, mode)` pair. Unit refs of
/// merged batches are concatenated in first-seen order without duplicates.
pub fn serialize(job: &JobDescriptor) -> String {
    let mut rows: Vec<(&str, ExecutionMode, Vec<&CacheUnitRef>)> = Vec::new();

    for scene in job.scenes() {
        for batch in &scene.batches {
            let idx = match rows
                .iter()
                .position(|(s, m, _)| *s == scene.scene_path && *m == batch.mode)
            {
                Some(idx) => idx,
                None => {
                    rows.push((scene.scene_path.as_str(), batch.mode, Vec::new()));
                    rows.len() - 1
                }
            };

            let units = &mut rows[idx].2;
            for unit in &batch.units {
                if !units.contains(&unit) {
                    units.push(unit);
                }
            }
        }
    }

    let mut out = String::new();
    for (scene, mode, units) in rows {
        let mut fields = vec![quote_field(scene), mode.as_str().to_string()];
        fields.extend(units.iter().map(|u| quote_field(u.as_str())));
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// Read and parse a job file from disk
pub fn load_job_file(path: &Path) -> Result<ParseReport> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file: {}", path.display()))?;
    Ok(parse(&content))
}

fn split_fields(line: &str) -> Result<Vec<String>, RowError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if !quoted && field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                quoted = true;
            }
            ',' => {
                fields.push(finish_field(&field, quoted));
                field.clear();
                quoted = false;
            }
            // whitespace after a closing quote is not part of the value
            c if quoted && c.is_whitespace() => {}
            c => field.push(c),
        }
    }

    if in_quotes {
        return Err(RowError::UnterminatedQuote);
    }

    fields.push(finish_field(&field, quoted));
    Ok(fields)
}

fn finish_field(field: &str, quoted: bool) -> String {
    if quoted {
        field.to_string()
    } else {
        field.trim().to_string()
    }
}

fn quote_field(value: &str) -> String {
    let needs_quotes = value.contains(',')
        || value.contains('"')
        || value.trim() != value
        || value.is_empty();

    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
