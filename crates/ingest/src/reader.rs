//! Delimited-text reader with the header/row conventions spreadsheet
//! exports are written against: the first non-blank record is the header,
//! blank header cells are named `Unnamed: i`, duplicate names get `.1`,
//! `.2` suffixes, short rows are padded, and over-wide rows are either an
//! error or dropped.

use std::collections::HashSet;

use insights_core::Frame;

/// What to do with a row that has more cells than the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadLines {
    Error,
    Skip,
}

#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub delimiter: u8,
    pub bad_lines: BadLines,
    /// Raw lines discarded before looking for the header.
    pub skip_rows: usize,
    pub escape: Option<u8>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            bad_lines: BadLines::Error,
            skip_rows: 0,
            escape: None,
        }
    }
}

impl ReadOptions {
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn skip_bad_lines(mut self) -> Self {
        self.bad_lines = BadLines::Skip;
        self
    }

    pub fn skip_rows(mut self, rows: usize) -> Self {
        self.skip_rows = rows;
        self
    }

    pub fn escape(mut self, escape: u8) -> Self {
        self.escape = Some(escape);
        self
    }
}

/// A parsed table plus the number of over-wide rows dropped in skip mode.
#[derive(Debug, Clone)]
pub struct Table {
    pub frame: Frame,
    pub dropped_rows: usize,
}

pub fn read_table(text: &str, opts: &ReadOptions) -> Result<Table, String> {
    let body = skip_lines(text, opts.skip_rows);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(opts.delimiter)
        .escape(opts.escape)
        .from_reader(body.as_bytes());

    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    let mut dropped_rows = 0;

    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format!("Error tokenizing data: {e}"))?;
        if is_blank(&record) {
            continue;
        }

        let Some(columns) = header.as_ref() else {
            header = Some(header_names(&record));
            continue;
        };

        if record.len() > columns.len() {
            match opts.bad_lines {
                BadLines::Error => {
                    let line = record
                        .position()
                        .map(|p| p.line())
                        .unwrap_or(idx as u64 + 1);
                    return Err(format!(
                        "Expected {} fields in line {}, saw {}",
                        columns.len(),
                        line,
                        record.len()
                    ));
                }
                BadLines::Skip => {
                    dropped_rows += 1;
                    continue;
                }
            }
        }

        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let columns = header.ok_or_else(|| "No columns to parse from file".to_string())?;
    Ok(Table {
        frame: Frame::new(columns, rows),
        dropped_rows,
    })
}

fn skip_lines(text: &str, n: usize) -> &str {
    let mut rest = text;
    for _ in 0..n {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.len() == 0 || (record.len() == 1 && record[0].trim().is_empty())
}

fn header_names(record: &csv::StringRecord) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(record.len());
    for (i, cell) in record.iter().enumerate() {
        let cell = cell.trim_start_matches('\u{FEFF}').trim();
        let base = if cell.is_empty() {
            format!("Unnamed: {i}")
        } else {
            cell.to_string()
        };
        let mut name = base.clone();
        let mut suffix = 1;
        while seen.contains(&name) {
            name = format!("{base}.{suffix}");
            suffix += 1;
        }
        seen.insert(name.clone());
        names.push(name);
    }
    names
}
