//! Delimited table writer.
//!
//! Quoting is left to the csv writer: any field holding the delimiter, a
//! quote or a line break is quoted, so multi-line SQL reads back unchanged.

use crate::flatten::OutputRow;
use anyhow::{Context, Result};
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOptions {
    pub delimiter: u8,
    /// Truncate the Query column to this many characters. `None` keeps it whole.
    pub preview_len: Option<usize>,
    pub include_report_key: bool,
    pub include_component: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            delimiter: b'|',
            preview_len: None,
            include_report_key: false,
            include_component: false,
        }
    }
}

impl TableOptions {
    pub fn headers(&self) -> Vec<&'static str> {
        let mut headers = vec!["Category", "Report"];
        if self.include_report_key {
            headers.push("ReportKey");
        }
        headers.extend(["DataSource", "Connection", "DataSet", "CommandType", "Query"]);
        if self.include_component {
            headers.push("Component");
        }
        headers
    }
}

/// Display preview of `text`: at most `max_chars` characters, never split
/// inside a character.
pub fn preview(text: &str, max_chars: Option<usize>) -> &str {
    match max_chars.and_then(|max| text.char_indices().nth(max)) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

/// Write a header line and one record per row. Returns the number of rows.
pub fn write_table<W: Write>(writer: W, rows: &[OutputRow], options: &TableOptions) -> Result<usize> {
    let mut out = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(writer);

    out.write_record(options.headers())
        .context("Failed to write table header")?;

    for row in rows {
        let mut record: Vec<&str> = vec![row.category.as_str(), row.report.as_str()];
        if options.include_report_key {
            record.push(&row.report_key);
        }
        record.extend([
            row.data_source.as_str(),
            row.connection.as_str(),
            row.data_set.as_str(),
            row.command_type.as_str(),
            preview(&row.command_text, options.preview_len),
        ]);
        if options.include_component {
            record.push(row.component.as_deref().unwrap_or_default());
        }
        out.write_record(&record)
            .with_context(|| format!("Failed to write row for {}", row.report))?;
    }

    out.flush().context("Failed to flush table")?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(command_text: &str) -> OutputRow {
        OutputRow {
            category: "Finance".into(),
            report: "q1.rdl".into(),
            report_key: "q1".into(),
            data_source: "DS1".into(),
            connection: "Shared/External".into(),
            data_set: "Sales".into(),
            command_type: "Text".into(),
            command_text: command_text.into(),
            component: None,
        }
    }

    fn read_back(bytes: &[u8], delimiter: u8) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .from_reader(bytes);
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_multiline_sql_round_trip() {
        let sql = "SELECT a | b AS \"x\"\nFROM t\nWHERE c = 'y|z'";
        let mut buf = Vec::new();
        let written = write_table(&mut buf, &[row(sql)], &TableOptions::default()).unwrap();
        assert_eq!(written, 1);

        let records = read_back(&buf, b'|');
        assert_eq!(
            records[0],
            vec!["Category", "Report", "DataSource", "Connection", "DataSet", "CommandType", "Query"]
        );
        assert_eq!(records[1][6], sql);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_optional_columns() {
        let mut annotated = row("select 1");
        annotated.component = Some("Sort: Package\\Sort".into());
        let options = TableOptions {
            delimiter: b',',
            include_report_key: true,
            include_component: true,
            ..TableOptions::default()
        };
        let mut buf = Vec::new();
        write_table(&mut buf, &[annotated, row("select 2")], &options).unwrap();

        let records = read_back(&buf, b',');
        assert_eq!(records[0][2], "ReportKey");
        assert_eq!(records[0][8], "Component");
        assert_eq!(records[1][2], "q1");
        assert_eq!(records[1][8], "Sort: Package\\Sort");
        assert_eq!(records[2][8], "");
    }

    #[test]
    fn test_preview_is_display_only() {
        let long = "SELECT é".repeat(100);
        let options = TableOptions {
            preview_len: Some(10),
            ..TableOptions::default()
        };
        let source = row(&long);
        let mut buf = Vec::new();
        write_table(&mut buf, std::slice::from_ref(&source), &options).unwrap();

        let records = read_back(&buf, b'|');
        assert_eq!(records[1][6].chars().count(), 10);
        assert_eq!(source.command_text, long);
    }

    #[test]
    fn test_preview_char_boundaries() {
        assert_eq!(preview("héllo", Some(2)), "hé");
        assert_eq!(preview("abc", Some(10)), "abc");
        assert_eq!(preview("abc", None), "abc");
        assert_eq!(preview("abc", Some(0)), "");
    }
}
