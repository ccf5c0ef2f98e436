use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use clap::ValueEnum;
use owo_colors::Style;
use serde::Serialize;
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter};
use serde_json::Serializer;

use crate::error::{Error, Result};
use crate::flatten::flatten;
use crate::log_fetcher::ResultRow;

pub const CSV_DELIMITER: &str = ", ";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Rows as returned by the service, one JSON array of field/value pairs.
    Raw,
    /// Flattened records as one JSON array.
    #[value(name = "fulljson")]
    FullJson,
    /// One flattened record per line.
    #[default]
    Json,
    /// Header of field names, then one line of values per row.
    Csv,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(value, true)
            .map_err(|_| Error::InvalidArgument(format!("unknown output format {value:?}")))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutputFormat::Raw => "raw",
            OutputFormat::FullJson => "fulljson",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Encoder {
    format: OutputFormat,
    color: bool,
}

impl Encoder {
    pub fn new(format: OutputFormat, color: bool) -> Self {
        Self { format, color }
    }

    /// Whether the output carries ANSI styling. Delimited text never does.
    pub fn colorizes(&self) -> bool {
        self.color && !matches!(self.format, OutputFormat::Csv)
    }

    pub fn encode<W: Write + ?Sized>(&self, rows: &[ResultRow], out: &mut W) -> Result<()> {
        match self.format {
            OutputFormat::Raw => self.write_document(out, rows, true),
            OutputFormat::FullJson => self.write_document(out, &flatten(rows), true),
            OutputFormat::Json => {
                for record in flatten(rows) {
                    self.write_document(out, &record, false)?;
                }
                Ok(())
            }
            OutputFormat::Csv => write_delimited(out, rows),
        }
    }

    fn write_document<W, T>(&self, out: &mut W, value: &T, pretty: bool) -> Result<()>
    where
        W: Write + ?Sized,
        T: Serialize + ?Sized,
    {
        match (pretty, self.color) {
            (true, false) => serde_json::to_writer_pretty(&mut *out, value)?,
            (false, false) => serde_json::to_writer(&mut *out, value)?,
            (true, true) => {
                let formatter = ColorFormatter::new(PrettyFormatter::new());
                value.serialize(&mut Serializer::with_formatter(&mut *out, formatter))?;
            }
            (false, true) => {
                let formatter = ColorFormatter::new(CompactFormatter);
                value.serialize(&mut Serializer::with_formatter(&mut *out, formatter))?;
            }
        }
        out.write_all(b"\n")?;
        Ok(())
    }
}

/// Every row must repeat the first row's field names in the same order;
/// checked up front so a bad result writes nothing.
fn write_delimited<W: Write + ?Sized>(out: &mut W, rows: &[ResultRow]) -> Result<()> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    let header: Vec<&str> = first.iter().map(|f| f.field.as_str()).collect();

    for (idx, row) in rows.iter().enumerate().skip(1) {
        let names: Vec<&str> = row.iter().map(|f| f.field.as_str()).collect();
        if names != header {
            return Err(Error::MisalignedRow {
                row: idx,
                expected: header.join(CSV_DELIMITER),
                found: names.join(CSV_DELIMITER),
            });
        }
    }

    writeln!(out, "{}", header.join(CSV_DELIMITER))?;
    for row in rows {
        let values: Vec<&str> = row.iter().map(|f| f.value.as_str()).collect();
        writeln!(out, "{}", values.join(CSV_DELIMITER))?;
    }
    Ok(())
}

/// Wraps a serde_json formatter and paints keys and scalars.
struct ColorFormatter<F> {
    inner: F,
    in_key: bool,
}

impl<F> ColorFormatter<F> {
    fn new(inner: F) -> Self {
        Self {
            inner,
            in_key: false,
        }
    }

    fn string_style(&self) -> Style {
        if self.in_key {
            Style::new().blue().bold()
        } else {
            Style::new().green()
        }
    }
}

fn painted<W, G>(writer: &mut W, style: Style, body: G) -> io::Result<()>
where
    W: ?Sized + Write,
    G: FnOnce(&mut W) -> io::Result<()>,
{
    write!(writer, "{}", style.prefix_formatter())?;
    body(writer)?;
    write!(writer, "{}", style.suffix_formatter())
}

impl<F: Formatter> Formatter for ColorFormatter<F> {
    fn write_null<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        painted(writer, Style::new().bright_black(), |w| self.inner.write_null(w))
    }

    fn write_bool<W: ?Sized + Write>(&mut self, writer: &mut W, value: bool) -> io::Result<()> {
        painted(writer, Style::new().yellow(), |w| self.inner.write_bool(w, value))
    }

    fn write_i64<W: ?Sized + Write>(&mut self, writer: &mut W, value: i64) -> io::Result<()> {
        painted(writer, Style::new().cyan(), |w| self.inner.write_i64(w, value))
    }

    fn write_u64<W: ?Sized + Write>(&mut self, writer: &mut W, value: u64) -> io::Result<()> {
        painted(writer, Style::new().cyan(), |w| self.inner.write_u64(w, value))
    }

    fn write_f64<W: ?Sized + Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        painted(writer, Style::new().cyan(), |w| self.inner.write_f64(w, value))
    }

    fn begin_string<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        write!(writer, "{}", self.string_style().prefix_formatter())?;
        self.inner.begin_string(writer)
    }

    fn end_string<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_string(writer)?;
        write!(writer, "{}", self.string_style().suffix_formatter())
    }

    fn begin_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.in_key = true;
        self.inner.begin_object_key(writer, first)
    }

    fn end_object_key<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.in_key = false;
        self.inner.end_object_key(writer)
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_fetcher::ResultField;
    use crate::sink::AnsiStripper;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn row(fields: &[(&str, &str)]) -> ResultRow {
        fields
            .iter()
            .map(|(name, value)| ResultField::new(*name, *value))
            .collect()
    }

    fn sample_rows() -> Vec<ResultRow> {
        vec![
            row(&[("@timestamp", "t1"), ("@message", r#"{"level":"info"}"#), ("@ptr", "p1")]),
            row(&[("@timestamp", "t2"), ("@message", "plain text"), ("@ptr", "p2")]),
            row(&[("@timestamp", "t3"), ("@message", "[1,2]"), ("@ptr", "p3")]),
        ]
    }

    fn render(format: OutputFormat, color: bool, rows: &[ResultRow]) -> String {
        let mut out = Vec::new();
        Encoder::new(format, color).encode(rows, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn line_delimited_emits_one_document_per_row() {
        let text = render(OutputFormat::Json, false, &sample_rows());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in &lines {
            let parsed: Value = serde_json::from_str(line).unwrap();
            assert!(parsed.get("@ptr").is_none());
        }
        assert_eq!(
            serde_json::from_str::<Value>(lines[0]).unwrap(),
            json!({"@timestamp": "t1", "@message": {"level": "info"}})
        );
    }

    #[test]
    fn full_document_holds_every_row() {
        let text = render(OutputFormat::FullJson, false, &sample_rows());
        let parsed: Value = serde_json::from_str(&text).unwrap();
        let entries = parsed.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1]["@message"], json!("plain text"));
        assert_eq!(entries[2]["@message"], json!([1, 2]));
    }

    #[test]
    fn raw_keeps_pairs_and_pointer() {
        let rows = vec![row(&[("@message", "{}"), ("@ptr", "p1")])];
        let text = render(OutputFormat::Raw, false, &rows);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            parsed,
            json!([[{"field": "@message", "value": "{}"}, {"field": "@ptr", "value": "p1"}]])
        );
        assert!(text.contains("\n  "), "raw output is indented");
    }

    #[test]
    fn delimited_text_header_then_values() {
        let rows = vec![row(&[("a", "1"), ("b", "2")]), row(&[("a", "3"), ("b", "4")])];
        assert_eq!(render(OutputFormat::Csv, false, &rows), "a, b\n1, 2\n3, 4\n");
    }

    #[test]
    fn delimited_text_rejects_misaligned_rows_before_writing() {
        let rows = vec![row(&[("a", "1"), ("b", "2")]), row(&[("b", "3"), ("a", "4")])];
        let mut out = Vec::new();
        let err = Encoder::new(OutputFormat::Csv, false)
            .encode(&rows, &mut out)
            .unwrap_err();
        assert!(matches!(err, Error::MisalignedRow { row: 1, .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn empty_results() {
        assert_eq!(render(OutputFormat::Json, false, &[]), "");
        assert_eq!(render(OutputFormat::Csv, false, &[]), "");
        assert_eq!(render(OutputFormat::FullJson, false, &[]), "[]\n");
        assert_eq!(render(OutputFormat::Raw, false, &[]), "[]\n");
    }

    #[test]
    fn colored_output_strips_back_to_plain() {
        for format in [OutputFormat::Raw, OutputFormat::FullJson, OutputFormat::Json] {
            let colored = render(format, true, &sample_rows());
            assert!(colored.contains('\x1b'), "{format} should carry escapes");

            let mut stripped = Vec::new();
            AnsiStripper::new(&mut stripped)
                .write_all(colored.as_bytes())
                .unwrap();
            let stripped = String::from_utf8(stripped).unwrap();
            assert_eq!(stripped, render(format, false, &sample_rows()));
        }
    }

    #[test]
    fn delimited_text_is_never_colorized() {
        assert!(!Encoder::new(OutputFormat::Csv, true).colorizes());
        assert!(!Encoder::new(OutputFormat::Json, false).colorizes());
        assert!(Encoder::new(OutputFormat::Json, true).colorizes());
        assert!(!render(OutputFormat::Csv, true, &sample_rows()).contains('\x1b'));
    }

    #[test]
    fn format_names_round_trip_through_from_str() {
        for format in OutputFormat::value_variants() {
            assert_eq!(format.to_string().parse::<OutputFormat>().unwrap(), *format);
        }
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
