use csv::ReaderBuilder;

use crate::error::{Error, Result};
use crate::table::RawTable;

use super::clean_field;

/// Read TAB-delimited bytes into a raw table. The header is the first record
/// with at least one non-empty field; rows keep whatever length the file
/// gives them, raggedness is repaired later.
pub fn read_raw(bytes: &[u8]) -> Result<RawTable> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(bytes);

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for record in reader.records() {
        let record =
            record.map_err(|e| Error::Parse(format!("malformed delimited record: {e}")))?;
        let fields: Vec<String> = record.iter().map(clean_field).collect();

        match &headers {
            None => {
                if fields.iter().any(|f| !f.is_empty()) {
                    headers = Some(fields);
                }
                // Leading blank lines before the header are tolerated.
            }
            Some(_) => rows.push(fields),
        }
    }

    let headers = headers.ok_or_else(|| Error::Parse("no header row located".into()))?;
    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_ragged_rows_as_is() -> anyhow::Result<()> {
        let raw = read_raw(b"a\tb\tc\n1\t2\n1\t2\t3\t4\n")?;
        assert_eq!(raw.headers, vec!["a", "b", "c"]);
        assert_eq!(raw.rows[0].len(), 2);
        assert_eq!(raw.rows[1].len(), 4);
        Ok(())
    }

    #[test]
    fn skips_blank_lines_before_header() -> anyhow::Result<()> {
        let raw = read_raw(b"\n\na\tb\n1\t2\n")?;
        assert_eq!(raw.headers, vec!["a", "b"]);
        assert_eq!(raw.rows.len(), 1);
        Ok(())
    }

    #[test]
    fn handles_crlf_terminators() -> anyhow::Result<()> {
        let raw = read_raw(b"a\tb\r\n1\t2\r\n")?;
        assert_eq!(raw.rows, vec![vec!["1".to_string(), "2".to_string()]]);
        Ok(())
    }
}
