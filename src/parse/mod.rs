pub mod delimited;
pub mod spreadsheet;
pub mod typing;

use tracing::debug;

use crate::error::{Error, Result};
use crate::fetch::FileFormat;
use crate::table::{RawTable, TypedTable};

/// Trim whitespace and strip symmetric outer quotes.
pub(crate) fn clean_field(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse raw file bytes into a typed table, repairing ragged rows.
///
/// Rows longer than the header are truncated; a warning is emitted only when
/// a discarded field carried data (extra separators producing empty phantom
/// columns are repaired silently). Rows shorter than the header are padded
/// with missing values and always warned about.
pub fn parse(bytes: &[u8], format: &FileFormat) -> Result<(TypedTable, Vec<String>)> {
    let raw = match format {
        FileFormat::Delimited => delimited::read_raw(bytes)?,
        FileFormat::Spreadsheet { sheet, header_row } => {
            spreadsheet::read_raw(bytes, sheet, *header_row)?
        }
    };
    let (raw, warnings) = normalize(raw)?;
    debug!(
        columns = raw.headers.len(),
        rows = raw.rows.len(),
        warnings = warnings.len(),
        "parsed raw table"
    );
    let table = typing::type_columns(raw)?;
    Ok((table, warnings))
}

/// Bring every data row to exactly the header's field count.
fn normalize(mut raw: RawTable) -> Result<(RawTable, Vec<String>)> {
    let n = raw.headers.len();
    if n == 0 {
        return Err(Error::Parse("header row has no columns".into()));
    }

    let mut warnings = Vec::new();
    for (i, row) in raw.rows.iter_mut().enumerate() {
        let row_no = i + 1;
        if row.iter().all(|f| f.is_empty()) {
            return Err(Error::Parse(format!(
                "data row {row_no} has no usable fields"
            )));
        }
        if row.len() > n {
            let dropped = row[n..].iter().filter(|f| !f.is_empty()).count();
            if dropped > 0 {
                warnings.push(format!(
                    "row {row_no}: discarded {dropped} non-empty field(s) beyond the {n}-column header"
                ));
            }
            row.truncate(n);
        } else if row.len() < n {
            warnings.push(format!(
                "row {row_no}: padded {} missing trailing field(s)",
                n - row.len()
            ));
            row.resize(n, String::new());
        }
    }
    Ok((raw, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, Value};

    fn parse_tsv(text: &str) -> Result<(TypedTable, Vec<String>)> {
        parse(text.as_bytes(), &FileFormat::Delimited)
    }

    #[test]
    fn trailing_empty_phantom_columns_are_repaired_silently() -> anyhow::Result<()> {
        let (padded, warnings) = parse_tsv("code\tvalue\n01\t5\t\t\n02\t6\n")?;
        let (exact, _) = parse_tsv("code\tvalue\n01\t5\n02\t6\n")?;
        assert_eq!(padded, exact);
        assert!(warnings.is_empty());
        Ok(())
    }

    #[test]
    fn non_empty_phantom_columns_warn_and_truncate() -> anyhow::Result<()> {
        let (table, warnings) = parse_tsv("code\tvalue\n01\t5\tstray\n")?;
        assert_eq!(table.n_columns(), 2);
        assert_eq!(table.n_rows(), 1);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("discarded 1 non-empty field"));
        Ok(())
    }

    #[test]
    fn short_rows_are_padded_with_missing_and_warned() -> anyhow::Result<()> {
        let (table, warnings) = parse_tsv("code\tvalue\tnote\n01\t5\n")?;
        assert_eq!(warnings.len(), 1);
        assert_eq!(table.value(0, "note"), Some(Value::Missing));
        Ok(())
    }

    #[test]
    fn identifier_codes_keep_leading_zeros_as_text() -> anyhow::Result<()> {
        let (table, _) = parse_tsv("code\tvalue\n01\t5\n02\t6.5\n")?;
        assert_eq!(
            table.column("code"),
            Some(&Column::Text(vec![Some("01".into()), Some("02".into())]))
        );
        assert_eq!(
            table.column("value"),
            Some(&Column::Number(vec![Some(5.0), Some(6.5)]))
        );
        Ok(())
    }

    #[test]
    fn empty_input_has_no_header() {
        let err = parse_tsv("").expect_err("no header");
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn all_empty_row_is_unrecoverable() {
        let err = parse_tsv("code\tvalue\n\t\n").expect_err("zero usable fields");
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn quoted_fields_are_unwrapped() -> anyhow::Result<()> {
        let (table, _) = parse_tsv("region\tname\nDK01\t\"Greater Copenhagen\"\n")?;
        assert_eq!(
            table.value(0, "name"),
            Some(Value::Text("Greater Copenhagen".into()))
        );
        Ok(())
    }
}
