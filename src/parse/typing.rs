use crate::error::Result;
use crate::table::{Column, RawTable, TypedTable};

/// An all-digit string of length >= 2 starting with '0'. These are
/// identifier codes (region, classification, municipality numbers) and must
/// survive as text; coercing "01" to 1 destroys the code.
fn has_leading_zero(s: &str) -> bool {
    s.len() >= 2 && s.starts_with('0') && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_missing(s: &str) -> bool {
    s.is_empty()
}

/// Type one column: numeric iff every present value parses as a float and
/// none is a leading-zero code. Columns with no present values stay text.
fn type_column(values: &[&str]) -> Column {
    let mut any_present = false;
    let mut numeric = true;
    for v in values.iter().filter(|v| !is_missing(v)) {
        any_present = true;
        if has_leading_zero(v) || v.parse::<f64>().is_err() {
            numeric = false;
            break;
        }
    }

    if any_present && numeric {
        Column::Number(
            values
                .iter()
                .map(|v| {
                    if is_missing(v) {
                        None
                    } else {
                        v.parse::<f64>().ok()
                    }
                })
                .collect(),
        )
    } else {
        Column::Text(
            values
                .iter()
                .map(|v| {
                    if is_missing(v) {
                        None
                    } else {
                        Some((*v).to_string())
                    }
                })
                .collect(),
        )
    }
}

/// Infer per-column types for a normalized raw table (every row exactly
/// header-length).
pub fn type_columns(raw: RawTable) -> Result<TypedTable> {
    let mut columns = Vec::with_capacity(raw.headers.len());
    for (j, name) in raw.headers.iter().enumerate() {
        let values: Vec<&str> = raw.rows.iter().map(|r| r[j].as_str()).collect();
        columns.push((name.clone(), type_column(&values)));
    }
    TypedTable::from_columns(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_numbers_become_numeric() {
        assert_eq!(
            type_column(&["1", "2.5", "-3e2", ""]),
            Column::Number(vec![Some(1.0), Some(2.5), Some(-300.0), None])
        );
    }

    #[test]
    fn leading_zero_codes_stay_text() {
        assert_eq!(
            type_column(&["01", "12"]),
            Column::Text(vec![Some("01".into()), Some("12".into())])
        );
    }

    #[test]
    fn zero_alone_is_numeric() {
        // "0" is a value, not a padded code.
        assert_eq!(type_column(&["0", "7"]), Column::Number(vec![Some(0.0), Some(7.0)]));
    }

    #[test]
    fn decimals_starting_with_zero_are_numeric() {
        assert_eq!(
            type_column(&["0.5", "0.25"]),
            Column::Number(vec![Some(0.5), Some(0.25)])
        );
    }

    #[test]
    fn mixed_content_stays_text() {
        assert_eq!(
            type_column(&["1", "n/a"]),
            Column::Text(vec![Some("1".into()), Some("n/a".into())])
        );
    }

    #[test]
    fn all_missing_defaults_to_text() {
        assert_eq!(type_column(&["", ""]), Column::Text(vec![None, None]));
    }
}
