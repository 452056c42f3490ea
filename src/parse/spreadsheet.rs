use std::io::Cursor;

use calamine::{Data, Range, Reader, Xlsx};

use crate::error::{Error, Result};
use crate::table::RawTable;

use super::clean_field;

/// Read one sheet of a workbook into a raw table, taking `header_row`
/// (0-based within the sheet's used range) as the header.
pub fn read_raw(bytes: &[u8], sheet: &str, header_row: usize) -> Result<RawTable> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| Error::Parse(format!("cannot open workbook: {e}")))?;
    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| Error::Parse(format!("cannot read sheet `{sheet}`: {e}")))?;
    range_to_raw(&range, header_row)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => clean_field(s),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

fn range_to_raw(range: &Range<Data>, header_row: usize) -> Result<RawTable> {
    let mut rows = range.rows().skip(header_row);
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| Error::Parse(format!("no header row at index {header_row}")))?
        .iter()
        .map(cell_to_string)
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(Error::Parse(format!(
            "header row at index {header_row} is empty"
        )));
    }

    let data_rows = rows
        .map(|r| r.iter().map(cell_to_string).collect())
        .collect();
    Ok(RawTable {
        headers,
        rows: data_rows,
    })
}
