use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::diag::DiagRecorder;
use crate::table::{Column, TypedTable, Value};

/// A metadata table to fold into the primary table, plus the column names
/// that are presentation-only and must never participate in key inference.
#[derive(Debug, Clone)]
pub struct MappingTable {
    pub table: TypedTable,
    pub presentation_columns: HashSet<String>,
}

impl MappingTable {
    pub fn new(table: TypedTable) -> Self {
        MappingTable {
            table,
            presentation_columns: HashSet::new(),
        }
    }

    pub fn with_presentation_columns(
        table: TypedTable,
        columns: impl IntoIterator<Item = String>,
    ) -> Self {
        MappingTable {
            table,
            presentation_columns: columns.into_iter().collect(),
        }
    }
}

/// Result of folding one mapping table, recorded in the processing log.
/// A `Failed` step never aborts the fold; only that table's contribution is
/// lost.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Merged {
        keys: Vec<String>,
        matched: usize,
        unmatched: usize,
        /// Accumulated rows whose key matched more than one mapping row.
        /// Row multiplication is expected, not deduplicated; this is the
        /// informational ambiguous-join count.
        multiplied: usize,
        rows_out: usize,
        /// Non-key mapping columns whose names already exist in the
        /// accumulated table; they are not re-introduced.
        shadowed: Vec<String>,
    },
    Skipped {
        reason: String,
    },
    Failed {
        reason: String,
    },
}

/// Hashable join-key component. Missing values never participate in a key,
/// so only present values are represented.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    Text(String),
    Number(u64),
}

fn key_part(value: Value) -> Option<KeyPart> {
    match value {
        Value::Text(s) => Some(KeyPart::Text(s)),
        Value::Number(n) => Some(KeyPart::Number(n.to_bits())),
        Value::Missing => None,
    }
}

/// The key for one row, or `None` when any key column is missing there.
fn row_key(columns: &[&Column], row: usize) -> Option<Vec<KeyPart>> {
    columns.iter().map(|c| key_part(c.value(row))).collect()
}

/// Fold one mapping table into the accumulated table.
fn merge_one(acc: &TypedTable, mapping: &MappingTable) -> (StepOutcome, Option<TypedTable>) {
    // Presentation-only columns are removed before any inference.
    let usable: Vec<&(String, Column)> = mapping
        .table
        .columns()
        .iter()
        .filter(|(name, _)| !mapping.presentation_columns.contains(name))
        .collect();

    if usable.len() < 2 {
        return (
            StepOutcome::Failed {
                reason: format!(
                    "only {} usable column(s) after removing presentation columns",
                    usable.len()
                ),
            },
            None,
        );
    }

    // Candidate key: all but the last usable column, kept in mapping order,
    // intersected with the accumulated table's column names.
    let keys: Vec<&(String, Column)> = usable[..usable.len() - 1]
        .iter()
        .copied()
        .filter(|(name, _)| acc.has_column(name))
        .collect();
    if keys.is_empty() {
        return (
            StepOutcome::Skipped {
                reason: "no key column shared with the accumulated table".into(),
            },
            None,
        );
    }

    for (name, col) in &keys {
        let acc_kind = acc.column(name).map(|c| c.kind());
        if acc_kind != Some(col.kind()) {
            return (
                StepOutcome::Failed {
                    reason: format!("key column `{name}` has mismatched types across tables"),
                },
                None,
            );
        }
    }

    let key_names: Vec<String> = keys.iter().map(|(n, _)| n.clone()).collect();
    let key_set: HashSet<&str> = key_names.iter().map(String::as_str).collect();

    // Columns the mapping table introduces; names already present in the
    // accumulated table are shadowed rather than overwritten.
    let mut new_columns: Vec<&(String, Column)> = Vec::new();
    let mut shadowed = Vec::new();
    for &pair in &usable {
        let (name, _) = pair;
        if key_set.contains(name.as_str()) {
            continue;
        }
        if acc.has_column(name) {
            shadowed.push(name.clone());
        } else {
            new_columns.push(pair);
        }
    }

    // Index mapping rows by key.
    let mapping_key_cols: Vec<&Column> = keys.iter().map(|(_, c)| c).collect();
    let mut index: HashMap<Vec<KeyPart>, Vec<usize>> = HashMap::new();
    for row in 0..mapping.table.n_rows() {
        if let Some(key) = row_key(&mapping_key_cols, row) {
            index.entry(key).or_default().push(row);
        }
    }

    // Left outer join: every accumulated row survives, duplicate mapping
    // keys multiply it, unmatched keys pad with missing.
    let acc_key_cols: Vec<&Column> = key_names
        .iter()
        .map(|n| acc.column(n).expect("key columns exist in acc"))
        .collect();
    let mut left = Vec::with_capacity(acc.n_rows());
    let mut right = Vec::with_capacity(acc.n_rows());
    let (mut matched, mut unmatched, mut multiplied) = (0usize, 0usize, 0usize);
    for row in 0..acc.n_rows() {
        let hits = row_key(&acc_key_cols, row).and_then(|k| index.get(&k));
        match hits {
            Some(rows) => {
                matched += 1;
                if rows.len() > 1 {
                    multiplied += 1;
                }
                for &m in rows {
                    left.push(row);
                    right.push(Some(m));
                }
            }
            None => {
                unmatched += 1;
                left.push(row);
                right.push(None);
            }
        }
    }

    let mut columns: Vec<(String, Column)> = acc
        .columns()
        .iter()
        .map(|(n, c)| (n.clone(), c.take(&left)))
        .collect();
    for (name, col) in new_columns {
        columns.push((name.clone(), col.take_opt(&right)));
    }

    match TypedTable::from_columns(columns) {
        Ok(table) => {
            let rows_out = table.n_rows();
            (
                StepOutcome::Merged {
                    keys: key_names,
                    matched,
                    unmatched,
                    multiplied,
                    rows_out,
                    shadowed,
                },
                Some(table),
            )
        }
        Err(e) => (
            StepOutcome::Failed {
                reason: e.to_string(),
            },
            None,
        ),
    }
}

/// Fold an ordered list of mapping tables into `primary`, left to right: the
/// output of step *i* is the left table of step *i+1*. Per-step failures are
/// isolated; the fold always completes and every outcome lands in the
/// recorder.
pub fn merge_all(
    primary: TypedTable,
    mappings: &[MappingTable],
    diag: &mut DiagRecorder,
) -> TypedTable {
    let mut acc = primary;
    for (i, mapping) in mappings.iter().enumerate() {
        let label = format!("mapping table #{}", i + 1);
        let (outcome, table) = merge_one(&acc, mapping);
        match outcome {
            StepOutcome::Merged {
                keys,
                matched,
                unmatched,
                multiplied,
                rows_out,
                shadowed,
            } => {
                debug!(%label, ?keys, matched, unmatched, rows_out, "merged mapping table");
                diag.step(format!(
                    "{label}: merged on [{}]: {matched} matched, {unmatched} unmatched, {rows_out} rows",
                    keys.join(", ")
                ));
                if multiplied > 0 {
                    diag.step(format!(
                        "{label}: ambiguous join, {multiplied} key(s) matched multiple rows; rows multiplied"
                    ));
                }
                if !shadowed.is_empty() {
                    diag.step(format!(
                        "{label}: column(s) [{}] already present, not re-introduced",
                        shadowed.join(", ")
                    ));
                }
                acc = table.expect("merged outcome carries a table");
            }
            StepOutcome::Skipped { reason } => {
                debug!(%label, %reason, "mapping table skipped");
                diag.step(format!("{label}: skipped ({reason})"));
            }
            StepOutcome::Failed { reason } => {
                warn!(%label, %reason, "mapping table failed; continuing fold");
                diag.warning(format!("{label}: skipped ({reason})"));
            }
        }
    }
    acc
}
