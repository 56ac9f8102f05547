use indexmap::IndexMap;
use rayon::prelude::*;

use crate::models::{ColumnSummary, DatasetSummary, NumericStats, Record};

/// Parses a cell as a plain decimal number.
///
/// Surrounding whitespace is ignored. Blank cells, `NaN` and infinities are
/// not numbers here since they have no JSON representation.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

pub fn summarize(records: &[Record]) -> DatasetSummary {
    // Schema comes from the first row only; keys seen later are ignored.
    let columns: Vec<String> = records
        .first()
        .map(|record| record.keys().cloned().collect())
        .unwrap_or_default();

    let column_summaries: Vec<ColumnSummary> = columns
        .par_iter()
        .map(|name| summarize_column(records, name))
        .collect();

    let mut missing_by_column = IndexMap::with_capacity(columns.len());
    let mut numeric_stats = IndexMap::new();
    for (name, column) in columns.iter().zip(column_summaries) {
        missing_by_column.insert(name.clone(), column.missing_count);
        if let Some(stats) = column.numeric {
            numeric_stats.insert(name.clone(), stats);
        }
    }

    let column_with_most_missing = most_missing(&missing_by_column);

    DatasetSummary {
        row_count: records.len(),
        columns,
        missing_by_column,
        column_with_most_missing,
        numeric_stats,
    }
}

fn summarize_column(records: &[Record], name: &str) -> ColumnSummary {
    let mut missing_count = 0;
    let mut numbers = Vec::new();

    for record in records {
        match record.get(name).map(String::as_str) {
            None | Some("") => missing_count += 1,
            Some(value) => {
                if let Some(number) = parse_numeric(value) {
                    numbers.push(number);
                }
            }
        }
    }

    ColumnSummary {
        missing_count,
        numeric: numeric_stats(numbers),
    }
}

fn numeric_stats(mut numbers: Vec<f64>) -> Option<NumericStats> {
    if numbers.is_empty() {
        return None;
    }
    numbers.sort_by(|a, b| a.total_cmp(b));

    let count = numbers.len();
    let sum: f64 = numbers.iter().sum();

    Some(NumericStats {
        count,
        min: numbers[0],
        max: numbers[count - 1],
        mean: sum / count as f64,
        // Upper-middle element for even counts, not the average of the two.
        median: numbers[count / 2],
    })
}

fn most_missing(missing_by_column: &IndexMap<String, usize>) -> Option<String> {
    let mut best: Option<(&String, usize)> = None;
    for (name, &missing) in missing_by_column {
        match best {
            Some((_, current)) if missing <= current => {}
            _ => best = Some((name, missing)),
        }
    }
    best.map(|(name, _)| name.clone())
}
