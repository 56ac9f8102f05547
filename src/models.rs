use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub const SAMPLE_ROWS: usize = 5;

/// One CSV row, keyed by header name in header order.
pub type Record = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub missing_count: usize,
    pub numeric: Option<NumericStats>,
}

/// Aggregate statistics over a fully buffered record set.
///
/// This is what the browser keeps after a CSV load and sends back verbatim
/// with every question, so it deserializes as well as serializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub row_count: usize,
    pub columns: Vec<String>,
    pub missing_by_column: IndexMap<String, usize>,
    pub column_with_most_missing: Option<String>,
    pub numeric_stats: IndexMap<String, NumericStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CsvAnalysis {
    pub summary: DatasetSummary,
    pub sample: SmallVec<[Record; SAMPLE_ROWS]>,
}
