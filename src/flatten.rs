//! Cross-product flattening of extraction results into table rows.

use crate::model::ExtractionResult;
use serde::Serialize;

/// One output row: a (DataSource, DataSet) pair of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    pub category: String,
    pub report: String,
    pub report_key: String,
    pub data_source: String,
    pub connection: String,
    pub data_set: String,
    pub command_type: String,
    pub command_text: String,
    /// Nearest pipeline component at or before the data set, SSIS only.
    pub component: Option<String>,
}

/// Every DataSource paired with every DataSet of the document. No join on
/// the data set's own source reference: downstream consumers expect the
/// full product. Zero sources or zero sets means zero rows.
pub fn flatten(result: &ExtractionResult) -> Vec<OutputRow> {
    let document = result.document();
    let report_key = document.report_key();

    let mut rows = Vec::with_capacity(result.data_sources().len() * result.data_sets().len());
    for source in result.data_sources() {
        let connection = source.connection.to_string();
        for set in result.data_sets() {
            rows.push(OutputRow {
                category: document.category.clone(),
                report: document.name.clone(),
                report_key: report_key.clone(),
                data_source: source.name.clone(),
                connection: connection.clone(),
                data_set: set.name.clone(),
                command_type: set.command_type.to_string(),
                command_text: set.command_text.clone(),
                component: result
                    .component_before(set.position)
                    .map(|c| c.annotation()),
            });
        }
    }
    rows
}

/// Rows of all results, in input order.
pub fn flatten_all<'a, I>(results: I) -> Vec<OutputRow>
where
    I: IntoIterator<Item = &'a ExtractionResult>,
{
    results.into_iter().flat_map(flatten).collect()
}
