//! Extracted metadata types.
//!
//! One [`ExtractionResult`] per source file. Children are owned by the result
//! they were extracted into, so the "owning document" of any DataSource,
//! DataSet or PipelineComponent is the result that holds it.

use crate::error::RecordedError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Sentinel shown for a DataSource with no embedded connection string.
pub const SHARED_CONNECTION: &str = "Shared/External";

/// Which versioned schema a document was written against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaVersion {
    V2010,
    V2016,
    SsisDts,
    Unknown,
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::V2010 => "v2010",
            Self::V2016 => "v2016",
            Self::SsisDts => "ssis-dts",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Document family, selects the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaFamily {
    Rdl,
    Ssis,
}

impl SchemaFamily {
    /// Family implied by a file extension, if any.
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("rdl") {
            Some(Self::Rdl)
        } else if ext.eq_ignore_ascii_case("dtsx") {
            Some(Self::Ssis)
        } else {
            None
        }
    }
}

/// One parsed source file.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument {
    pub path: PathBuf,
    pub category: String,
    pub name: String,
    pub version: SchemaVersion,
    pub parsed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl ReportDocument {
    pub fn new(path: PathBuf, category: String) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            category,
            name,
            version: SchemaVersion::Unknown,
            parsed: false,
            content_hash: None,
        }
    }

    pub fn report_key(&self) -> String {
        report_key(&self.name)
    }
}

/// Join key used by downstream catalog merges: the file name without its
/// `.rdl` / `.dtsx` extension.
pub fn report_key(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);

    match base.rsplit_once('.') {
        Some((stem, ext)) if SchemaFamily::from_extension(ext).is_some() => stem.to_string(),
        _ => base.to_string(),
    }
}

/// Connection of a DataSource. Absent connect strings are shared, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Connection {
    Embedded { connect_string: String },
    Shared {
        #[serde(skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
    },
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedded { connect_string } => f.write_str(connect_string),
            Self::Shared { .. } => f.write_str(SHARED_CONNECTION),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSource {
    pub name: String,
    pub connection: Connection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum CommandType {
    #[default]
    Text,
    StoredProcedure,
    TableDirect,
}

impl CommandType {
    /// Parse a `CommandType` value. Case-insensitive; unknown values are `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        [Self::Text, Self::StoredProcedure, Self::TableDirect]
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::StoredProcedure => "StoredProcedure",
            Self::TableDirect => "TableDirect",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSet {
    pub name: String,
    pub command_type: CommandType,
    /// Normalized SQL; line endings are always `\n`.
    pub command_text: String,
    /// Byte offset of the node in the source document.
    #[serde(skip)]
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComponentKind {
    MergeJoin,
    Sort,
    DerivedColumn,
    Lookup,
    OleDbSource,
    Unclassified,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MergeJoin => "MergeJoin",
            Self::Sort => "Sort",
            Self::DerivedColumn => "DerivedColumn",
            Self::Lookup => "Lookup",
            Self::OleDbSource => "OleDbSource",
            Self::Unclassified => "Unclassified",
        };
        f.write_str(label)
    }
}

/// SSIS data-flow component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineComponent {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    pub kind: ComponentKind,
    #[serde(skip)]
    pub position: usize,
}

impl PipelineComponent {
    pub fn annotation(&self) -> String {
        format!("{}: {}", self.kind, self.identifier)
    }
}

/// Everything extracted from one document. Built once through
/// [`ExtractionBuilder`] and read-only afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    document: ReportDocument,
    data_sources: Vec<DataSource>,
    data_sets: Vec<DataSet>,
    components: Vec<PipelineComponent>,
    errors: Vec<RecordedError>,
}

impl ExtractionResult {
    /// Result for a file that could not be processed at all.
    pub fn failed(document: ReportDocument, error: RecordedError) -> Self {
        Self {
            document,
            data_sources: Vec::new(),
            data_sets: Vec::new(),
            components: Vec::new(),
            errors: vec![error],
        }
    }

    pub fn document(&self) -> &ReportDocument {
        &self.document
    }

    pub fn data_sources(&self) -> &[DataSource] {
        &self.data_sources
    }

    pub fn data_sets(&self) -> &[DataSet] {
        &self.data_sets
    }

    pub fn components(&self) -> &[PipelineComponent] {
        &self.components
    }

    pub fn errors(&self) -> &[RecordedError] {
        &self.errors
    }

    pub fn is_failed(&self) -> bool {
        self.errors.iter().any(|e| e.kind.is_fatal())
    }

    /// Count of non-fatal (per-entity) errors.
    pub fn entity_error_count(&self) -> usize {
        self.errors.iter().filter(|e| !e.kind.is_fatal()).count()
    }

    /// Nearest component at or before `position` in document order.
    pub fn component_before(&self, position: usize) -> Option<&PipelineComponent> {
        self.components
            .iter()
            .filter(|c| c.position <= position)
            .max_by_key(|c| c.position)
    }
}

/// Accumulates one document's entities while it is being walked.
#[derive(Debug)]
pub struct ExtractionBuilder {
    document: ReportDocument,
    data_sources: Vec<DataSource>,
    data_sets: Vec<DataSet>,
    components: Vec<PipelineComponent>,
    errors: Vec<RecordedError>,
}

impl ExtractionBuilder {
    pub fn new(document: ReportDocument) -> Self {
        Self {
            document,
            data_sources: Vec::new(),
            data_sets: Vec::new(),
            components: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn has_data_source(&self, name: &str) -> bool {
        self.data_sources.iter().any(|ds| ds.name == name)
    }

    pub fn push_data_source(&mut self, data_source: DataSource) {
        self.data_sources.push(data_source);
    }

    pub fn push_data_set(&mut self, data_set: DataSet) {
        self.data_sets.push(data_set);
    }

    pub fn push_component(&mut self, component: PipelineComponent) {
        self.components.push(component);
    }

    pub fn record(&mut self, error: RecordedError) {
        self.errors.push(error);
    }

    pub fn finish(mut self) -> ExtractionResult {
        // Sources from several walks (tasks, pipeline sources) are merged in document order.
        self.data_sets.sort_by_key(|ds| ds.position);
        self.components.sort_by_key(|c| c.position);

        ExtractionResult {
            document: self.document,
            data_sources: self.data_sources,
            data_sets: self.data_sets,
            components: self.components,
            errors: self.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn component(id: &str, kind: ComponentKind, position: usize) -> PipelineComponent {
        PipelineComponent {
            identifier: id.to_string(),
            class_id: None,
            kind,
            position,
        }
    }

    #[test]
    fn test_report_key() {
        assert_eq!(report_key("q1.rdl"), "q1");
        assert_eq!(report_key("Finance/Q1.RDL"), "Q1");
        assert_eq!(report_key(r"C:\ssis\Load.dtsx"), "Load");
        assert_eq!(report_key("notes.txt"), "notes.txt");
    }

    #[test]
    fn test_shared_connection_display() {
        let shared = Connection::Shared { reference: Some("Warehouse".into()) };
        assert_eq!(shared.to_string(), SHARED_CONNECTION);

        let embedded = Connection::Embedded { connect_string: String::new() };
        assert_eq!(embedded.to_string(), "");
    }

    #[test]
    fn test_command_type_parse() {
        assert_eq!(CommandType::parse("storedprocedure"), Some(CommandType::StoredProcedure));
        assert_eq!(CommandType::parse(" TableDirect "), Some(CommandType::TableDirect));
        assert_eq!(CommandType::parse("Sproc"), None);
        assert_eq!(CommandType::default(), CommandType::Text);
    }

    #[test]
    fn test_component_before() {
        let mut builder = ExtractionBuilder::new(ReportDocument::new("p.dtsx".into(), "etl".into()));
        builder.push_component(component("Sort", ComponentKind::Sort, 50));
        builder.push_component(component("Merge Join", ComponentKind::MergeJoin, 10));
        let result = builder.finish();

        assert_eq!(result.components()[0].identifier, "Merge Join");
        assert!(result.component_before(5).is_none());
        assert_eq!(result.component_before(30).unwrap().identifier, "Merge Join");
        assert_eq!(result.component_before(50).unwrap().identifier, "Sort");
    }

    #[test]
    fn test_failed_result() {
        let doc = ReportDocument::new("Reports/Finance/bad.rdl".into(), "Finance".into());
        assert_eq!(doc.name, "bad.rdl");

        let result = ExtractionResult::failed(
            doc,
            RecordedError { kind: ErrorKind::FileParseError, message: "boom".into() },
        );
        assert!(result.is_failed());
        assert_eq!(result.entity_error_count(), 0);
        assert!(result.data_sources().is_empty());
    }
}
