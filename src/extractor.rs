//! Per-document extraction pipeline: decode → resolve → walk → extract → classify.

use crate::classifier;
use crate::error::{ExtractError, Result};
use crate::fields;
use crate::model::{
    CommandType, DataSet, DataSource, ExtractionBuilder, ExtractionResult, PipelineComponent,
    ReportDocument, SchemaFamily,
};
use crate::namespace::{self, RdlPaths, SchemaPaths, SchemaRegistry, SsisPaths};
use crate::walker::{text_content, Walker};
use roxmltree::{Document, Node};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, info, warn};

/// Extraction pipeline orchestrator. Stateless apart from the schema
/// registry, so one instance is shared by every file worker.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    registry: SchemaRegistry,
}

impl Extractor {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Read and extract one file. Never fails: problems end up on the result.
    pub fn extract_file(&self, path: &Path, category: &str, family: SchemaFamily) -> ExtractionResult {
        let document = ReportDocument::new(path.to_path_buf(), category.to_string());
        match std::fs::read(path) {
            Ok(bytes) => self.extract(document, &bytes, family),
            Err(e) => {
                warn!("Failed to read {:?}: {}", path, e);
                ExtractionResult::failed(document, ExtractError::Io(e).record())
            }
        }
    }

    pub fn extract(
        &self,
        mut document: ReportDocument,
        bytes: &[u8],
        family: SchemaFamily,
    ) -> ExtractionResult {
        document.content_hash = Some({
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            format!("{:x}", hasher.finalize())
        });

        let text = match decode_source(bytes) {
            Ok(text) => text,
            Err(e) => return fail(document, &e),
        };

        let schema = match namespace::scan_namespaces(&text)
            .and_then(|scan| self.registry.resolve(family, &scan))
        {
            Ok(schema) => schema,
            Err(e) => return fail(document, &e),
        };
        document.version = schema.version;

        let repaired;
        let tree = match Document::parse(&text) {
            Ok(tree) => tree,
            Err(first) => match fields::escape_stray_ampersands(&text) {
                Some(fixed) => {
                    warn!("{:?}: {}, retrying with stray '&' escaped", document.path, first);
                    repaired = fixed;
                    match Document::parse(&repaired) {
                        Ok(tree) => tree,
                        Err(_) => return fail(document, &ExtractError::FileParse(first.to_string())),
                    }
                }
                None => return fail(document, &ExtractError::FileParse(first.to_string())),
            },
        };
        document.parsed = true;

        let mut builder = ExtractionBuilder::new(document);
        let walker = Walker::new(&schema.namespace);
        let root = tree.root_element();

        match schema.paths {
            SchemaPaths::Rdl(paths) => extract_rdl(&mut builder, &walker, paths, root),
            SchemaPaths::Ssis(paths) => {
                let task_walker = Walker::new(
                    schema
                        .task_namespace
                        .as_deref()
                        .unwrap_or(schema.namespace.as_str()),
                );
                extract_ssis(&mut builder, &walker, &task_walker, paths, root);
            }
        }

        let result = builder.finish();
        info!(
            "Extracted {} ({}): {} data source(s), {} data set(s), {} component(s), {} error(s)",
            result.document().name,
            result.document().version,
            result.data_sources().len(),
            result.data_sets().len(),
            result.components().len(),
            result.errors().len()
        );
        result
    }
}

fn fail(document: ReportDocument, error: &ExtractError) -> ExtractionResult {
    warn!("Skipping {:?}: {}", document.path, error);
    ExtractionResult::failed(document, error.record())
}

/// Bytes to text. Strips a UTF-8 BOM, transcodes BOM-marked UTF-16 and
/// drops anything before the first `<`.
pub fn decode_source(bytes: &[u8]) -> Result<Cow<'_, str>> {
    let text: Cow<'_, str> = match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => Cow::Borrowed(utf8(rest)?),
        [0xFF, 0xFE, rest @ ..] => Cow::Owned(utf16(rest, u16::from_le_bytes)?),
        [0xFE, 0xFF, rest @ ..] => Cow::Owned(utf16(rest, u16::from_be_bytes)?),
        _ => Cow::Borrowed(utf8(bytes)?),
    };

    let start = text
        .find('<')
        .ok_or_else(|| ExtractError::FileParse("no markup found".into()))?;
    if start > 0 {
        debug!("Dropping {} byte(s) before the first element", start);
    }

    Ok(match text {
        Cow::Borrowed(s) => Cow::Borrowed(&s[start..]),
        Cow::Owned(s) if start == 0 => Cow::Owned(s),
        Cow::Owned(s) => Cow::Owned(s[start..].to_string()),
    })
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| ExtractError::FileParse(format!("invalid UTF-8: {}", e)))
}

fn utf16(bytes: &[u8], decode: fn([u8; 2]) -> u16) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(ExtractError::FileParse("odd byte count for UTF-16".into()));
    }
    let units = bytes.chunks_exact(2).map(|pair| decode([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| ExtractError::FileParse(format!("invalid UTF-16: {}", e)))
}

// ============================================================================
// Report definitions
// ============================================================================

fn extract_rdl(builder: &mut ExtractionBuilder, walker: &Walker<'_>, paths: &RdlPaths, root: Node<'_, '_>) {
    for node in walker.find_all(root, paths.data_sources) {
        match rdl_data_source(walker, paths, node) {
            Ok(ds) if builder.has_data_source(&ds.name) => {
                let e = ExtractError::DataSource(format!("duplicate DataSource '{}'", ds.name));
                warn!("{}", e);
                builder.record(e.record());
            }
            Ok(ds) => builder.push_data_source(ds),
            Err(e) => {
                warn!("{}", e);
                builder.record(e.record());
            }
        }
    }

    for node in walker.find_all(root, paths.data_sets) {
        match rdl_data_set(walker, paths, node) {
            Ok(ds) => builder.push_data_set(ds),
            Err(e) => {
                warn!("{}", e);
                builder.record(e.record());
            }
        }
    }
}

fn rdl_data_source(walker: &Walker<'_>, paths: &RdlPaths, node: Node<'_, '_>) -> Result<DataSource> {
    let name = fields::required_attribute(walker, node, paths.name_attribute)
        .map_err(ExtractError::DataSource)?;

    let connect_string = walker
        .find_first(node, paths.connect_string)
        .map(fields::leaf_text)
        .transpose()
        .map_err(|e| ExtractError::DataSource(format!("'{}': {}", name, e)))?;
    let reference = walker
        .find_first(node, paths.data_source_reference)
        .map(text_content);

    Ok(DataSource {
        connection: fields::connection(connect_string.as_deref(), reference.as_deref()),
        name,
    })
}

fn rdl_data_set(walker: &Walker<'_>, paths: &RdlPaths, node: Node<'_, '_>) -> Result<DataSet> {
    let name = fields::required_attribute(walker, node, paths.name_attribute)
        .map_err(ExtractError::DataSet)?;
    let query = walker.find_first(node, paths.query);

    let command_type = match query.and_then(|q| walker.find_first(q, paths.command_type)) {
        Some(leaf) => fields::leaf_text(leaf)
            .and_then(|raw| fields::command_type(Some(&raw)))
            .map_err(|e| ExtractError::DataSet(format!("'{}': {}", name, e)))?,
        None => CommandType::default(),
    };

    // Text is gathered across any nested markup; tool versions wrap it differently.
    let command_text = query
        .and_then(|q| walker.find_first(q, paths.command_text))
        .map(|leaf| fields::normalize_command_text(&text_content(leaf)))
        .unwrap_or_default();

    Ok(DataSet {
        name,
        command_type,
        command_text,
        position: node.range().start,
    })
}

// ============================================================================
// SSIS packages
// ============================================================================

fn extract_ssis(
    builder: &mut ExtractionBuilder,
    walker: &Walker<'_>,
    task_walker: &Walker<'_>,
    paths: &SsisPaths,
    root: Node<'_, '_>,
) {
    for node in walker.find_all(root, paths.connection_managers) {
        match ssis_data_source(walker, paths, node) {
            Ok(ds) if builder.has_data_source(&ds.name) => {
                let e = ExtractError::DataSource(format!("duplicate connection manager '{}'", ds.name));
                warn!("{}", e);
                builder.record(e.record());
            }
            Ok(ds) => builder.push_data_source(ds),
            Err(e) => {
                warn!("{}", e);
                builder.record(e.record());
            }
        }
    }

    for node in walker.find_all(root, paths.executables) {
        let is_sql_task = dts_property(walker, paths, node, "ExecutableType")
            .is_some_and(|t| t.contains("ExecuteSQLTask"));
        if !is_sql_task {
            continue;
        }
        match sql_task(walker, task_walker, paths, node) {
            Ok(ds) => builder.push_data_set(ds),
            Err(e) => {
                warn!("{}", e);
                builder.record(e.record());
            }
        }
    }

    for node in walker.find_all(root, paths.components) {
        let Some(identifier) = walker
            .attribute(node, "refId")
            .or_else(|| walker.attribute(node, "name"))
        else {
            debug!("Component at byte {} has no identifier, skipping", node.range().start);
            continue;
        };
        let class_id = walker.attribute(node, "componentClassID");
        let kind = classifier::classify_component(identifier, class_id);

        if classifier::is_ole_db_source(kind, class_id) {
            match source_query(walker, paths, node, identifier) {
                Ok(Some(ds)) => builder.push_data_set(ds),
                Ok(None) => debug!("OLE DB source '{}' has no query", identifier),
                Err(e) => {
                    warn!("{}", e);
                    builder.record(e.record());
                }
            }
        }

        builder.push_component(PipelineComponent {
            identifier: identifier.to_string(),
            class_id: class_id.map(str::to_string),
            kind,
            position: node.range().start,
        });
    }
}

/// A DTS property, from the attribute form or the legacy
/// `<DTS:Property DTS:Name="...">` element form.
fn dts_property(walker: &Walker<'_>, paths: &SsisPaths, node: Node<'_, '_>, name: &str) -> Option<String> {
    if let Some(value) = walker.attribute(node, name) {
        return Some(value.to_string());
    }
    walker
        .find_all(node, paths.legacy_property)
        .into_iter()
        .find(|p| walker.attribute(*p, "Name") == Some(name))
        .map(text_content)
}

fn ssis_data_source(walker: &Walker<'_>, paths: &SsisPaths, node: Node<'_, '_>) -> Result<DataSource> {
    let name = dts_property(walker, paths, node, "ObjectName")
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ExtractError::DataSource(format!(
                "connection manager at byte {} has no ObjectName",
                node.range().start
            ))
        })?;

    let connect_string = walker
        .find_first(node, paths.connection_object)
        .and_then(|inner| dts_property(walker, paths, inner, "ConnectionString"));

    Ok(DataSource {
        connection: fields::connection(connect_string.as_deref(), None),
        name,
    })
}

fn sql_task(
    walker: &Walker<'_>,
    task_walker: &Walker<'_>,
    paths: &SsisPaths,
    node: Node<'_, '_>,
) -> Result<DataSet> {
    let name = dts_property(walker, paths, node, "ObjectName").ok_or_else(|| {
        ExtractError::DataSet(format!(
            "Execute SQL task at byte {} has no ObjectName",
            node.range().start
        ))
    })?;

    let task_data = task_walker.find_first(node, paths.sql_task_data);
    let statement = task_data
        .and_then(|data| task_walker.attribute(data, "SqlStatementSource"))
        .map(str::to_string)
        .or_else(|| task_walker.find_first(node, paths.statement_element).map(text_content));

    let stored_procedure = task_data
        .and_then(|data| task_walker.attribute(data, "IsStoredProcedure"))
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

    Ok(DataSet {
        name,
        command_type: if stored_procedure {
            CommandType::StoredProcedure
        } else {
            CommandType::Text
        },
        command_text: statement
            .map(|s| fields::normalize_command_text(&s))
            .unwrap_or_default(),
        position: node.range().start,
    })
}

/// Query of an OLE DB source component: `SqlCommand`, or the table named by
/// `OpenRowset` when the access mode is table/view.
fn source_query(
    walker: &Walker<'_>,
    paths: &SsisPaths,
    node: Node<'_, '_>,
    identifier: &str,
) -> Result<Option<DataSet>> {
    let properties = walker.find_all(node, paths.component_properties);
    let property = |name: &str| {
        properties
            .iter()
            .find(|p| walker.attribute(**p, "name") == Some(name))
            .map(|p| fields::normalize_command_text(&text_content(*p)))
            .filter(|v| !v.is_empty())
    };
    let name = walker.attribute(node, "name").unwrap_or(identifier).to_string();
    let position = node.range().start;

    if let Some(sql) = property("SqlCommand") {
        return Ok(Some(DataSet {
            name,
            command_type: CommandType::Text,
            command_text: sql,
            position,
        }));
    }

    let access_mode = match property("AccessMode") {
        Some(raw) => raw.parse::<u8>().map_err(|_| {
            ExtractError::DataSet(format!("'{}': AccessMode '{}' is not a number", name, raw))
        })?,
        None => 0,
    };

    Ok(match (access_mode, property("OpenRowset")) {
        (0 | 1, Some(table)) => Some(DataSet {
            name,
            command_type: CommandType::TableDirect,
            command_text: table,
            position,
        }),
        _ => None,
    })
}
