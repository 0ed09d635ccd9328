//! Namespace resolution and the versioned schema registry.
//!
//! Resolution is a pure function of the document text: a streaming pass
//! collects every `xmlns` binding (SSIS packages declare task namespaces on
//! nested elements, so the root alone is not enough), then the registry maps
//! what was found onto a [`ResolvedSchema`] that the walker uses.

use crate::error::{ExtractError, Result};
use crate::model::{SchemaFamily, SchemaVersion};
use crate::walker::Step::{self, Child, Descendant};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use tracing::debug;

pub const RDL_2010_NS: &str =
    "http://schemas.microsoft.com/sqlserver/reporting/2010/01/reportdefinition";
pub const RDL_2016_NS: &str =
    "http://schemas.microsoft.com/sqlserver/reporting/2016/01/reportdefinition";
pub const DTS_NS: &str = "www.microsoft.com/SqlServer/Dts";
pub const SQLTASK_NS: &str = "www.microsoft.com/sqlserver/dts/tasks/sqltask";

/// Element paths for report definitions (2010 and 2016 share a layout).
#[derive(Debug)]
pub struct RdlPaths {
    pub data_sources: &'static [Step],
    pub data_sets: &'static [Step],
    pub query: &'static [Step],
    pub command_type: &'static [Step],
    pub command_text: &'static [Step],
    pub connect_string: &'static [Step],
    pub data_source_reference: &'static [Step],
    pub name_attribute: &'static str,
}

/// Element paths for SSIS packages.
#[derive(Debug)]
pub struct SsisPaths {
    pub connection_managers: &'static [Step],
    pub connection_object: &'static [Step],
    pub executables: &'static [Step],
    pub sql_task_data: &'static [Step],
    pub statement_element: &'static [Step],
    pub components: &'static [Step],
    pub component_properties: &'static [Step],
    pub legacy_property: &'static [Step],
}

pub static RDL_PATHS: RdlPaths = RdlPaths {
    data_sources: &[Descendant("DataSources"), Descendant("DataSource")],
    data_sets: &[Descendant("DataSets"), Descendant("DataSet")],
    query: &[Descendant("Query")],
    command_type: &[Descendant("CommandType")],
    command_text: &[Descendant("CommandText")],
    connect_string: &[Descendant("ConnectString")],
    data_source_reference: &[Descendant("DataSourceReference")],
    name_attribute: "Name",
};

pub static SSIS_PATHS: SsisPaths = SsisPaths {
    connection_managers: &[Descendant("ConnectionManagers"), Child("ConnectionManager")],
    connection_object: &[Child("ObjectData"), Child("ConnectionManager")],
    executables: &[Descendant("Executable")],
    sql_task_data: &[Descendant("SqlTaskData")],
    statement_element: &[Descendant("SqlStatementSource")],
    components: &[Descendant("component")],
    component_properties: &[Child("properties"), Child("property")],
    legacy_property: &[Child("Property")],
};

#[derive(Debug, Clone, Copy)]
pub enum SchemaPaths {
    Rdl(&'static RdlPaths),
    Ssis(&'static SsisPaths),
}

/// Schema identity of one document, resolved once and passed to the walker.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub version: SchemaVersion,
    pub namespace: String,
    /// SQL task namespace, SSIS only.
    pub task_namespace: Option<String>,
    pub paths: SchemaPaths,
}

/// Result of the streaming pass over a document.
#[derive(Debug, Clone, Default)]
pub struct NamespaceScan {
    pub root_name: String,
    pub root_namespace: Option<String>,
    /// prefix → URI; the default namespace is stored under `""`.
    pub bindings: BTreeMap<String, String>,
}

impl NamespaceScan {
    pub fn find_uri(&self, uri: &str) -> Option<&str> {
        self.bindings
            .values()
            .find(|bound| bound.eq_ignore_ascii_case(uri))
            .map(String::as_str)
    }
}

/// Collect every namespace binding declared anywhere in the document.
pub fn scan_namespaces(text: &str) -> Result<NamespaceScan> {
    let mut reader = Reader::from_str(text);
    let mut scan = NamespaceScan::default();
    let mut seen_root = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            ExtractError::FileParse(format!(
                "at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                collect_bindings(e, &mut scan.bindings)?;
                if !seen_root {
                    seen_root = true;
                    let name = e.name();
                    let prefix = name
                        .prefix()
                        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
                        .unwrap_or_default();
                    scan.root_name = String::from_utf8_lossy(name.local_name().as_ref()).into_owned();
                    scan.root_namespace = scan.bindings.get(&prefix).cloned();
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(ExtractError::FileParse("document has no root element".into()));
    }

    debug!(
        "Namespace scan: root <{}> in {:?}, {} binding(s)",
        scan.root_name,
        scan.root_namespace,
        scan.bindings.len()
    );
    Ok(scan)
}

fn collect_bindings(element: &BytesStart<'_>, bindings: &mut BTreeMap<String, String>) -> Result<()> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| ExtractError::FileParse(format!("bad attribute: {}", e)))?;
        let key = attr.key.as_ref();

        let prefix = if key == b"xmlns" {
            String::new()
        } else if let Some(rest) = key.strip_prefix(b"xmlns:") {
            String::from_utf8_lossy(rest).into_owned()
        } else {
            continue;
        };
        let uri = String::from_utf8_lossy(&attr.value).into_owned();

        match bindings.get(&prefix) {
            Some(existing) if *existing != uri => {
                debug!("Prefix '{}' rebound to {} (keeping {})", prefix, uri, existing);
            }
            Some(_) => {}
            None => {
                bindings.insert(prefix, uri);
            }
        }
    }
    Ok(())
}

/// Known namespace URIs per schema version.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    rdl_versions: BTreeMap<String, SchemaVersion>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        let rdl_versions = BTreeMap::from([
            (RDL_2010_NS.to_string(), SchemaVersion::V2010),
            (RDL_2016_NS.to_string(), SchemaVersion::V2016),
        ]);
        Self { rdl_versions }
    }
}

impl SchemaRegistry {
    /// Register extra report-definition URIs under a known version.
    pub fn with_aliases(mut self, aliases: &BTreeMap<String, SchemaVersion>) -> Result<Self> {
        for (uri, version) in aliases {
            if !matches!(version, SchemaVersion::V2010 | SchemaVersion::V2016) {
                return Err(ExtractError::Config(format!(
                    "namespace alias {} must map to v2010 or v2016, got {}",
                    uri, version
                )));
            }
            self.rdl_versions.insert(uri.clone(), *version);
        }
        Ok(self)
    }

    pub fn resolve(&self, family: SchemaFamily, scan: &NamespaceScan) -> Result<ResolvedSchema> {
        match family {
            SchemaFamily::Rdl => self.resolve_rdl(scan),
            SchemaFamily::Ssis => resolve_ssis(scan),
        }
    }

    fn resolve_rdl(&self, scan: &NamespaceScan) -> Result<ResolvedSchema> {
        let namespace = scan.root_namespace.as_deref().unwrap_or_default();
        let version = self.rdl_versions.get(namespace).copied().ok_or_else(|| {
            ExtractError::UnsupportedSchema(format!(
                "root <{}> namespace '{}' is not a known report definition",
                scan.root_name, namespace
            ))
        })?;

        Ok(ResolvedSchema {
            version,
            namespace: namespace.to_string(),
            task_namespace: None,
            paths: SchemaPaths::Rdl(&RDL_PATHS),
        })
    }
}

fn resolve_ssis(scan: &NamespaceScan) -> Result<ResolvedSchema> {
    let namespace = scan.find_uri(DTS_NS).ok_or_else(|| {
        ExtractError::UnsupportedSchema(format!(
            "no DTS namespace declared (root <{}>)",
            scan.root_name
        ))
    })?;

    Ok(ResolvedSchema {
        version: SchemaVersion::SsisDts,
        namespace: namespace.to_string(),
        task_namespace: scan.find_uri(SQLTASK_NS).map(str::to_string),
        paths: SchemaPaths::Ssis(&SSIS_PATHS),
    })
}
