//! Batch driver: file discovery, bounded concurrent extraction and the run
//! summary.
//!
//! Results come back in traversal order whatever the worker count, so two
//! runs over an unchanged tree produce identical tables.

use crate::config::FamilyMode;
use crate::error::{ErrorKind, ExtractError, Result};
use crate::extractor::Extractor;
use crate::flatten;
use crate::model::{ExtractionResult, ReportDocument, SchemaFamily};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Category directory depth of report files under the root.
const CATEGORY_DEPTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub category: String,
    pub family: SchemaFamily,
}

/// Collect the files under `root` for `mode`, in lexicographic traversal order.
///
/// Report definitions are only picked up one directory below the root (the
/// category layout); packages are found at any depth. An unreadable root is
/// an error, an unreadable entry below it is logged and skipped.
pub fn discover(root: &Path, mode: FamilyMode) -> Result<Vec<SourceFile>> {
    std::fs::read_dir(root)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(family) = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(SchemaFamily::from_extension)
        else {
            continue;
        };

        let wanted = match (mode, family) {
            (FamilyMode::Rdl | FamilyMode::Auto, SchemaFamily::Rdl) => entry.depth() == CATEGORY_DEPTH,
            (FamilyMode::Ssis | FamilyMode::Auto, SchemaFamily::Ssis) => true,
            _ => false,
        };
        if !wanted {
            debug!("Ignoring {:?} (depth {})", entry.path(), entry.depth());
            continue;
        }

        files.push(SourceFile {
            category: category_of(root, entry.path()),
            path: entry.into_path(),
            family,
        });
    }

    info!("Discovered {} file(s) under {:?}", files.len(), root);
    Ok(files)
}

/// Parent directory relative to the root, `/`-joined; `.` for the root itself.
fn category_of(root: &Path, path: &Path) -> String {
    let parent = path
        .parent()
        .and_then(|p| p.strip_prefix(root).ok())
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();

    if parent.is_empty() {
        ".".to_string()
    } else {
        parent
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub processed: usize,
    /// Files that contributed nothing (unsupported schema or malformed).
    pub errored: usize,
    pub entity_errors: usize,
    pub rows: usize,
}

/// A recorded error with the file it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributedError {
    pub category: String,
    pub file: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorReport<'a> {
    pub summary: &'a BatchSummary,
    pub errors: Vec<AttributedError>,
    pub documents: Vec<&'a ReportDocument>,
}

#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<ExtractionResult>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn attributed_errors(&self) -> Vec<AttributedError> {
        self.results
            .iter()
            .flat_map(|result| {
                let doc = result.document();
                result.errors().iter().map(move |e| AttributedError {
                    category: doc.category.clone(),
                    file: doc.name.clone(),
                    kind: e.kind,
                    message: e.message.clone(),
                })
            })
            .collect()
    }

    pub fn error_report(&self) -> ErrorReport<'_> {
        ErrorReport {
            summary: &self.summary,
            errors: self.attributed_errors(),
            documents: self.results.iter().map(|r| r.document()).collect(),
        }
    }
}

/// Runs the extractor over many files with at most `jobs` in flight.
#[derive(Debug, Clone)]
pub struct BatchDriver {
    extractor: Arc<Extractor>,
    jobs: usize,
}

impl BatchDriver {
    pub fn new(extractor: Extractor, jobs: usize) -> Self {
        Self {
            extractor: Arc::new(extractor),
            jobs: jobs.max(1),
        }
    }

    /// Never fails: a file that cannot be processed is a failed result.
    pub async fn run(&self, files: Vec<SourceFile>) -> BatchReport {
        let run_id = Uuid::new_v4();
        info!("Run {}: extracting {} file(s) with {} worker(s)", run_id, files.len(), self.jobs);

        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut handles = Vec::with_capacity(files.len());

        for file in &files {
            let extractor = Arc::clone(&self.extractor);
            let permit = Arc::clone(&semaphore);
            let file = file.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit
                    .acquire_owned()
                    .await
                    .map_err(|e| ExtractError::Worker(e.to_string()))?;
                tokio::task::spawn_blocking(move || {
                    extractor.extract_file(&file.path, &file.category, file.family)
                })
                .await
                .map_err(|e| ExtractError::Worker(e.to_string()))
            }));
        }

        let mut results = Vec::with_capacity(files.len());
        for (file, handle) in files.into_iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ExtractError::Worker(e.to_string())),
            };
            let result = outcome.unwrap_or_else(|e| {
                error!("Worker for {:?} failed: {}", file.path, e);
                ExtractionResult::failed(ReportDocument::new(file.path, file.category), e.record())
            });
            results.push(result);
        }

        let summary = BatchSummary {
            run_id,
            processed: results.len(),
            errored: results.iter().filter(|r| r.is_failed()).count(),
            entity_errors: results.iter().map(|r| r.entity_error_count()).sum(),
            rows: results.iter().map(|r| flatten::flatten(r).len()).sum(),
        };
        info!(
            "Run {} complete: {} processed, {} errored, {} entity error(s), {} row(s)",
            run_id, summary.processed, summary.errored, summary.entity_errors, summary.rows
        );

        BatchReport { results, summary }
    }
}
