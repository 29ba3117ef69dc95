//! Document sources for ingestion.
//!
//! A [`DocumentSource`] yields the ordered pages of one document. The
//! built-in [`FileSource`] reads a PDF or text file from disk;
//! [`scan_folder`] discovers files under a folder with include/exclude globs.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::IngestionConfig;
use crate::error::DocumentError;
use crate::extract::{extract_pages, DocumentKind};
use crate::models::Page;

/// One document to ingest.
pub trait DocumentSource: Send + Sync {
    /// Identifier stored as the `source` of every chunk (usually the path).
    fn id(&self) -> &str;

    /// Read and extract the document's pages in order.
    fn load(&self) -> Result<Vec<Page>, DocumentError>;
}

/// A document on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    id: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path.display().to_string();
        Self { path, id }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentSource for FileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> Result<Vec<Page>, DocumentError> {
        let ext = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let kind = DocumentKind::from_extension(&ext)
            .ok_or_else(|| DocumentError::Unsupported(self.id.clone()))?;

        let bytes = std::fs::read(&self.path).map_err(|e| DocumentError::Io {
            path: self.id.clone(),
            source: e,
        })?;

        extract_pages(&bytes, kind, &self.id)
    }
}

/// Find ingestible files under `folder`, sorted by path.
///
/// Returns an error if the folder does not exist.
pub fn scan_folder(folder: &Path, config: &IngestionConfig) -> Result<Vec<FileSource>> {
    if !folder.is_dir() {
        anyhow::bail!("document folder does not exist: {}", folder.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut sources = Vec::new();

    for entry in WalkDir::new(folder) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(folder).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        sources.push(FileSource::new(path));
    }

    // Sort for deterministic ordering
    sources.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(sources)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_folder_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("b.pdf"), b"x").unwrap();
        fs::write(root.join("a.pdf"), b"x").unwrap();
        fs::write(root.join("nested/c.pdf"), b"x").unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();
        fs::write(root.join(".hidden.pdf"), b"x").unwrap();

        let sources = scan_folder(root, &IngestionConfig::default()).unwrap();
        let names: Vec<String> = sources
            .iter()
            .map(|s| s.path().strip_prefix(root).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf", "nested/c.pdf"]);
    }

    #[test]
    fn test_scan_folder_custom_globs() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.pdf"), b"x").unwrap();
        fs::write(tmp.path().join("notes.md"), b"x").unwrap();

        let config = IngestionConfig {
            include_globs: vec!["**/*.pdf".into(), "**/*.md".into()],
            exclude_globs: vec!["**/a.pdf".into()],
            ..IngestionConfig::default()
        };
        let sources = scan_folder(tmp.path(), &config).unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources[0].id().ends_with("notes.md"));
    }

    #[test]
    fn test_scan_missing_folder() {
        let tmp = TempDir::new().unwrap();
        assert!(scan_folder(&tmp.path().join("absent"), &IngestionConfig::default()).is_err());
    }

    #[test]
    fn test_file_source_loads_text() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("coping.txt");
        fs::write(&path, "Name five things you can see.").unwrap();

        let pages = FileSource::new(&path).load().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "Name five things you can see.");
    }

    #[test]
    fn test_file_source_errors() {
        let tmp = TempDir::new().unwrap();
        let missing = FileSource::new(tmp.path().join("missing.pdf"));
        assert!(matches!(missing.load(), Err(DocumentError::Io { .. })));

        let path = tmp.path().join("sheet.xlsx");
        fs::write(&path, b"x").unwrap();
        assert!(matches!(
            FileSource::new(&path).load(),
            Err(DocumentError::Unsupported(_))
        ));
    }
}
