use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::InputConfig;
use crate::models::{Classification, DocumentCandidate};

/// Outcome of walking the input directory.
#[derive(Debug, Clone)]
pub struct Scan {
    /// Selected documents, sorted by relative path.
    pub candidates: Vec<DocumentCandidate>,
    /// Files matching the globs whose name is neither a report nor findings.
    pub ignored: usize,
}

/// Walks `root` and selects PDF files whose name marks them as a draft
/// report or draft findings. A missing root or an empty selection is fatal.
pub fn scan_directory(root: &Path, input: &InputConfig) -> Result<Scan> {
    if !root.exists() {
        bail!("Input directory does not exist: {}", root.display());
    }
    if !root.is_dir() {
        bail!("Input path is not a directory: {}", root.display());
    }

    let include_set = build_globset(&input.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/~$*".to_string()];
    default_excludes.extend(input.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut candidates = Vec::new();
    let mut ignored = 0usize;

    let walker = WalkDir::new(root).follow_links(input.follow_symlinks);
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let classification = Classification::from_file_name(&name);
        if !classification.is_recognized() {
            log::debug!("ignoring {}: not a draft report or findings", rel_str);
            ignored += 1;
            continue;
        }

        candidates.push(DocumentCandidate {
            path: path.to_path_buf(),
            relative_path: rel_str,
            name,
            classification,
        });
    }

    if candidates.is_empty() {
        bail!(
            "No Draft Report or Draft Findings PDFs found in {}",
            root.display()
        );
    }

    // Sort for deterministic ordering
    candidates.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    Ok(Scan {
        candidates,
        ignored,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
