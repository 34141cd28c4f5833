//! File listing for the rule editor's file picker.

use std::path::Path;

use ignore::WalkBuilder;
use tracing::debug;

use crate::error::{Error, Result};

/// Limits applied by [`list`].
#[derive(Debug, Clone)]
pub struct ListOptions<'a> {
    /// Maximum directory depth below the project root.
    pub max_depth: usize,
    /// Maximum number of paths returned.
    pub limit: usize,
    /// Directory names that are never entered.
    pub ignored_dirs: &'a [String],
}

/// List files under `project` as `/`-separated paths relative to it.
///
/// Hidden entries and `ignored_dirs` are skipped. `.gitignore` files are
/// not consulted. The result is sorted and truncated to `limit`.
///
/// # Errors
///
/// Returns an error if `project` is not a directory.
pub fn list(project: &Path, options: &ListOptions<'_>) -> Result<Vec<String>> {
    if !project.is_dir() {
        return Err(Error::invalid_input(format!(
            "{} is not a directory",
            project.display()
        )));
    }

    let ignored: Vec<String> = options.ignored_dirs.to_vec();
    let walker = WalkBuilder::new(project)
        .max_depth(Some(options.max_depth))
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir
                && entry.depth() > 0
                && ignored
                    .iter()
                    .any(|name| entry.file_name().to_str() == Some(name.as_str())))
        })
        .build();

    let mut files: Vec<String> = walker
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(project).ok()?;
            let parts: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(parts.join("/"))
        })
        .collect();

    files.sort();
    debug!(
        total = files.len(),
        limit = options.limit,
        "Listed files in {}",
        project.display()
    );
    files.truncate(options.limit);
    Ok(files)
}
