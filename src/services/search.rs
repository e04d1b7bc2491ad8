/// Recursive file search below a validated directory.

use crate::error::{IdeError, Result};
use crate::models::{SearchHit, SearchOptions, SearchResults};
use crate::services::file_store::is_binary_content;
use crate::services::path_guard::PathGuard;
use glob::Pattern;
use regex::{Regex, RegexBuilder};
use std::path::Path;
use walkdir::WalkDir;

/// Files at or above this size are matched by name only.
const MAX_CONTENT_SCAN: u64 = 1024 * 1024;

fn build_matcher(query: &str, options: &SearchOptions) -> Result<Regex> {
    let pattern = if options.is_regex {
        query.to_string()
    } else {
        regex::escape(query)
    };
    RegexBuilder::new(&pattern)
        .case_insensitive(!options.case_sensitive)
        .build()
        .map_err(|e| IdeError::InvalidRequest(format!("invalid regex: {e}")))
}

pub(crate) fn search_tree(
    guard: &PathGuard,
    show_hidden: bool,
    dir: &Path,
    query: &str,
    options: &SearchOptions,
) -> Result<SearchResults> {
    if query.is_empty() {
        return Err(IdeError::InvalidRequest("query is required".into()));
    }
    let matcher = build_matcher(query, options)?;
    let file_pattern = Pattern::new(&options.file_pattern)
        .map_err(|e| IdeError::InvalidRequest(format!("invalid file pattern: {e}")))?;
    let max_results = options.max_results.max(1);

    let mut results = Vec::new();
    let mut total = 0usize;

    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            if !show_hidden && entry.file_name().to_string_lossy().starts_with('.') {
                return false;
            }
            guard.denied_segment(entry.path()).is_none()
        });

    for entry in walker.filter_map(|e| e.ok()) {
        if total >= max_results {
            break;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !file_pattern.matches(&name) {
            continue;
        }
        let path = entry.path();
        let file = path.display().to_string();
        let relative_path = guard.relative(path);

        if !options.include_content {
            if let Some(found) = matcher.find(&name) {
                total += 1;
                results.push(SearchHit {
                    file,
                    relative_path,
                    line: 0,
                    matched: found.as_str().to_string(),
                    content: name.to_string(),
                });
            }
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
        if size >= MAX_CONTENT_SCAN {
            continue;
        }
        let Ok(bytes) = std::fs::read(path) else {
            continue;
        };
        if is_binary_content(&bytes) {
            continue;
        }
        let text = String::from_utf8_lossy(&bytes);
        for (index, line) in text.lines().enumerate() {
            for found in matcher.find_iter(line) {
                total += 1;
                if results.len() < max_results {
                    results.push(SearchHit {
                        file: file.clone(),
                        relative_path: relative_path.clone(),
                        line: index + 1,
                        matched: found.as_str().to_string(),
                        content: line.trim().to_string(),
                    });
                }
            }
        }
    }

    Ok(SearchResults {
        query: query.to_string(),
        path: dir.display().to_string(),
        results,
        total,
    })
}
