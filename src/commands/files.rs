/// File commands
/// Listing, CRUD and search under Root, plus the recent-files list.

use super::{to_value, AppState};
use crate::error::Result;
use crate::models::SearchOptions;
use serde_json::{json, Value};

pub fn list(state: &AppState, path: &str) -> Result<Value> {
    to_value(state.files.list(path)?)
}

pub fn read(state: &AppState, path: &str) -> Result<Value> {
    to_value(state.files.read(path)?)
}

/// `base64` marks `content` as transport-encoded.
pub fn write(state: &AppState, path: &str, content: &str, base64: bool) -> Result<Value> {
    to_value(state.files.write(path, content, base64)?)
}

pub fn mkdir(state: &AppState, path: &str) -> Result<Value> {
    to_value(state.files.mkdir(path)?)
}

pub fn delete(state: &AppState, path: &str) -> Result<Value> {
    to_value(state.files.delete(path)?)
}

pub fn rename(state: &AppState, old_path: &str, new_path: &str) -> Result<Value> {
    to_value(state.files.rename(old_path, new_path)?)
}

pub fn search(state: &AppState, query: &str, path: &str, options: &SearchOptions) -> Result<Value> {
    to_value(state.files.search(query, path, options)?)
}

pub fn recent_files(state: &AppState, limit: usize) -> Result<Value> {
    Ok(json!({ "files": state.history.recent_files(limit) }))
}
