/// Git commands
/// Thin mapping onto the version-control adapter.

use super::{to_value, AppState};
use crate::error::Result;
use serde_json::Value;

pub fn status(state: &AppState) -> Result<Value> {
    to_value(state.git.status()?)
}

pub fn stage(state: &AppState, files: &[String]) -> Result<Value> {
    to_value(state.git.stage(files)?)
}

pub fn unstage(state: &AppState, files: &[String]) -> Result<Value> {
    to_value(state.git.unstage(files)?)
}

pub fn commit(state: &AppState, message: &str) -> Result<Value> {
    to_value(state.git.commit(message)?)
}

pub fn push(state: &AppState) -> Result<Value> {
    to_value(state.git.push()?)
}

pub fn pull(state: &AppState) -> Result<Value> {
    to_value(state.git.pull()?)
}

pub fn diff(state: &AppState, file: Option<&str>, staged: bool) -> Result<Value> {
    to_value(state.git.diff(file, staged)?)
}
