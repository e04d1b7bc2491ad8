/// Terminal commands
/// Lifecycle of the terminal-host process.

use super::{to_value, AppState};
use crate::error::Result;
use serde_json::Value;

pub fn status(state: &AppState) -> Result<Value> {
    to_value(state.supervisor.status())
}

pub fn start(state: &AppState) -> Result<Value> {
    to_value(state.supervisor.start()?)
}

pub fn stop(state: &AppState) -> Result<Value> {
    to_value(state.supervisor.stop()?)
}
