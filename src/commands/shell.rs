/// Shell commands
/// One-shot command execution confined to Root, and its history.
/// This is also the fallback the client uses when no interactive
/// terminal is available.

use super::{to_value, AppState};
use crate::error::Result;
use serde_json::{json, Value};

pub fn exec(state: &AppState, command: &str, cwd: Option<&str>) -> Result<Value> {
    to_value(state.runner.exec(command, cwd)?)
}

/// Previously executed commands, newest first.
pub fn history(state: &AppState, limit: usize) -> Result<Value> {
    let commands: Vec<String> = state
        .history
        .commands(limit)
        .into_iter()
        .map(|record| record.command)
        .collect();
    Ok(json!({ "history": commands }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::super::tests::state;
    use super::*;

    #[test]
    fn exec_results_and_history() {
        let (_dir, state) = state();
        let result = exec(&state, "echo hi", None).unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["output"], "hi\n");
        assert_eq!(result["exit_code"], 0);
        assert!(result.get("timed_out").is_none());

        exec(&state, "exit 2", None).unwrap();
        let recorded = history(&state, 100).unwrap();
        assert_eq!(recorded["history"], json!(["exit 2", "echo hi"]));
    }
}
