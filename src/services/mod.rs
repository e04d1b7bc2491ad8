/// Services module
/// Business logic for files, commands, terminals and version control.
/// Separated from commands module, which only maps requests onto these.

pub mod command_runner;
pub mod file_store;
pub mod git;
pub mod history;
pub mod language;
pub mod path_guard;
pub mod pty;
pub mod search;
pub mod supervisor;
pub mod terminal;

pub use command_runner::CommandRunner;
pub use file_store::{FileOptions, FileStore};
pub use git::{GitCli, VersionControl};
pub use history::{HistoryStore, JsonHistory, MemoryHistory, Retention};
pub use path_guard::PathGuard;
pub use supervisor::{SupervisorOptions, TerminalSupervisor};
pub use terminal::{SessionRegistry, TerminalOptions};
