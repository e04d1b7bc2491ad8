/// Version control
/// Narrow adapter over the `git` binary, run in Root with explicit argument
/// vectors. No shell is involved.

use crate::error::{IdeError, Result};
use crate::models::{GitFileStatus, GitOutput, GitStatus};
use crate::services::path_guard::PathGuard;
use std::io::ErrorKind;
use std::process::{Command, Stdio};

pub trait VersionControl: Send + Sync {
    fn status(&self) -> Result<GitStatus>;
    /// An empty list stages everything.
    fn stage(&self, paths: &[String]) -> Result<GitOutput>;
    /// An empty list unstages everything.
    fn unstage(&self, paths: &[String]) -> Result<GitOutput>;
    fn commit(&self, message: &str) -> Result<GitOutput>;
    fn push(&self) -> Result<GitOutput>;
    fn pull(&self) -> Result<GitOutput>;
    fn diff(&self, path: Option<&str>, staged: bool) -> Result<GitOutput>;
}

pub struct GitCli {
    guard: PathGuard,
    program: String,
}

impl GitCli {
    pub fn new(guard: PathGuard) -> Self {
        Self {
            guard,
            program: "git".to_string(),
        }
    }

    /// Use a different executable than `git` from PATH.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn run(&self, args: &[String]) -> Result<String> {
        log::debug!("[Git] git {}", args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(self.guard.root())
            // Never block on a credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => IdeError::DependencyMissing(format!("{} not found", self.program)),
                _ => IdeError::ProcessSpawnFailed(e.to_string()),
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if output.status.success() {
            Ok(combined)
        } else {
            log::warn!("[Git] git {} failed: {}", args.first().map(String::as_str).unwrap_or(""), output.status);
            Err(IdeError::CommandFailed(combined.trim().to_string()))
        }
    }

    /// Root-relative pathspecs, each validated first.
    fn pathspecs(&self, paths: &[String]) -> Result<Vec<String>> {
        paths
            .iter()
            .map(|p| {
                let resolved = self.guard.validate(p)?;
                let relative = resolved
                    .strip_prefix(self.guard.root())
                    .map(|r| r.display().to_string())
                    .unwrap_or_default();
                Ok(if relative.is_empty() { ".".to_string() } else { relative })
            })
            .collect()
    }
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl VersionControl for GitCli {
    fn status(&self) -> Result<GitStatus> {
        let raw = self.run(&args(&["status", "--porcelain=v1", "-b"]))?;
        Ok(parse_status(&raw))
    }

    fn stage(&self, paths: &[String]) -> Result<GitOutput> {
        let mut argv = args(&["add"]);
        if paths.is_empty() {
            argv.push("-A".into());
        } else {
            argv.push("--".into());
            argv.extend(self.pathspecs(paths)?);
        }
        Ok(GitOutput { output: self.run(&argv)? })
    }

    fn unstage(&self, paths: &[String]) -> Result<GitOutput> {
        let mut argv = args(&["restore", "--staged", "--"]);
        if paths.is_empty() {
            argv.push(".".into());
        } else {
            argv.extend(self.pathspecs(paths)?);
        }
        Ok(GitOutput { output: self.run(&argv)? })
    }

    fn commit(&self, message: &str) -> Result<GitOutput> {
        if message.trim().is_empty() {
            return Err(IdeError::InvalidRequest("message is required".into()));
        }
        Ok(GitOutput {
            output: self.run(&args(&["commit", "-m", message]))?,
        })
    }

    fn push(&self) -> Result<GitOutput> {
        Ok(GitOutput { output: self.run(&args(&["push"]))? })
    }

    fn pull(&self) -> Result<GitOutput> {
        Ok(GitOutput { output: self.run(&args(&["pull"]))? })
    }

    fn diff(&self, path: Option<&str>, staged: bool) -> Result<GitOutput> {
        let mut argv = args(&["diff"]);
        if staged {
            argv.push("--staged".into());
        }
        if let Some(path) = path.filter(|p| !p.is_empty()) {
            argv.push("--".into());
            argv.extend(self.pathspecs(&[path.to_string()])?);
        }
        Ok(GitOutput { output: self.run(&argv)? })
    }
}

/// Parse `git status --porcelain=v1 -b`.
pub fn parse_status(raw: &str) -> GitStatus {
    let mut status = GitStatus::default();
    for line in raw.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            parse_branch_header(header, &mut status);
            continue;
        }
        if line.len() < 4 {
            continue;
        }
        let (code, file) = line.split_at(2);
        let file = file.trim_start();
        // Renames are reported as "old -> new".
        let file = file.rsplit(" -> ").next().unwrap_or(file).to_string();
        let mut chars = code.chars();
        let index = chars.next().unwrap_or(' ');
        let worktree = chars.next().unwrap_or(' ');

        if index == '?' {
            status.untracked.push(file);
            continue;
        }
        if index != ' ' && index != '!' {
            status.staged.push(GitFileStatus {
                status: index.to_string(),
                file: file.clone(),
            });
        }
        if worktree != ' ' && worktree != '!' {
            status.unstaged.push(GitFileStatus {
                status: worktree.to_string(),
                file,
            });
        }
    }
    status
}

fn parse_branch_header(header: &str, status: &mut GitStatus) {
    if let Some(branch) = header.strip_prefix("No commits yet on ") {
        status.branch = branch.trim().to_string();
        return;
    }
    let (names, tracking) = match header.find(" [") {
        Some(at) => (&header[..at], Some(header[at + 2..].trim_end_matches(']'))),
        None => (header, None),
    };
    match names.split_once("...") {
        Some((branch, upstream)) => {
            status.branch = branch.to_string();
            status.upstream = Some(upstream.to_string());
        }
        None => status.branch = names.to_string(),
    }
    for part in tracking.into_iter().flat_map(|t| t.split(", ")) {
        if let Some(n) = part.strip_prefix("ahead ") {
            status.ahead = n.parse().unwrap_or(0);
        } else if let Some(n) = part.strip_prefix("behind ") {
            status.behind = n.parse().unwrap_or(0);
        }
    }
}
