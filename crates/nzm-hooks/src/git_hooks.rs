//! Installing nzm-managed git hooks into a repository.
//!
//! Managed scripts carry the [`MANAGED_MARKER`] line so they can be told
//! apart from hooks written by hand or by other tools. A foreign hook is
//! only replaced with `force`, and is then kept as `<kind>.backup` and
//! chained from the managed script.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use serde::Serialize;

pub const MANAGED_MARKER: &str = "NZM_MANAGED_HOOK";
pub const BINARY_NAME: &str = "nzm";
const BACKUP_SUFFIX: &str = ".backup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GitHookKind {
    PreCommit,
    PrePush,
    CommitMsg,
    PostCommit,
}

impl GitHookKind {
    pub const fn all() -> [GitHookKind; 4] {
        [
            GitHookKind::PreCommit,
            GitHookKind::PrePush,
            GitHookKind::CommitMsg,
            GitHookKind::PostCommit,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GitHookKind::PreCommit => "pre-commit",
            GitHookKind::PrePush => "pre-push",
            GitHookKind::CommitMsg => "commit-msg",
            GitHookKind::PostCommit => "post-commit",
        }
    }
}

impl fmt::Display for GitHookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GitHookKind {
    type Err = GitHookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GitHookError::UnknownKind(s.to_string()))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum GitHookError {
    #[error("not a git repository: {}", .0.display())]
    NotGitRepo(PathBuf),

    #[error("unknown git hook {0:?} (valid: pre-commit, pre-push, commit-msg, post-commit)")]
    UnknownKind(String),

    #[error("{0} hook already exists (use --force to overwrite)")]
    HookExists(GitHookKind),

    #[error("{0} hook not installed")]
    NotInstalled(GitHookKind),

    #[error("{0} hook exists but is not managed by nzm")]
    NotManaged(GitHookKind),

    #[error("{0} hook not yet implemented")]
    NotImplemented(GitHookKind),

    #[error("nzm binary not found")]
    BinaryNotFound,

    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> GitHookError + 'a {
    move |source| GitHookError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// State of one hook slot in `.git/hooks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitHookInfo {
    pub kind: GitHookKind,
    pub path: PathBuf,
    pub installed: bool,
    pub managed: bool,
    pub has_backup: bool,
}

#[derive(Debug, Clone)]
pub struct GitHookManager {
    repo_root: PathBuf,
    hooks_dir: PathBuf,
    binary: Option<PathBuf>,
}

impl GitHookManager {
    /// Manager for the repository containing `path`.
    pub fn new(path: &Path) -> Result<Self, GitHookError> {
        let repo_root = find_repo_root(path)?;
        Ok(Self {
            hooks_dir: repo_root.join(".git").join("hooks"),
            repo_root,
            binary: None,
        })
    }

    /// Use `binary` in generated scripts instead of looking it up.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn hooks_dir(&self) -> &Path {
        &self.hooks_dir
    }

    pub fn hook_path(&self, kind: GitHookKind) -> PathBuf {
        self.hooks_dir.join(kind.as_str())
    }

    fn backup_path(&self, kind: GitHookKind) -> PathBuf {
        self.hooks_dir
            .join(format!("{}{BACKUP_SUFFIX}", kind.as_str()))
    }

    /// Install the managed script for `kind`.
    ///
    /// An existing managed hook is overwritten. A foreign hook needs `force`
    /// and is moved to `<kind>.backup` first.
    pub fn install(&self, kind: GitHookKind, force: bool) -> Result<(), GitHookError> {
        let script = self.generate_script(kind)?;
        let hook_path = self.hook_path(kind);

        match read_optional(&hook_path)? {
            Some(existing) if is_managed(&existing) => {}
            Some(_) if !force => return Err(GitHookError::HookExists(kind)),
            Some(_) => {
                let backup = self.backup_path(kind);
                fs::rename(&hook_path, &backup).map_err(io_err("backing up", &hook_path))?;
                tracing::info!(
                    hook = %kind,
                    backup = %backup.display(),
                    "Backed up existing git hook"
                );
            }
            None => {}
        }

        fs::create_dir_all(&self.hooks_dir).map_err(io_err("creating", &self.hooks_dir))?;
        fs::write(&hook_path, script).map_err(io_err("writing", &hook_path))?;
        make_executable(&hook_path)?;

        tracing::info!(hook = %kind, path = %hook_path.display(), "Installed git hook");
        Ok(())
    }

    /// Remove the managed hook, optionally putting the backup back.
    pub fn uninstall(&self, kind: GitHookKind, restore: bool) -> Result<(), GitHookError> {
        let hook_path = self.hook_path(kind);
        let content = read_optional(&hook_path)?.ok_or(GitHookError::NotInstalled(kind))?;
        if !is_managed(&content) {
            return Err(GitHookError::NotManaged(kind));
        }

        fs::remove_file(&hook_path).map_err(io_err("removing", &hook_path))?;

        let backup = self.backup_path(kind);
        if restore && backup.exists() {
            fs::rename(&backup, &hook_path).map_err(io_err("restoring", &backup))?;
            tracing::info!(hook = %kind, "Restored previous git hook");
        }
        Ok(())
    }

    pub fn status(&self, kind: GitHookKind) -> Result<GitHookInfo, GitHookError> {
        let path = self.hook_path(kind);
        let content = read_optional(&path)?;
        Ok(GitHookInfo {
            kind,
            installed: content.is_some(),
            managed: content.as_deref().is_some_and(is_managed),
            has_backup: self.backup_path(kind).exists(),
            path,
        })
    }

    pub fn list_all(&self) -> Result<Vec<GitHookInfo>, GitHookError> {
        GitHookKind::all()
            .into_iter()
            .map(|kind| self.status(kind))
            .collect()
    }

    fn generate_script(&self, kind: GitHookKind) -> Result<String, GitHookError> {
        match kind {
            GitHookKind::PreCommit => {
                let binary = match &self.binary {
                    Some(binary) => binary.clone(),
                    None => detect_binary()?,
                };
                Ok(pre_commit_script(&binary, &self.repo_root))
            }
            other => Err(GitHookError::NotImplemented(other)),
        }
    }
}

fn find_repo_root(path: &Path) -> Result<PathBuf, GitHookError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(path)
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .map_err(|_| GitHookError::NotGitRepo(path.to_path_buf()))?;
    if !output.status.success() {
        return Err(GitHookError::NotGitRepo(path.to_path_buf()));
    }
    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(PathBuf::from(root))
}

/// `nzm` on `PATH`, else the running executable.
fn detect_binary() -> Result<PathBuf, GitHookError> {
    if let Ok(path) = which::which(BINARY_NAME) {
        return Ok(path);
    }
    std::env::current_exe().map_err(|_| GitHookError::BinaryNotFound)
}

fn read_optional(path: &Path) -> Result<Option<String>, GitHookError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err("reading", path)(e)),
    }
}

fn is_managed(content: &str) -> bool {
    content.contains(MANAGED_MARKER)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), GitHookError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(io_err("setting permissions on", path))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), GitHookError> {
    Ok(())
}

/// Wrap in single quotes; inner `'` becomes `'\''`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn pre_commit_script(binary: &Path, repo_root: &Path) -> String {
    // The repository path only lands in a comment, but a newline would end it.
    let repo = repo_root
        .display()
        .to_string()
        .replace(['\n', '\r'], " ");
    let binary = shell_quote(&binary.display().to_string());

    format!(
        r#"#!/bin/sh
# {MANAGED_MARKER} - Do not edit manually
# Installed by: nzm hooks install pre-commit
# Repository: {repo}

{binary} hooks run pre-commit "$@"
NZM_EXIT=$?

BACKUP_HOOK="$(dirname "$0")/pre-commit{BACKUP_SUFFIX}"
if [ -x "$BACKUP_HOOK" ]; then
    "$BACKUP_HOOK" "$@"
    BACKUP_EXIT=$?
    if [ $NZM_EXIT -ne 0 ] || [ $BACKUP_EXIT -ne 0 ]; then
        exit 1
    fi
fi

exit $NZM_EXIT
"#
    )
}

#[cfg(test)]
#[path = "git_hooks_tests.rs"]
mod tests;
