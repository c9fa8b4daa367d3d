//! Git remote access through the `git` binary.

use std::path::Path;
use std::process::Command;

use super::{GitError, GitRemote};
use crate::io::archive;

const SHALLOW_DEPTH: &str = "--depth=5";

/// A tar export of one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitExport {
    /// Full commit id of the exported tree.
    pub sha: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl GitCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, cwd: Option<&Path>, args: &[&str]) -> Result<Vec<u8>, GitError> {
        let mut cmd = Command::new(&self.program);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        let output = cmd.output().map_err(GitError::Spawn)?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(GitError::Command {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Ask the remote to build the archive itself. Most hosted forges refuse
    /// this, so failure is expected and not logged above debug.
    fn remote_archive(&self, url: &str, reference: &str) -> Result<GitExport, GitError> {
        let data = self.run(
            None,
            &["archive", "--format=tar", "--remote", url, reference],
        )?;
        let sha = archive::tar_commit_id(&data)?.ok_or(GitError::MissingCommitId)?;
        Ok(GitExport { sha, data })
    }

    fn clone_and_archive(&self, url: &str, reference: &str) -> Result<GitExport, GitError> {
        let dir = tempfile::tempdir().map_err(GitError::TempDir)?;
        let repo = dir.path().join("repo.git");
        let repo_arg = repo.to_string_lossy();
        self.run(None, &["clone", "--bare", SHALLOW_DEPTH, url, &repo_arg])?;

        let spec = format!("{reference}^{{commit}}");
        let sha = match self.run(Some(&repo), &["rev-parse", "--verify", &spec]) {
            Ok(out) => out,
            Err(e) => {
                tracing::debug!("{reference} not in shallow clone of {url} ({e}), fetching full history");
                self.run(Some(&repo), &["fetch", "--unshallow", "origin"])?;
                self.run(Some(&repo), &["rev-parse", "--verify", &spec])?
            }
        };
        let sha = String::from_utf8_lossy(&sha).trim().to_string();

        let data = self.run(Some(&repo), &["archive", "--format=tar", &sha])?;
        Ok(GitExport { sha, data })
    }
}

impl GitRemote for GitCli {
    fn export(&self, url: &str, reference: &str) -> Result<GitExport, GitError> {
        match self.remote_archive(url, reference) {
            Ok(export) => {
                tracing::debug!("Remote archive of {url}@{reference} is {}", export.sha);
                Ok(export)
            }
            Err(e) => {
                tracing::debug!("Remote archive of {url}@{reference} unavailable ({e}), cloning");
                self.clone_and_archive(url, reference)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok_and(|o| o.status.success())
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .current_dir(dir)
            .args(args)
            .env("GIT_AUTHOR_NAME", "t")
            .env("GIT_AUTHOR_EMAIL", "t@example.invalid")
            .env("GIT_COMMITTER_NAME", "t")
            .env("GIT_COMMITTER_EMAIL", "t@example.invalid")
            .output()
            .unwrap();
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        String::from_utf8(out.stdout).unwrap().trim().to_string()
    }

    #[test]
    fn test_export_local_repository() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("plugin");
        fs::create_dir_all(&work).unwrap();
        git(&work, &["init", "-q"]);
        fs::write(work.join("plugin.json"), r#"{"name":"MyPlugin"}"#).unwrap();
        git(&work, &["add", "."]);
        git(&work, &["commit", "-q", "-m", "initial"]);
        git(&work, &["tag", "v1.0"]);
        let head = git(&work, &["rev-parse", "HEAD"]);

        let url = format!("file://{}", work.display());
        let export = GitCli::default().export(&url, "v1.0").unwrap();
        assert_eq!(export.sha, head);
        assert!(
            archive::member_names(&export.data)
                .unwrap()
                .contains(&"plugin.json".to_string())
        );
    }

    #[test]
    fn test_unknown_ref_fails() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("plugin");
        fs::create_dir_all(&work).unwrap();
        git(&work, &["init", "-q"]);
        fs::write(work.join("plugin.json"), "{}").unwrap();
        git(&work, &["add", "."]);
        git(&work, &["commit", "-q", "-m", "initial"]);

        let url = format!("file://{}", work.display());
        assert!(GitCli::default().export(&url, "no-such-branch").is_err());
    }
}
