//! [`VersionControl`] implemented on the `git` command-line tool.

use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;

use super::{BranchScope, BranchStatus, GitError, GitResult, PushRequest, VersionControl};

/// Identity used for creating commits.
///
/// Passed via `-c` flags so commits can be created without relying on the
/// user's git configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    /// The committer/author name (git `user.name`).
    pub name: String,

    /// The committer/author email (git `user.email`).
    pub email: String,
}

/// A working copy driven through the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
    remote: String,
    identity: Option<CommitIdentity>,
    isolated: bool,
}

impl GitCli {
    /// Operates on the working copy at `workdir`, pushing to `remote`.
    pub fn new(workdir: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        GitCli {
            workdir: workdir.into(),
            remote: remote.into(),
            identity: None,
            isolated: false,
        }
    }

    /// Commits with this identity instead of the configured one.
    pub fn with_identity(mut self, identity: CommitIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Ignores system and global git configuration (hooks, aliases, rerere).
    pub fn isolated(mut self) -> Self {
        self.isolated = true;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.workdir);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        if self.isolated {
            cmd.env("GIT_CONFIG_NOSYSTEM", "1");
            cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
        }
        if let Some(identity) = &self.identity {
            cmd.arg("-c").arg(format!("user.name={}", identity.name));
            cmd.arg("-c").arg(format!("user.email={}", identity.email));
        }
        cmd
    }

    /// Runs git and returns its output whatever the exit status.
    async fn output(&self, args: &[&str]) -> GitResult<Output> {
        Ok(self.command().args(args).output().await?)
    }

    /// Runs git, failing on a non-zero exit status.
    async fn run(&self, args: &[&str]) -> GitResult<Output> {
        let output = self.output(args).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn stdout(&self, args: &[&str]) -> GitResult<String> {
        let output = self.run(args).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Maps exit code 0 to true and `false_code` to false; anything else fails.
    async fn probe(&self, args: &[&str], false_code: i32) -> GitResult<bool> {
        let output = self.output(args).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(code) if code == false_code => Ok(false),
            _ => Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

impl VersionControl for GitCli {
    async fn current_branch(&self) -> GitResult<String> {
        let output = self
            .output(&["symbolic-ref", "--quiet", "--short", "HEAD"])
            .await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(GitError::DetachedHead)
        }
    }

    async fn branch_exists(&self, name: &str, scope: BranchScope) -> GitResult<bool> {
        match scope {
            BranchScope::Local => {
                let refname = format!("refs/heads/{}", name);
                self.probe(&["show-ref", "--verify", "--quiet", &refname], 1)
                    .await
            }
            BranchScope::Remote => {
                // Exit code 2 means "no matching refs".
                self.probe(
                    &["ls-remote", "--exit-code", "--heads", &self.remote, name],
                    2,
                )
                .await
            }
        }
    }

    async fn create_branch(&self, name: &str, base: &str) -> GitResult<()> {
        self.run(&["checkout", "-b", name, base]).await?;
        Ok(())
    }

    async fn checkout(&self, name: &str) -> GitResult<()> {
        self.run(&["checkout", name]).await?;
        Ok(())
    }

    async fn commit(&self, message: &str) -> GitResult<()> {
        self.run(&["add", "--all"]).await?;
        self.run(&["commit", "--message", message]).await?;
        Ok(())
    }

    async fn push(&self, request: &PushRequest) -> GitResult<()> {
        let refspec = format!("{}:refs/heads/{}", request.branch, request.target_branch());
        let mut args = vec!["push"];
        if request.force_with_lease {
            args.push("--force-with-lease");
        }
        if request.set_upstream {
            args.push("--set-upstream");
        }
        args.push(&self.remote);
        args.push(&refspec);

        match self.run(&args).await {
            Ok(_) => Ok(()),
            Err(GitError::CommandFailed { stderr, .. }) if stderr.contains("rejected") => {
                Err(GitError::PushRejected { details: stderr })
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_branch(&self, name: &str, scope: BranchScope) -> GitResult<()> {
        match scope {
            BranchScope::Local => self.run(&["branch", "-D", name]).await?,
            BranchScope::Remote => self.run(&["push", &self.remote, "--delete", name]).await?,
        };
        Ok(())
    }

    async fn has_uncommitted_changes(&self) -> GitResult<bool> {
        let status = self.stdout(&["status", "--porcelain"]).await?;
        Ok(!status.is_empty())
    }

    async fn branch_status(&self) -> GitResult<BranchStatus> {
        let is_clean = !self.has_uncommitted_changes().await?;

        let upstream = self
            .output(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
            .await?;
        if !upstream.status.success() {
            return Ok(BranchStatus {
                ahead: 0,
                behind: 0,
                is_clean,
                has_remote: false,
            });
        }

        let counts = self
            .stdout(&["rev-list", "--left-right", "--count", "@{u}...HEAD"])
            .await?;
        let mut parts = counts.split_whitespace().map(|n| n.parse::<u32>());
        let (behind, ahead) = match (parts.next(), parts.next()) {
            (Some(Ok(behind)), Some(Ok(ahead))) => (behind, ahead),
            _ => {
                return Err(GitError::CommandFailed {
                    command: "git rev-list --left-right --count @{u}...HEAD".to_string(),
                    stderr: format!("unexpected output: {}", counts),
                });
            }
        };

        Ok(BranchStatus {
            ahead,
            behind,
            is_clean,
            has_remote: true,
        })
    }

    async fn commits_since(&self, base: &str) -> GitResult<u32> {
        let range = format!("{}..HEAD", base);
        let count = self.stdout(&["rev-list", "--count", &range]).await?;
        count.parse().map_err(|_| GitError::CommandFailed {
            command: format!("git rev-list --count {}", range),
            stderr: format!("unexpected output: {}", count),
        })
    }

    async fn fetch(&self) -> GitResult<()> {
        self.run(&["fetch", "--prune", &self.remote]).await?;
        Ok(())
    }

    async fn rebase_onto(&self, base: &str) -> GitResult<()> {
        let upstream = format!("{}/{}", self.remote, base);
        let output = self.output(&["rebase", &upstream]).await?;
        if output.status.success() {
            return Ok(());
        }

        // Only a rebase stopped on conflicting changes is a conflict; a bad
        // upstream or any other failure leaves no rebase in progress.
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stopped = self
            .probe(&["rev-parse", "-q", "--verify", "REBASE_HEAD"], 1)
            .await
            .unwrap_or(false);
        if !stopped && !stderr.contains("CONFLICT") {
            return Err(GitError::CommandFailed {
                command: format!("git rebase {}", upstream),
                stderr,
            });
        }
        if let Err(e) = self.run(&["rebase", "--abort"]).await {
            tracing::warn!(error = %e, "git rebase --abort failed");
        }
        Err(GitError::RebaseConflict { onto: upstream })
    }

    async fn remote_url(&self) -> GitResult<Option<String>> {
        let output = self.output(&["remote", "get-url", &self.remote]).await?;
        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity() -> CommitIdentity {
        CommitIdentity {
            name: "Test".to_string(),
            email: "test@test.com".to_string(),
        }
    }

    /// A working copy on `main` with one commit, plus a bare `origin`.
    async fn repo() -> (TempDir, GitCli) {
        let dir = TempDir::new().unwrap();
        let origin = dir.path().join("origin.git");
        let work = dir.path().join("work");
        std::fs::create_dir_all(&origin).unwrap();
        std::fs::create_dir_all(&work).unwrap();

        let bare = GitCli::new(&origin, "origin").isolated();
        bare.run(&["init", "--bare"]).await.unwrap();

        let git = GitCli::new(&work, "origin")
            .isolated()
            .with_identity(identity());
        git.run(&["init"]).await.unwrap();
        git.run(&["checkout", "-b", "main"]).await.unwrap();
        std::fs::write(work.join("README.md"), "# test\n").unwrap();
        git.commit("initial").await.unwrap();
        git.run(&["remote", "add", "origin", origin.to_str().unwrap()])
            .await
            .unwrap();
        git.push(&PushRequest::branch("main")).await.unwrap();
        (dir, git)
    }

    #[tokio::test]
    async fn reports_current_branch() {
        let (_dir, git) = repo().await;
        assert_eq!(git.current_branch().await.unwrap(), "main");
    }

    #[tokio::test]
    async fn create_branch_checks_it_out() {
        let (_dir, git) = repo().await;
        assert!(
            !git.branch_exists("feature/a", BranchScope::Local)
                .await
                .unwrap()
        );
        git.create_branch("feature/a", "main").await.unwrap();
        assert_eq!(git.current_branch().await.unwrap(), "feature/a");
        assert!(
            git.branch_exists("feature/a", BranchScope::Local)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn commit_clears_uncommitted_changes() {
        let (_dir, git) = repo().await;
        assert!(!git.has_uncommitted_changes().await.unwrap());
        std::fs::write(git.workdir().join("new.txt"), "x").unwrap();
        assert!(git.has_uncommitted_changes().await.unwrap());
        git.commit("add new").await.unwrap();
        assert!(!git.has_uncommitted_changes().await.unwrap());
    }

    #[tokio::test]
    async fn counts_commits_since_base() {
        let (_dir, git) = repo().await;
        git.create_branch("feature/a", "main").await.unwrap();
        assert_eq!(git.commits_since("main").await.unwrap(), 0);
        std::fs::write(git.workdir().join("a.txt"), "a").unwrap();
        git.commit("a").await.unwrap();
        assert_eq!(git.commits_since("main").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn status_without_upstream() {
        let (_dir, git) = repo().await;
        git.create_branch("feature/a", "main").await.unwrap();
        let status = git.branch_status().await.unwrap();
        assert!(!status.has_remote);
        assert!(status.is_clean);
    }

    #[tokio::test]
    async fn push_sets_upstream_and_counts_ahead() {
        let (_dir, git) = repo().await;
        git.create_branch("feature/a", "main").await.unwrap();
        git.push(&PushRequest::branch("feature/a")).await.unwrap();
        assert!(
            git.branch_exists("feature/a", BranchScope::Remote)
                .await
                .unwrap()
        );

        std::fs::write(git.workdir().join("a.txt"), "a").unwrap();
        git.commit("a").await.unwrap();
        let status = git.branch_status().await.unwrap();
        assert!(status.has_remote);
        assert_eq!(status.ahead, 1);
        assert_eq!(status.behind, 0);
    }

    #[tokio::test]
    async fn delete_local_and_remote_branch() {
        let (_dir, git) = repo().await;
        git.create_branch("feature/a", "main").await.unwrap();
        git.push(&PushRequest::branch("feature/a")).await.unwrap();
        git.checkout("main").await.unwrap();

        git.delete_branch("feature/a", BranchScope::Local)
            .await
            .unwrap();
        git.delete_branch("feature/a", BranchScope::Remote)
            .await
            .unwrap();
        assert!(
            !git.branch_exists("feature/a", BranchScope::Local)
                .await
                .unwrap()
        );
        assert!(
            !git.branch_exists("feature/a", BranchScope::Remote)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn rebase_onto_moves_branch_past_base() {
        let (_dir, git) = repo().await;
        git.create_branch("feature/a", "main").await.unwrap();
        std::fs::write(git.workdir().join("a.txt"), "a").unwrap();
        git.commit("a").await.unwrap();

        git.checkout("main").await.unwrap();
        std::fs::write(git.workdir().join("b.txt"), "b").unwrap();
        git.commit("b").await.unwrap();
        git.push(&PushRequest::branch("main")).await.unwrap();

        git.checkout("feature/a").await.unwrap();
        git.fetch().await.unwrap();
        git.rebase_onto("main").await.unwrap();
        assert!(git.workdir().join("b.txt").exists());
        assert!(git.workdir().join("a.txt").exists());
    }

    #[tokio::test]
    async fn rebase_with_conflicting_edits_is_a_conflict_and_aborted() {
        let (_dir, git) = repo().await;
        git.create_branch("feature/a", "main").await.unwrap();
        std::fs::write(git.workdir().join("README.md"), "# feature\n").unwrap();
        git.commit("feature readme").await.unwrap();

        git.checkout("main").await.unwrap();
        std::fs::write(git.workdir().join("README.md"), "# main\n").unwrap();
        git.commit("main readme").await.unwrap();
        git.push(&PushRequest::branch("main")).await.unwrap();

        git.checkout("feature/a").await.unwrap();
        git.fetch().await.unwrap();
        let err = git.rebase_onto("main").await.unwrap_err();
        assert!(matches!(err, GitError::RebaseConflict { onto } if onto == "origin/main"));

        // The rebase was abandoned: back on the branch with its own content.
        assert_eq!(git.current_branch().await.unwrap(), "feature/a");
        assert!(!git.has_uncommitted_changes().await.unwrap());
        let readme = std::fs::read_to_string(git.workdir().join("README.md")).unwrap();
        assert_eq!(readme, "# feature\n");
    }

    #[tokio::test]
    async fn rebase_onto_missing_upstream_is_a_command_failure() {
        let (_dir, git) = repo().await;
        let err = git.rebase_onto("no-such-base").await.unwrap_err();
        assert!(matches!(err, GitError::CommandFailed { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn remote_url_of_unknown_remote_is_none() {
        let (_dir, git) = repo().await;
        assert!(git.remote_url().await.unwrap().is_some());
        let other = GitCli::new(git.workdir(), "upstream").isolated();
        assert!(other.remote_url().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_command_reports_stderr() {
        let (_dir, git) = repo().await;
        let err = git.checkout("does-not-exist").await.unwrap_err();
        assert!(matches!(err, GitError::CommandFailed { .. }));
    }
}
