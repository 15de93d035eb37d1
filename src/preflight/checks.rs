//! Reusable checks.
//!
//! Each function is one check: register it with
//! `checklist.check(|| checks::clean_working_tree(git))`. Collaborator errors
//! become failed results rather than propagating, so a broken check never
//! aborts the run of the others.

use crate::git::{BranchScope, VersionControl};
use crate::persistence::SessionStore;
use crate::platform::PullRequestLookup;
use crate::types::{SessionId, WorkflowState};
use crate::validation::{
    BranchValidator, PrConflictCheck, PrConflictValidator, validate_branch_name,
};

use super::check::CheckResult;

// ─── Pre-flight ──────────────────────────────────────────────────────────────

pub async fn clean_working_tree<G: VersionControl>(git: &G) -> CheckResult {
    const NAME: &str = "clean working tree";
    match git.has_uncommitted_changes().await {
        Ok(false) => CheckResult::pass(NAME),
        Ok(true) => CheckResult::fail(NAME, "uncommitted changes present").with_suggestions([
            "commit or stash your changes first".to_string(),
        ]),
        Err(e) => CheckResult::fail(NAME, e.to_string()),
    }
}

pub async fn branch_name_syntax(name: &str) -> CheckResult {
    const NAME: &str = "branch name syntax";
    match validate_branch_name(name) {
        Ok(()) => CheckResult::pass(NAME),
        Err(e) => CheckResult::fail(NAME, e.to_string()),
    }
}

/// Fails if the name is retired by a merge or held by an active session.
pub async fn branch_available(store: &SessionStore, name: &str) -> CheckResult {
    const NAME: &str = "branch available";
    let verdict = match BranchValidator::new(store).check_branch_name_availability(name) {
        Ok(verdict) => verdict,
        Err(e) => return CheckResult::fail(NAME, e.to_string()),
    };
    let reason = verdict.reason();
    match (verdict.available, reason) {
        (true, None) => CheckResult::pass(NAME),
        (true, Some(reason)) => CheckResult::pass(NAME).with_message(reason),
        (false, reason) => CheckResult::fail(NAME, reason.unwrap_or_default())
            .with_suggestions(verdict.suggestions),
    }
}

/// Fails unless `branch` has an active session.
pub async fn session_exists(store: &SessionStore, branch: &str) -> CheckResult {
    const NAME: &str = "session exists";
    match store.get_by_branch(branch) {
        Ok(Some(session)) => CheckResult::pass(NAME).with_message(format!(
            "{} ({})",
            session.id.short(),
            session.current_state()
        )),
        Ok(None) => CheckResult::fail(NAME, format!("no active session on '{}'", branch))
            .with_suggestions([format!("start one with: branchflow launch {}", branch)]),
        Err(e) => CheckResult::fail(NAME, e.to_string()),
    }
}

pub async fn session_not_locked(store: &SessionStore, id: SessionId) -> CheckResult {
    const NAME: &str = "session not locked";
    match store.lock_info(id) {
        Ok(None) => CheckResult::pass(NAME),
        Ok(Some(info)) => CheckResult::fail(
            NAME,
            format!(
                "held by process {} since {}",
                info.pid,
                info.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        )
        .with_suggestions([format!(
            "if that process is gone, clear it with: branchflow unlock {}",
            id
        )]),
        Err(e) => CheckResult::fail(NAME, e.to_string()),
    }
}

/// Fails if the branch has several open pull requests.
pub async fn no_pr_conflicts<P: PullRequestLookup>(platform: &P, branch: &str) -> CheckResult {
    const NAME: &str = "pull request conflicts";
    match PrConflictValidator::new(platform)
        .check_for_pr_conflicts(branch)
        .await
    {
        Ok(PrConflictCheck::Blocked { open }) => CheckResult::fail(
            NAME,
            format!("{} open pull requests for '{}'", open.len(), branch),
        )
        .with_suggestions(
            open.iter()
                .map(|pr| format!("close all but one: {} {}", pr.number, pr.url)),
        ),
        Ok(check) => CheckResult::pass(NAME).with_message(check.action().to_string()),
        Err(e) => CheckResult::fail(NAME, e.to_string()),
    }
}

pub async fn not_on_base_branch<G: VersionControl>(git: &G, base: &str) -> CheckResult {
    const NAME: &str = "not on base branch";
    match git.current_branch().await {
        Ok(current) if current == base => {
            CheckResult::fail(NAME, format!("currently on '{}'", base))
        }
        Ok(_) => CheckResult::pass(NAME),
        Err(e) => CheckResult::fail(NAME, e.to_string()),
    }
}

pub async fn branch_exists<G: VersionControl>(
    git: &G,
    name: &str,
    scope: BranchScope,
) -> CheckResult {
    let check = match scope {
        BranchScope::Local => format!("branch '{}' exists", name),
        BranchScope::Remote => format!("branch '{}' exists on remote", name),
    };
    match git.branch_exists(name, scope).await {
        Ok(true) => CheckResult::pass(check),
        Ok(false) => CheckResult::fail(check, "not found"),
        Err(e) => CheckResult::fail(check, e.to_string()),
    }
}

/// Warns when the current branch is behind its upstream.
pub async fn up_to_date_with_upstream<G: VersionControl>(git: &G) -> CheckResult {
    const NAME: &str = "up to date with upstream";
    match git.branch_status().await {
        Ok(status) if status.behind > 0 => CheckResult::warn(
            NAME,
            format!("{} commit(s) behind upstream", status.behind),
        ),
        Ok(status) if !status.has_remote => {
            CheckResult::pass(NAME).with_message("no upstream yet")
        }
        Ok(_) => CheckResult::pass(NAME),
        Err(e) => CheckResult::warn(NAME, e.to_string()),
    }
}

// ─── Post-flight ─────────────────────────────────────────────────────────────

pub async fn current_branch_is<G: VersionControl>(git: &G, expected: &str) -> CheckResult {
    let name = format!("on branch '{}'", expected);
    match git.current_branch().await {
        Ok(current) if current == expected => CheckResult::pass(name),
        Ok(current) => CheckResult::fail(name, format!("on '{}'", current)),
        Err(e) => CheckResult::fail(name, e.to_string()),
    }
}

pub async fn session_in_state(
    store: &SessionStore,
    id: SessionId,
    expected: WorkflowState,
) -> CheckResult {
    let name = format!("session is {}", expected);
    match store.get(id) {
        Ok(Some(session)) if session.current_state() == expected => CheckResult::pass(name),
        Ok(Some(session)) => {
            CheckResult::fail(name, format!("session is {}", session.current_state()))
        }
        Ok(None) => CheckResult::fail(name, "session not found"),
        Err(e) => CheckResult::fail(name, e.to_string()),
    }
}

pub async fn branch_deleted<G: VersionControl>(
    git: &G,
    branch: &str,
    scope: BranchScope,
) -> CheckResult {
    let name = match scope {
        BranchScope::Local => format!("local branch '{}' deleted", branch),
        BranchScope::Remote => format!("remote branch '{}' deleted", branch),
    };
    match git.branch_exists(branch, scope).await {
        Ok(false) => CheckResult::pass(name),
        Ok(true) => CheckResult::fail(name, "still exists"),
        Err(e) => CheckResult::fail(name, e.to_string()),
    }
}

pub async fn lock_released(store: &SessionStore, id: SessionId) -> CheckResult {
    const NAME: &str = "lock released";
    if store.is_locked(id) {
        CheckResult::fail(NAME, format!("session {} is still locked", id.short()))
    } else {
        CheckResult::pass(NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::CheckLevel;
    use crate::test_utils::{FakeGit, FakePlatform};
    use crate::types::{PrState, SessionMetadata, WorkflowType};
    use chrono::Duration;
    use tempfile::{TempDir, tempdir};

    fn store() -> (TempDir, SessionStore) {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(dir.path(), Duration::hours(1)).unwrap();
        (dir, store)
    }

    // ─── Working copy ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn dirty_tree_fails_with_suggestion() {
        let git = FakeGit::new();
        assert!(clean_working_tree(&git).await.passed);
        git.set_dirty(true);
        let result = clean_working_tree(&git).await;
        assert!(result.is_blocking());
        assert!(!result.suggestions.is_empty());
    }

    #[tokio::test]
    async fn base_branch_is_refused() {
        let git = FakeGit::new();
        assert!(!not_on_base_branch(&git, "main").await.passed);
        git.create_branch("feature/a", "main").await.unwrap();
        assert!(not_on_base_branch(&git, "main").await.passed);
    }

    #[tokio::test]
    async fn behind_upstream_only_warns() {
        let git = FakeGit::new();
        git.update(|s| s.behind = 3);
        let result = up_to_date_with_upstream(&git).await;
        assert!(!result.passed);
        assert_eq!(result.level, CheckLevel::Warning);
        assert!(!result.is_blocking());
    }

    // ─── Session store ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn session_exists_once_created() {
        let (_dir, store) = store();
        assert!(!session_exists(&store, "feature/a").await.passed);

        store
            .create(WorkflowType::Standard, "feature/a", SessionMetadata::default())
            .unwrap();
        assert!(session_exists(&store, "feature/a").await.passed);
    }

    #[tokio::test]
    async fn locked_session_is_reported_with_holder() {
        let (_dir, store) = store();
        let s = store
            .create(WorkflowType::Standard, "feature/a", SessionMetadata::default())
            .unwrap();
        assert!(session_not_locked(&store, s.id).await.passed);
        let _guard = store.lock(s.id).unwrap().unwrap();
        let result = session_not_locked(&store, s.id).await;
        assert!(result.is_blocking());
        assert!(result.message.unwrap().contains(&std::process::id().to_string()));
        assert!(!lock_released(&store, s.id).await.passed);
    }

    #[tokio::test]
    async fn invalid_name_fails_syntax_check() {
        assert!(branch_name_syntax("feature/ok").await.passed);
        assert!(!branch_name_syntax("bad name").await.passed);
    }

    #[tokio::test]
    async fn taken_name_carries_suggestions() {
        let (_dir, store) = store();
        store
            .create(WorkflowType::Standard, "feature/a", SessionMetadata::default())
            .unwrap();
        let result = branch_available(&store, "feature/a").await;
        assert!(result.is_blocking());
        assert!(result.suggestions.contains(&"feature/a-v2".to_string()));
    }

    #[tokio::test]
    async fn session_state_verification() {
        let (_dir, store) = store();
        let s = store
            .create(WorkflowType::Standard, "feature/a", SessionMetadata::default())
            .unwrap();
        assert!(session_in_state(&store, s.id, WorkflowState::Init).await.passed);
        let result = session_in_state(&store, s.id, WorkflowState::BranchReady).await;
        assert!(!result.passed);
        assert_eq!(result.message.as_deref(), Some("session is INIT"));
    }

    // ─── Platform ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn multiple_open_prs_block_with_links() {
        let platform = FakePlatform::new();
        platform.add_pull_request("feature/z", "main", PrState::Open);
        platform.add_pull_request("feature/z", "main", PrState::Open);
        let result = no_pr_conflicts(&platform, "feature/z").await;
        assert!(result.is_blocking());
        assert_eq!(result.suggestions.len(), 2);
    }

    #[tokio::test]
    async fn single_open_pr_passes_as_update() {
        let platform = FakePlatform::new();
        platform.add_pull_request("feature/a", "main", PrState::Open);
        let result = no_pr_conflicts(&platform, "feature/a").await;
        assert!(result.passed);
        assert_eq!(result.message.as_deref(), Some("update"));
    }

    // ─── Post-flight ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn branch_verifications() {
        let git = FakeGit::new();
        git.create_branch("feature/a", "main").await.unwrap();
        assert!(current_branch_is(&git, "feature/a").await.passed);
        assert!(!branch_deleted(&git, "feature/a", BranchScope::Local).await.passed);
        assert!(branch_deleted(&git, "feature/a", BranchScope::Remote).await.passed);
        assert!(branch_exists(&git, "main", BranchScope::Local).await.passed);
    }
}
