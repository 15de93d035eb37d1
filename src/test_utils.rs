//! Shared test utilities: session builders, proptest strategies and in-memory
//! fakes of the git and platform collaborators.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{Duration, Utc};
use proptest::prelude::*;

use crate::git::{BranchScope, BranchStatus, GitError, GitResult, PushRequest, VersionControl};
use crate::platform::{
    CheckStatus, MergeMethod, NewPullRequest, PlatformError, PlatformResult, PullRequestLookup,
    RemotePlatform,
};
use crate::state::{StateMachine, graph};
use crate::types::{
    Extra, PrNumber, PrState, PullRequest, Session, SessionMetadata, WorkflowState, WorkflowType,
};

// ─── Sessions ────────────────────────────────────────────────────────────────

pub fn arb_state() -> impl Strategy<Value = WorkflowState> {
    prop::sample::select(WorkflowState::ALL.to_vec())
}

pub fn arb_workflow_type() -> impl Strategy<Value = WorkflowType> {
    prop_oneof![Just(WorkflowType::Standard), Just(WorkflowType::Hotfix)]
}

pub fn new_session(workflow: WorkflowType, branch: &str, ttl: Duration) -> Session {
    Session::new(workflow, branch, SessionMetadata::default(), ttl, Utc::now())
}

/// A session driven to `target` along a shortest path through its graph.
pub fn session_in_state(target: WorkflowState) -> Session {
    let workflow = target.workflow_type();
    let branch = match workflow {
        WorkflowType::Standard => "feature/x",
        WorkflowType::Hotfix => "hotfix/x",
    };
    let mut session = new_session(workflow, branch, Duration::hours(1));
    let machine = StateMachine::new(workflow);
    for to in path_to(workflow, target) {
        machine
            .transition(&mut session, to, "test", Extra::new())
            .unwrap();
    }
    session
}

/// States visited (excluding the initial one) on a shortest path to `target`.
fn path_to(workflow: WorkflowType, target: WorkflowState) -> Vec<WorkflowState> {
    let start = workflow.initial_state();
    let mut parent: HashMap<WorkflowState, WorkflowState> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(state) = queue.pop_front() {
        if state == target {
            break;
        }
        for e in graph::edges(workflow).filter(|e| e.from == state) {
            if e.to != start && !parent.contains_key(&e.to) {
                parent.insert(e.to, state);
                queue.push_back(e.to);
            }
        }
    }

    let mut path = Vec::new();
    let mut state = target;
    while state != start {
        path.push(state);
        state = parent[&state];
    }
    path.reverse();
    path
}

// ─── Fake git ────────────────────────────────────────────────────────────────

/// Observable state of a [`FakeGit`].
#[derive(Debug, Clone, Default)]
pub struct FakeGitState {
    pub current: String,
    pub local: BTreeSet<String>,
    pub remote: BTreeSet<String>,
    pub dirty: bool,
    pub ahead: u32,
    pub behind: u32,
    /// Commits on the current branch since it was created from its base.
    pub since_base: u32,
    pub commits: Vec<String>,
    pub pushes: Vec<PushRequest>,
    pub rebases: Vec<String>,
    pub fetches: u32,
    pub fail_rebase: bool,
    pub fail_push: bool,
}

/// In-memory working copy, starting on `main` with `main` pushed.
#[derive(Debug)]
pub struct FakeGit {
    state: Mutex<FakeGitState>,
}

impl FakeGit {
    pub fn new() -> Self {
        FakeGit {
            state: Mutex::new(FakeGitState {
                current: "main".to_string(),
                local: BTreeSet::from(["main".to_string()]),
                remote: BTreeSet::from(["main".to_string()]),
                ..FakeGitState::default()
            }),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut FakeGitState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn snapshot(&self) -> FakeGitState {
        self.state.lock().unwrap().clone()
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.update(|s| s.dirty = dirty);
    }

    fn failed(command: &str, stderr: &str) -> GitError {
        GitError::CommandFailed {
            command: command.to_string(),
            stderr: stderr.to_string(),
        }
    }
}

impl VersionControl for FakeGit {
    async fn current_branch(&self) -> GitResult<String> {
        Ok(self.state.lock().unwrap().current.clone())
    }

    async fn branch_exists(&self, name: &str, scope: BranchScope) -> GitResult<bool> {
        let s = self.state.lock().unwrap();
        Ok(match scope {
            BranchScope::Local => s.local.contains(name),
            BranchScope::Remote => s.remote.contains(name),
        })
    }

    async fn create_branch(&self, name: &str, base: &str) -> GitResult<()> {
        let mut s = self.state.lock().unwrap();
        if s.local.contains(name) {
            return Err(Self::failed("git checkout -b", "branch already exists"));
        }
        if !s.local.contains(base) {
            return Err(Self::failed("git checkout -b", "base not found"));
        }
        s.local.insert(name.to_string());
        s.current = name.to_string();
        s.ahead = 0;
        s.since_base = 0;
        Ok(())
    }

    async fn checkout(&self, name: &str) -> GitResult<()> {
        let mut s = self.state.lock().unwrap();
        if !s.local.contains(name) {
            return Err(Self::failed("git checkout", "pathspec did not match"));
        }
        s.current = name.to_string();
        Ok(())
    }

    async fn commit(&self, message: &str) -> GitResult<()> {
        let mut s = self.state.lock().unwrap();
        if !s.dirty {
            return Err(Self::failed("git commit", "nothing to commit"));
        }
        s.dirty = false;
        s.ahead += 1;
        s.since_base += 1;
        s.commits.push(message.to_string());
        Ok(())
    }

    async fn push(&self, request: &PushRequest) -> GitResult<()> {
        let mut s = self.state.lock().unwrap();
        if s.fail_push {
            return Err(GitError::PushRejected {
                details: "rejected (fetch first)".to_string(),
            });
        }
        if !s.local.contains(&request.branch) {
            return Err(Self::failed("git push", "src refspec does not match"));
        }
        s.remote.insert(request.target_branch().to_string());
        s.pushes.push(request.clone());
        s.ahead = 0;
        Ok(())
    }

    async fn delete_branch(&self, name: &str, scope: BranchScope) -> GitResult<()> {
        let mut s = self.state.lock().unwrap();
        match scope {
            BranchScope::Local => {
                if s.current == name {
                    return Err(Self::failed("git branch -D", "branch is checked out"));
                }
                s.local.remove(name);
            }
            BranchScope::Remote => {
                s.remote.remove(name);
            }
        }
        Ok(())
    }

    async fn has_uncommitted_changes(&self) -> GitResult<bool> {
        Ok(self.state.lock().unwrap().dirty)
    }

    async fn branch_status(&self) -> GitResult<BranchStatus> {
        let s = self.state.lock().unwrap();
        Ok(BranchStatus {
            ahead: s.ahead,
            behind: s.behind,
            is_clean: !s.dirty,
            has_remote: s.remote.contains(&s.current),
        })
    }

    async fn commits_since(&self, _base: &str) -> GitResult<u32> {
        Ok(self.state.lock().unwrap().since_base)
    }

    async fn fetch(&self) -> GitResult<()> {
        self.state.lock().unwrap().fetches += 1;
        Ok(())
    }

    async fn rebase_onto(&self, base: &str) -> GitResult<()> {
        let mut s = self.state.lock().unwrap();
        if s.fail_rebase {
            return Err(GitError::RebaseConflict {
                onto: format!("origin/{}", base),
            });
        }
        s.rebases.push(base.to_string());
        s.behind = 0;
        Ok(())
    }

    async fn remote_url(&self) -> GitResult<Option<String>> {
        Ok(Some("https://example.invalid/repo.git".to_string()))
    }
}

// ─── Fake platform ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct FakePlatformState {
    prs: Vec<PullRequest>,
    checks: VecDeque<CheckStatus>,
    check_polls: u32,
    merges: Vec<(PrNumber, MergeMethod)>,
    refuse_merge: bool,
}

/// In-memory code-hosting platform. Check runs pass unless scripted.
#[derive(Debug, Default)]
pub struct FakePlatform {
    state: Mutex<FakePlatformState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        FakePlatform::default()
    }

    /// Adds a pull request with the next free number.
    pub fn add_pull_request(&self, head: &str, base: &str, state: PrState) -> PullRequest {
        let mut s = self.state.lock().unwrap();
        let number = PrNumber(s.prs.len() as u64 + 1);
        let pr = PullRequest {
            number,
            url: format!("https://example.invalid/pull/{}", number.0),
            head_ref: head.to_string(),
            base_ref: base.to_string(),
            title: format!("PR {}", number.0),
            state,
        };
        s.prs.push(pr.clone());
        pr
    }

    /// Statuses returned by successive `check_status` calls.
    pub fn script_checks(&self, statuses: impl IntoIterator<Item = CheckStatus>) {
        self.state.lock().unwrap().checks.extend(statuses);
    }

    pub fn check_polls(&self) -> u32 {
        self.state.lock().unwrap().check_polls
    }

    pub fn merges(&self) -> Vec<(PrNumber, MergeMethod)> {
        self.state.lock().unwrap().merges.clone()
    }

    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.state.lock().unwrap().prs.clone()
    }

    pub fn refuse_merges(&self) {
        self.state.lock().unwrap().refuse_merge = true;
    }

    pub fn allow_merges(&self) {
        self.state.lock().unwrap().refuse_merge = false;
    }
}

impl PullRequestLookup for FakePlatform {
    async fn list_open_pull_requests(&self, branch: &str) -> PlatformResult<Vec<PullRequest>> {
        let s = self.state.lock().unwrap();
        Ok(s.prs
            .iter()
            .filter(|pr| pr.head_ref == branch && pr.state.is_open())
            .cloned()
            .collect())
    }

    async fn latest_merged_pull_request(&self, branch: &str) -> PlatformResult<Option<PullRequest>> {
        let s = self.state.lock().unwrap();
        Ok(s.prs
            .iter()
            .rev()
            .find(|pr| pr.head_ref == branch && pr.state.is_merged())
            .cloned())
    }
}

impl RemotePlatform for FakePlatform {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_pull_request(&self, request: &NewPullRequest) -> PlatformResult<PullRequest> {
        let mut pr = self.add_pull_request(&request.head, &request.base, PrState::Open);
        pr.title = request.title.clone();
        let mut s = self.state.lock().unwrap();
        if let Some(stored) = s.prs.iter_mut().find(|p| p.number == pr.number) {
            stored.title = pr.title.clone();
        }
        Ok(pr)
    }

    async fn get_pull_request_for_branch(&self, branch: &str) -> PlatformResult<Option<PullRequest>> {
        let s = self.state.lock().unwrap();
        Ok(s.prs.iter().rev().find(|pr| pr.head_ref == branch).cloned())
    }

    async fn merge_pull_request(
        &self,
        number: PrNumber,
        method: MergeMethod,
    ) -> PlatformResult<PullRequest> {
        let mut s = self.state.lock().unwrap();
        if s.refuse_merge {
            return Err(PlatformError::NotMergeable {
                number,
                reason: "required reviews missing".to_string(),
            });
        }
        let pr = s
            .prs
            .iter_mut()
            .find(|pr| pr.number == number)
            .ok_or(PlatformError::NotFound(number))?;
        pr.state = PrState::Merged {
            merged_at: Utc::now(),
        };
        let merged = pr.clone();
        s.merges.push((number, method));
        Ok(merged)
    }

    async fn check_status(&self, _number: PrNumber) -> PlatformResult<CheckStatus> {
        let mut s = self.state.lock().unwrap();
        s.check_polls += 1;
        Ok(s.checks.pop_front().unwrap_or(CheckStatus::Passing))
    }
}
