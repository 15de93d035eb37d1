//! `status` and `list`: read-only session summaries.

use serde::Serialize;

use crate::git::VersionControl;
use crate::persistence::SessionStore;
use crate::state::StateMachine;
use crate::types::{Action, Session};

use super::{Orchestrator, WorkflowError};

/// A session with what can happen to it next.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session: Session,
    pub allowed_actions: Vec<Action>,
    pub locked: bool,
}

impl SessionSummary {
    fn of(store: &SessionStore, session: Session) -> Self {
        let allowed_actions =
            StateMachine::for_session(&session).allowed_actions(session.current_state());
        SessionSummary {
            locked: store.is_locked(session.id),
            allowed_actions,
            session,
        }
    }

    /// One line per fact, for terminal output.
    pub fn render(&self) -> String {
        let s = &self.session;
        let mut out = format!(
            "{} [{}] {} ({})",
            s.branch_name,
            s.workflow_type,
            s.current_state(),
            s.id.short()
        );
        if let Some(pr) = &s.metadata.pull_request {
            let merged = if pr.merged { ", merged" } else { "" };
            out.push_str(&format!("\n  pull request: {} {}{}", pr.number, pr.url, merged));
        }
        if let Some(severity) = s.metadata.severity {
            out.push_str(&format!("\n  severity: {}", severity));
        }
        if let Some(reason) = &s.metadata.abort_reason {
            out.push_str(&format!("\n  aborted: {}", reason));
        }
        if !s.is_terminal() {
            out.push_str(&format!(
                "\n  expires: {}",
                s.expires_at.format("%Y-%m-%d %H:%M UTC")
            ));
        }
        if self.locked {
            out.push_str("\n  locked by a running operation");
        }
        if !self.allowed_actions.is_empty() {
            let actions: Vec<String> = self.allowed_actions.iter().map(|a| a.to_string()).collect();
            out.push_str(&format!("\n  next: {}", actions.join(", ")));
        }
        out
    }
}

impl<G: VersionControl> Orchestrator<'_, G> {
    /// The session on `branch`, or on the checked-out branch.
    pub async fn status(&self, branch: Option<&str>) -> Result<SessionSummary, WorkflowError> {
        let session = self.resolve_session(branch).await?;
        Ok(SessionSummary::of(self.store, session))
    }

    /// Active sessions, oldest first; with `include_all`, finished and
    /// expired ones too.
    pub fn list(&self, include_all: bool) -> Result<Vec<SessionSummary>, WorkflowError> {
        Ok(self
            .store
            .list(include_all)?
            .into_iter()
            .map(|session| SessionSummary::of(self.store, session))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::World;
    use crate::commands::{AbortOptions, LaunchOptions};
    use crate::types::WorkflowState;

    async fn launch(world: &World, branch: &str) {
        world
            .orchestrator()
            .launch(&LaunchOptions {
                branch: branch.to_string(),
                base: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn status_of_current_branch_lists_next_actions() {
        let world = World::new();
        launch(&world, "feature/a").await;

        let summary = world.orchestrator().status(None).await.unwrap();
        assert_eq!(summary.session.current_state(), WorkflowState::BranchReady);
        assert_eq!(summary.allowed_actions, vec![Action::Commit, Action::Abort]);
        assert!(!summary.locked);

        let rendered = summary.render();
        assert!(rendered.starts_with("feature/a [standard] BRANCH_READY"));
        assert!(rendered.ends_with("next: commit, abort"));
    }

    #[tokio::test]
    async fn status_without_session_is_an_error() {
        let world = World::new();
        assert!(matches!(
            world.orchestrator().status(Some("feature/none")).await,
            Err(WorkflowError::NoSession(_))
        ));
    }

    #[tokio::test]
    async fn list_hides_finished_sessions_unless_asked() {
        let world = World::new();
        launch(&world, "feature/a").await;
        world
            .orchestrator()
            .abort(&AbortOptions::default())
            .await
            .unwrap();
        world.git.update(|s| s.current = "main".to_string());
        launch(&world, "feature/b").await;

        let orchestrator = world.orchestrator();
        let active = orchestrator.list(false).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session.branch_name, "feature/b");

        let all = orchestrator.list(true).unwrap();
        assert_eq!(all.len(), 2);
        let aborted = &all[0];
        assert!(aborted.allowed_actions.is_empty());
        assert!(aborted.render().contains("aborted: aborted by operator"));
        assert!(!aborted.render().contains("expires"));
    }

    #[tokio::test]
    async fn summary_serializes_with_state_names() {
        let world = World::new();
        launch(&world, "feature/a").await;
        let summary = world.orchestrator().status(None).await.unwrap();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["session"]["current_state"], "BRANCH_READY");
        assert_eq!(json["allowed_actions"][0], "commit");
    }
}
