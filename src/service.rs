use std::collections::HashSet;
use std::sync::Mutex;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::error::IssueError;
use crate::issue::{Comment, Issue, IssueChangeContext, RawFinding};
use crate::lifecycle::{AnalysisContext, Reconciler, Reconciliation};
use crate::notification::{ChangelogRecord, Emitter, NotificationChannel, NotificationEvent};
use crate::store::{IssueStore, StoreError};
use crate::workflow::{Action, ActionParams, ActionRegistry, Transition, Workflow};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Issue(#[from] IssueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Entry point for analyses and user operations on stored issues.
///
/// Every operation loads from the store, applies the change, saves issues
/// together with their changelog and then notifies the registered channels.
/// Delivery failures are logged and never fail the operation.
pub struct IssueService<S: IssueStore> {
    store: S,
    reconciler: Reconciler,
    workflow: Workflow,
    actions: ActionRegistry,
    emitter: Emitter,
    channels: Vec<Box<dyn NotificationChannel>>,
    in_flight: Mutex<HashSet<String>>,
}

impl<S: IssueStore> IssueService<S> {
    pub fn new(store: S) -> Self {
        let workflow = Workflow::new();
        Self {
            store,
            reconciler: Reconciler::new(workflow),
            workflow,
            actions: ActionRegistry::with_builtins(workflow),
            emitter: Emitter::new(),
            channels: Vec::new(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_channel(mut self, channel: Box<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn register_action(&mut self, action: Box<dyn Action>) {
        self.actions.register(action);
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconcile a component's stored issues with a fresh analysis.
    ///
    /// A second call for a component whose analysis is still running fails
    /// with [`IssueError::ConcurrentModification`].
    #[instrument(skip(self, findings, ctx), fields(findings = findings.len()))]
    pub async fn analyze_component(
        &self,
        component_key: &str,
        findings: Vec<RawFinding>,
        ctx: &AnalysisContext<'_>,
    ) -> Result<Reconciliation, ServiceError> {
        let _guard = InFlight::acquire(&self.in_flight, component_key)?;

        let old_issues = self.store.load_open_issues(component_key).await?;
        info!(previous = old_issues.len(), "loaded open issues");

        let reconciliation = self.reconciler.reconcile(component_key, old_issues, findings, ctx)?;
        let emission = self
            .emitter
            .emit(component_key, &reconciliation.issues, &reconciliation.changelog);

        let changed: Vec<Issue> = reconciliation.issues.iter().filter(|i| i.is_changed()).cloned().collect();
        self.store.save(&changed, &emission.records).await?;
        info!(saved = changed.len(), changelog = emission.records.len(), "analysis persisted");

        self.notify(&emission.events).await;
        Ok(reconciliation)
    }

    /// Transitions `issue_key` may currently take.
    pub async fn available_transitions(&self, issue_key: &str) -> Result<Vec<Transition>, ServiceError> {
        let issue = self.load(issue_key).await?;
        Ok(self.workflow.out_transitions(&issue))
    }

    #[instrument(skip(self, ctx), fields(user = ?ctx.user))]
    pub async fn do_transition(
        &self,
        issue_key: &str,
        transition: Transition,
        ctx: &IssueChangeContext,
    ) -> Result<Issue, ServiceError> {
        let mut issue = self.load(issue_key).await?;
        self.workflow.do_transition(&mut issue, transition, ctx)?;
        self.persist(issue, Vec::new()).await
    }

    #[instrument(skip(self, params, ctx), fields(user = ?ctx.user))]
    pub async fn apply_action(
        &self,
        issue_key: &str,
        action: &str,
        params: &ActionParams,
        ctx: &IssueChangeContext,
    ) -> Result<Issue, ServiceError> {
        let mut issue = self.load(issue_key).await?;
        let known: HashSet<String> = issue.comments.iter().map(|c| c.key.clone()).collect();
        if !self.actions.execute(action, &mut issue, params, ctx)? {
            return Ok(issue);
        }
        let records = issue
            .comments
            .iter()
            .filter(|c| !known.contains(&c.key))
            .map(|c| self.emitter.comment_record(issue_key, c))
            .collect();
        self.persist(issue, records).await
    }

    pub async fn add_comment(
        &self,
        issue_key: &str,
        text: &str,
        ctx: &IssueChangeContext,
    ) -> Result<Comment, ServiceError> {
        let mut issue = self.load(issue_key).await?;
        let comment = issue.add_comment(text, ctx)?.clone();
        let record = self.emitter.comment_record(issue_key, &comment);
        self.persist(issue, vec![record]).await?;
        Ok(comment)
    }

    pub async fn edit_comment(
        &self,
        issue_key: &str,
        comment_key: &str,
        text: &str,
        ctx: &IssueChangeContext,
    ) -> Result<Issue, ServiceError> {
        let mut issue = self.load(issue_key).await?;
        issue.edit_comment(comment_key, text, ctx)?;
        self.persist(issue, Vec::new()).await
    }

    pub async fn delete_comment(
        &self,
        issue_key: &str,
        comment_key: &str,
        ctx: &IssueChangeContext,
    ) -> Result<Comment, ServiceError> {
        let mut issue = self.load(issue_key).await?;
        let removed = issue.delete_comment(comment_key, ctx)?;
        self.persist(issue, Vec::new()).await?;
        Ok(removed)
    }

    async fn load(&self, issue_key: &str) -> Result<Issue, ServiceError> {
        let mut issue = self
            .store
            .load_issue(issue_key)
            .await?
            .ok_or_else(|| IssueError::NotFound(issue_key.to_string()))?;
        // Only the analysis that created an issue reports it as new.
        issue.is_new = false;
        Ok(issue)
    }

    async fn persist(&self, mut issue: Issue, mut records: Vec<ChangelogRecord>) -> Result<Issue, ServiceError> {
        let change = issue.take_change();
        let emission = self
            .emitter
            .emit(&issue.component_key, std::slice::from_ref(&issue), change.as_slice());
        records.extend(emission.records);
        self.store.save(std::slice::from_ref(&issue), &records).await?;
        self.notify(&emission.events).await;
        Ok(issue)
    }

    async fn notify(&self, events: &[NotificationEvent]) {
        for event in events {
            for channel in &self.channels {
                if let Err(e) = channel.deliver(event).await {
                    warn!(channel = channel.name(), error = %e, "notification dropped");
                }
            }
        }
    }
}

/// Marks a component as being analysed until dropped.
struct InFlight<'a> {
    components: &'a Mutex<HashSet<String>>,
    component_key: String,
}

impl<'a> InFlight<'a> {
    fn acquire(components: &'a Mutex<HashSet<String>>, component_key: &str) -> Result<Self, IssueError> {
        let mut running = components.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !running.insert(component_key.to_string()) {
            return Err(IssueError::ConcurrentModification(component_key.to_string()));
        }
        Ok(Self {
            components,
            component_key: component_key.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut running = self.components.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        running.remove(&self.component_key);
    }
}
