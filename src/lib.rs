//! Issue lifecycle engine: tracks rule violations across analyses, drives
//! their status workflow and records every change in a changelog.

pub mod config;
pub mod error;
pub mod issue;
pub mod lifecycle;
pub mod notification;
pub mod report;
pub mod service;
pub mod store;
pub mod tracking;
pub mod workflow;

pub use error::IssueError;
pub use issue::{FieldDiffs, Issue, IssueChangeContext, RawFinding};
pub use lifecycle::{AnalysisContext, Reconciler, Reconciliation};
pub use service::{IssueService, ServiceError};
pub use workflow::{Transition, Workflow};
