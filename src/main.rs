use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use issue_tracker::config::{self, Config};
use issue_tracker::lifecycle::AnalysisContext;
use issue_tracker::notification::LogChannel;
use issue_tracker::store::{InMemoryIssueStore, IssueStore, JsonFileIssueStore, StoreContents};
use issue_tracker::tracking::LineHashSequence;
use issue_tracker::{report, IssueChangeContext, IssueService, RawFinding, Reconciliation, Transition};

const MOCK_COMPONENT: &str = "src/ledger.rs";

/// Issue tracker: reconciles rule-engine findings with stored issues and
/// moves issues through their review workflow.
#[derive(Parser, Debug)]
#[command(name = "issue-tracker", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile the findings of a new analysis with a component's issues
    Reconcile {
        /// JSON issue store (created if missing)
        #[arg(long)]
        store: Option<PathBuf>,

        /// JSON array of findings reported by the rule engine
        #[arg(long)]
        findings: Option<PathBuf>,

        /// Component the findings belong to (e.g., src/lib.rs)
        #[arg(long)]
        component: Option<String>,

        /// Current source of the component, used for line fingerprints
        #[arg(long)]
        source: Option<PathBuf>,

        /// Analysis date as RFC 3339; defaults to now
        #[arg(long)]
        date: Option<String>,

        /// Optional output file path for markdown report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use the built-in sample store and findings for demo purposes
        #[arg(long)]
        r#mock: bool,
    },

    /// Apply a workflow transition to one issue
    Transition {
        /// JSON issue store
        #[arg(long)]
        store: PathBuf,

        issue_key: String,

        /// One of: confirm, unconfirm, resolve, falsepositive, wontfix, reopen
        transition: String,

        /// Login recorded in the changelog
        #[arg(long, default_value = "admin")]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = Config::load()?;

    match cli.command {
        Command::Reconcile {
            store,
            findings,
            component,
            source,
            date,
            output,
            r#mock,
        } => {
            let analysis_date = match date.as_deref() {
                Some(value) => config::parse_date("--date", value)?,
                None => chrono::Utc::now(),
            };

            let reconciliation = if r#mock {
                info!("using mock store and findings for demo");
                run_mock(&config, analysis_date).await?
            } else {
                let store = store.ok_or("--store is required unless --mock is used")?;
                let findings = findings.ok_or("--findings is required unless --mock is used")?;
                let component = component.ok_or("--component is required unless --mock is used")?;

                let _main_span = info_span!("reconcile", component = %component).entered();
                let raw = read_findings(&findings)?;
                let source = source.as_deref().map(read_source).transpose()?;
                debug!(findings = raw.len(), has_source = source.is_some(), "inputs loaded");

                let service = IssueService::new(JsonFileIssueStore::new(store)).with_channel(Box::new(LogChannel));
                analyze(&service, &config, &component, raw, source.as_ref(), analysis_date).await?
            };

            info!("generating report");
            let built_report = report::build(&reconciliation, analysis_date);
            report::output(&built_report, output.as_deref())?;
            info!(open = built_report.open_count(), "done");
        }

        Command::Transition {
            store,
            issue_key,
            transition,
            user,
        } => {
            let transition: Transition = transition.parse()?;
            let service = IssueService::new(JsonFileIssueStore::new(store)).with_channel(Box::new(LogChannel));
            let ctx = IssueChangeContext::user(chrono::Utc::now(), user);

            let issue = service.do_transition(&issue_key, transition, &ctx).await?;
            let resolution = issue.resolution.map(|r| format!(" ({r})")).unwrap_or_default();
            println!(
                "{} {} -> {}{}",
                issue.key.bold(),
                transition,
                issue.status.to_string().green(),
                resolution
            );
        }
    }

    Ok(())
}

async fn analyze<S: IssueStore>(
    service: &IssueService<S>,
    config: &Config,
    component: &str,
    findings: Vec<RawFinding>,
    source: Option<&LineHashSequence>,
    analysis_date: chrono::DateTime<chrono::Utc>,
) -> Result<Reconciliation, Box<dyn std::error::Error>> {
    let rules = config.inactive_rules()?;
    let components = config.removed_components();
    let ctx = AnalysisContext {
        analysis_date,
        new_code: config.new_code_period(),
        rules: &rules,
        components: &components,
        source,
        block_radius: config.tracking.block_radius,
    };
    info!("running reconciliation");
    Ok(service.analyze_component(component, findings, &ctx).await?)
}

/// Reconcile the embedded sample findings against the embedded sample store.
/// This enables running the full pipeline without any input files.
async fn run_mock(
    config: &Config,
    analysis_date: chrono::DateTime<chrono::Utc>,
) -> Result<Reconciliation, Box<dyn std::error::Error>> {
    let contents: StoreContents = serde_json::from_str(include_str!("../tests/fixtures/issues.json"))?;
    let findings: Vec<RawFinding> = serde_json::from_str(include_str!("../tests/fixtures/findings.json"))?;
    let source = LineHashSequence::from_source(include_str!("../tests/fixtures/ledger_source.txt"));

    let service = IssueService::new(InMemoryIssueStore::with_issues(contents.issues)).with_channel(Box::new(LogChannel));
    analyze(&service, config, MOCK_COMPONENT, findings, Some(&source), analysis_date).await
}

fn read_findings(path: &Path) -> Result<Vec<RawFinding>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn read_source(path: &Path) -> Result<LineHashSequence, std::io::Error> {
    Ok(LineHashSequence::from_source(&std::fs::read_to_string(path)?))
}
