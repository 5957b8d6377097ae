use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use lineflow_core::config::{FailurePolicy, OptimizationLevel};
use lineflow_core::provenance::LineageDirection;
use lineflow_core::workflow::OutputFormat;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelArg {
    Standard,
    Optimized,
    Enhanced,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    Abort,
    SkipDependents,
    Continue,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Json,
    Yaml,
    Text,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventsArg {
    Jsonl,
    Text,
    None,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionArg {
    Upstream,
    Downstream,
    Both,
}

impl From<LevelArg> for OptimizationLevel {
    fn from(v: LevelArg) -> Self {
        match v {
            LevelArg::Standard => Self::Standard,
            LevelArg::Optimized => Self::Optimized,
            LevelArg::Enhanced => Self::Enhanced,
        }
    }
}

impl From<PolicyArg> for FailurePolicy {
    fn from(v: PolicyArg) -> Self {
        match v {
            PolicyArg::Abort => Self::Abort,
            PolicyArg::SkipDependents => Self::SkipDependents,
            PolicyArg::Continue => Self::Continue,
        }
    }
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Json => Self::Json,
            FormatArg::Yaml => Self::Yaml,
            FormatArg::Text => Self::Text,
        }
    }
}

impl From<DirectionArg> for LineageDirection {
    fn from(v: DirectionArg) -> Self {
        match v {
            DirectionArg::Upstream => Self::Upstream,
            DirectionArg::Downstream => Self::Downstream,
            DirectionArg::Both => Self::Both,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "lineflow", version, about = "Run dependency-ordered tool workflows")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file; defaults to ~/.lineflow/config.toml, then ./config.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Workflow document (.yaml/.yml or .json).
    pub workflow: PathBuf,

    /// Engine selection; overrides `orchestrator.optimization_level`.
    #[arg(long, value_enum)]
    pub level: Option<LevelArg>,

    /// Worker pool / task group size.
    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long, value_enum)]
    pub failure_policy: Option<PolicyArg>,

    /// Default per-step timeout.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Result format; defaults to the workflow's `outputs.format`.
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Stream run events to stderr.
    #[arg(long, value_enum, default_value_t = EventsArg::None)]
    pub events: EventsArg,

    /// Show progress bars on stderr.
    #[arg(long)]
    pub progress: bool,

    /// Record provenance into this SQLite database.
    #[arg(long)]
    pub provenance_db: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct WorkflowArgs {
    pub workflow: PathBuf,

    /// Output format for `plan`.
    #[arg(long, value_enum, default_value_t = FormatArg::Text)]
    pub format: FormatArg,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DbArgs {
    /// Provenance database; defaults to the configured sqlite path.
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProvenanceCommand {
    /// Operation counts, success rate and mean duration.
    Stats(DbArgs),
    /// Lineage edges around an operation.
    Lineage {
        operation_id: String,
        #[command(flatten)]
        db: DbArgs,
        #[arg(long, value_enum, default_value_t = DirectionArg::Both)]
        direction: DirectionArg,
    },
    /// One operation record.
    Show {
        operation_id: String,
        #[command(flatten)]
        db: DbArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a workflow.
    Run(RunArgs),
    /// Check a workflow without running it.
    Validate(WorkflowArgs),
    /// Print the resolved execution batches.
    Plan(WorkflowArgs),
    /// Query a provenance database.
    #[command(subcommand)]
    Provenance(ProvenanceCommand),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let args = Args::try_parse_from([
            "lineflow",
            "run",
            "wf.yaml",
            "--level",
            "enhanced",
            "--workers",
            "3",
            "--failure-policy",
            "skip-dependents",
            "--events",
            "jsonl",
        ])
        .unwrap();
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.level, Some(LevelArg::Enhanced));
        assert_eq!(run.workers, Some(3));
        assert_eq!(run.failure_policy, Some(PolicyArg::SkipDependents));
        assert_eq!(run.events, EventsArg::Jsonl);
        assert!(!run.progress);
    }

    #[test]
    fn test_parse_provenance_lineage() {
        let args = Args::try_parse_from([
            "lineflow",
            "provenance",
            "lineage",
            "op-1",
            "--db",
            "/tmp/p.db",
            "--direction",
            "upstream",
        ])
        .unwrap();
        match args.command {
            Commands::Provenance(ProvenanceCommand::Lineage {
                operation_id,
                db,
                direction,
            }) => {
                assert_eq!(operation_id, "op-1");
                assert_eq!(db.db, Some(PathBuf::from("/tmp/p.db")));
                assert_eq!(direction, DirectionArg::Upstream);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
