//! `provenance stats|lineage|show` against a SQLite store.
use std::path::{Path, PathBuf};

use lineflow_core::config::get_lineflow_data_dir;
use lineflow_core::error::CliError;
use lineflow_core::provenance::{LineageDirection, ProvenanceRecorder, SqliteProvenance};
use lineflow_core::workflow::OutputFormat;
use lineflow_core::AppConfig;

use super::cli::{DbArgs, ProvenanceCommand};
use crate::output::render_structured;

fn resolve_db(args: &DbArgs, cfg: &AppConfig) -> Result<PathBuf, CliError> {
    if let Some(db) = &args.db {
        return Ok(db.clone());
    }
    if let Some(path) = cfg.provenance.path.as_deref().filter(|p| !p.trim().is_empty()) {
        return Ok(PathBuf::from(path));
    }
    Ok(get_lineflow_data_dir()?.join("provenance.db"))
}

fn open_existing(path: &Path) -> Result<SqliteProvenance, CliError> {
    if !path.exists() {
        return Err(CliError::Command(format!(
            "provenance database not found: {}",
            path.display()
        )));
    }
    Ok(SqliteProvenance::open(path)?)
}

pub fn run(command: ProvenanceCommand, cfg: AppConfig) -> Result<i32, CliError> {
    let rendered = match command {
        ProvenanceCommand::Stats(db) => {
            let store = open_existing(&resolve_db(&db, &cfg)?)?;
            render_structured(&store.get_statistics()?, OutputFormat::Json)?
        }
        ProvenanceCommand::Lineage {
            operation_id,
            db,
            direction,
        } => {
            let store = open_existing(&resolve_db(&db, &cfg)?)?;
            let direction: LineageDirection = direction.into();
            // surfaces OperationNotFound rather than an empty list
            store.get_operation(&operation_id)?;
            render_structured(
                &store.get_lineage(&operation_id, direction)?,
                OutputFormat::Json,
            )?
        }
        ProvenanceCommand::Show { operation_id, db } => {
            let store = open_existing(&resolve_db(&db, &cfg)?)?;
            render_structured(&store.get_operation(&operation_id)?, OutputFormat::Json)?
        }
    };
    println!("{rendered}");
    Ok(0)
}
