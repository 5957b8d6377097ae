use clap::Parser;
use lineflow_cli::commands::{self, cli};
use lineflow_core::error::{self, ErrorCode};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, error::CliError> {
    let args = cli::Args::parse();
    let cfg = match &args.config {
        Some(path) => lineflow_core::config::load_from_path(path),
        None => lineflow_core::config::load_default(),
    }
    .map_err(|e| error::CliError::Config(e.to_string()))?;
    init_tracing(&cfg.logging).map_err(error::CliError::Command)?;

    match args.command {
        cli::Commands::Run(run_args) => commands::workflow::run(run_args, cfg).await,
        cli::Commands::Validate(wf) => commands::workflow::validate(wf, cfg),
        cli::Commands::Plan(wf) => commands::workflow::plan(wf, cfg),
        cli::Commands::Provenance(cmd) => commands::provenance::run(cmd, cfg),
    }
}

fn exit_code_for_error(e: &error::CliError) -> i32 {
    // 0: success, 1: failure, 2: partial (run results, not errors)
    // 3-60: ErrorCode of the underlying orchestrator / provenance error
    let code = match e {
        error::CliError::Orchestrator(oe) => oe.error_code(),
        error::CliError::Provenance(pe) => pe.error_code(),
        error::CliError::Config(_) => ErrorCode::ConfigError,
        error::CliError::Command(_) | error::CliError::Io(_) | error::CliError::Anyhow(_) => {
            ErrorCode::GeneralError
        }
    };
    i32::from(code.as_u16())
}

fn init_tracing(logging: &lineflow_core::config::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("lineflow"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("lineflow.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
