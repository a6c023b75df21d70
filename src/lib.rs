pub mod commands;
pub mod core;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::commands::Goal;
use crate::core::config::ProvisionConfig;
use crate::core::error::ProvisionResult;

const USAGE: &str = "usage: es-provision <download|start|post-start|stop> [config.json]";

pub fn run() -> ExitCode {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(goal) = args.next() else {
        error!("{}", USAGE);
        return ExitCode::from(2);
    };
    let config_path = args.next().map(PathBuf::from);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_goal(&goal, config_path.as_deref())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Goal '{}' failed: {}", goal, e);
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                error!("  caused by: {}", cause);
                source = cause.source();
            }
            for line in e.captured_output() {
                error!("{}", line);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run_goal(goal: &str, config_path: Option<&Path>) -> ProvisionResult<()> {
    let goal: Goal = goal.parse()?;
    let config = ProvisionConfig::load(config_path).await?;
    info!(
        "es-provision {} running goal '{}'",
        env!("CARGO_PKG_VERSION"),
        goal
    );
    commands::execute(goal, &config).await
}
