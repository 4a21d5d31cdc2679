use anyhow::Result;
use clap::Parser;
use tracing::Instrument;

use release_bundle::cli::commands::apply::ApplyCommand;
use release_bundle::cli::commands::create::CreateCommand;
use release_bundle::cli::commands::inspect::InspectCommand;
use release_bundle::cli::commands::{show_usage, Command};
use release_bundle::cli::{effective_config, Cli, Commands};
use release_bundle::config::{config, ReleaseBundleConfig};
use release_bundle::observability::{store_metrics, OperationTimer};
use release_bundle::telemetry::{create_bundle_span, generate_correlation_id, init_telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = ReleaseBundleConfig::load_env_file();
    let config = effective_config(cli.command.as_ref(), config().cloned())?;
    init_telemetry(
        &config.observability.log_level,
        cli.json_logs || config.observability.json_logs,
    )?;

    let correlation_id = generate_correlation_id();
    let runtime = tokio::runtime::Runtime::new()?;

    let result = match cli.command {
        None => runtime.block_on(show_usage()),
        Some(Commands::Create {
            release_id,
            output,
            schema,
        }) => {
            let span = create_bundle_span("create", Some(release_id), None, &correlation_id);
            let command = CreateCommand::new(release_id, config)
                .with_output(output)
                .with_schema(schema);
            runtime.block_on(run("create", &command).instrument(span))
        }
        Some(Commands::Apply {
            application_id,
            bundle,
            force,
            release_version,
            schema,
            cleanup_policy,
        }) => {
            let span = create_bundle_span("apply", None, Some(application_id), &correlation_id);
            let command = ApplyCommand::new(application_id, bundle, config)
                .with_force(force)
                .with_release_version(release_version)
                .with_schema(schema)
                .with_cleanup_policy(cleanup_policy);
            runtime.block_on(run("apply", &command).instrument(span))
        }
        Some(Commands::Inspect { bundle, schema }) => {
            let span = create_bundle_span("inspect", None, None, &correlation_id);
            let command = InspectCommand::new(bundle)
                .with_schema(schema)
                .with_default_schema(config.apply.schema);
            runtime.block_on(run("inspect", &command).instrument(span))
        }
    };

    if let Err(e) = &result {
        tracing::error!(correlation_id = %correlation_id, error = %e, "Command failed");
    }
    result
}

async fn run(operation: &str, command: &impl Command) -> Result<()> {
    let timer = OperationTimer::new(operation);
    let result = command.execute().await;
    timer.finish();
    store_metrics().log_stats();
    result
}
