use clap::Parser;
use photo_recon::app::{build_workflow, PreprocessStage, ReconstructStage, SetupStage};
use photo_recon::config::cli::Command;
use photo_recon::core::workflow::{StageResult, StageSequence, WorkflowStage};
use photo_recon::utils::{logger, validation::Validate};
use photo_recon::{CliConfig, ReconConfig, ReconError, TokioProcessRunner};
use std::sync::Arc;

fn load_config(cli: &CliConfig) -> Result<ReconConfig, ReconError> {
    let mut config = ReconConfig::load_or_default(&cli.config)?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn report_error(e: &ReconError) -> i32 {
    tracing::error!(
        "❌ Workflow failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    e.exit_code()
}

fn single_stage(stage: Box<dyn WorkflowStage>, monitoring: bool) -> StageSequence {
    let mut sequence = StageSequence::with_timestamp_id("recon").with_monitoring(monitoring);
    sequence.add_stage(stage);
    sequence
}

fn print_summary(results: &[StageResult]) {
    let summary = StageSequence::get_execution_summary(results);
    tracing::info!("📊 Execution summary: {:?}", summary);

    for result in results {
        if let Some(script) = result.metadata.get("env_script").and_then(|v| v.as_str()) {
            println!("👉 Run: source {}", script);
        }
        if let Some(mesh) = result.metadata.get("textured_mesh").and_then(|v| v.as_str()) {
            println!("📁 Textured mesh: {}", mesh);
        }
        if let Some(images) = result.metadata.get("images") {
            println!("📸 Sanitized images: {}", images);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting photo-recon CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = match load_config(&cli) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            std::process::exit(report_error(&e));
        }
    };

    if config.monitoring_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let runner = Arc::new(TokioProcessRunner::new());

    let monitoring = config.monitoring_enabled();
    let sequence = match &cli.command {
        Command::Setup(_) => single_stage(Box::new(SetupStage::new(config.clone())), monitoring),
        Command::Preprocess(_) => single_stage(
            Box::new(PreprocessStage::new(config.clone(), runner)),
            monitoring,
        ),
        Command::Reconstruct(args) => single_stage(
            Box::new(ReconstructStage::new(config.clone(), runner).with_dry_run(args.dry_run)),
            monitoring,
        ),
        Command::Run(args) => build_workflow(config.clone(), runner, args.dry_run),
    };

    tracing::debug!("Execution ID: {}", sequence.execution_id());

    match sequence.execute_all().await {
        Ok(results) => {
            tracing::info!("✅ photo-recon completed successfully!");
            println!("✅ photo-recon completed successfully!");
            print_summary(&results);
        }
        Err(e) => {
            let exit_code = report_error(&e);
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
