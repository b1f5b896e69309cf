mod console;

use clap::Parser;
use colored::Colorize;
use deskflow_cloud::{CancellationToken, CheckpointStore, Pipeline};
use deskflow_cloud_aws::AwsWorkspacesProvider;
use deskflow_config::DeskflowConfig;
use std::path::PathBuf;
use std::sync::Arc;

/// 設定エラー (作成 API を呼ぶ前に失敗) の終了コード
const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_ABORTED: i32 = 1;

#[derive(Parser)]
#[command(name = "deskflow")]
#[command(version)]
#[command(
    about = "Import a machine image, build a bundle and launch a WorkSpaces desktop",
    long_about = None
)]
struct Cli {
    /// Configuration file (KDL)
    #[arg(short, long, env = "DESKFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// AWS region
    #[arg(long, env = "DESKFLOW_REGION")]
    region: Option<String>,

    /// AWS shared config profile
    #[arg(long, env = "DESKFLOW_PROFILE")]
    profile: Option<String>,

    /// Discard an existing checkpoint before starting
    #[arg(long, conflicts_with = "no_checkpoint")]
    fresh: bool,

    /// Run without checkpoint persistence
    #[arg(long)]
    no_checkpoint: bool,

    /// Delete created resources when the run aborts
    #[arg(long)]
    cleanup_on_abort: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// コマンドラインの指定を設定ファイルより優先する
    fn apply_overrides(&self, config: &mut DeskflowConfig) {
        if let Some(region) = &self.region {
            config.region = Some(region.clone());
        }
        if let Some(profile) = &self.profile {
            config.profile = Some(profile.clone());
        }
        if self.cleanup_on_abort {
            config.cleanup_on_abort = true;
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new(
            "info,deskflow=debug,deskflow_cloud=debug,deskflow_cloud_aws=debug,deskflow_config=debug",
        )
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// 1 回目の Ctrl-C でパイプラインをキャンセル、2 回目で即時終了
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!(
            "{}",
            "Interrupt received, cancelling... (press Ctrl-C again to exit now)".yellow()
        );
        cancel.cancel("interrupted by user");

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Exiting without waiting for cleanup".red());
            std::process::exit(EXIT_ABORTED);
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match deskflow_config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Configuration error:".red().bold(), e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };
    cli.apply_overrides(&mut config);

    match &config.source {
        Some(path) => println!("Config: {}", path.display().to_string().cyan()),
        None => println!("Config: {}", "built-in defaults".dimmed()),
    }

    let provider =
        AwsWorkspacesProvider::from_env(config.region.as_deref(), config.profile.as_deref()).await;
    println!("Region: {}", provider.region().cyan());

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let mut pipeline = Pipeline::new(Arc::new(provider), config.plan.clone())
        .with_waits(config.waits.clone())
        .with_cancellation(cancel)
        .with_reporter(Arc::new(console::ConsoleReporter::new(cli.verbose)))
        .cleanup_on_abort(config.cleanup_on_abort);

    if !cli.no_checkpoint {
        pipeline = pipeline
            .with_checkpoint(CheckpointStore::new(&config.state_dir))
            .fresh(cli.fresh);
    }

    match pipeline.run().await {
        Ok(desktop) => {
            console::print_success(&desktop);
            Ok(())
        }
        Err(aborted) => {
            console::print_abort(&aborted);
            std::process::exit(EXIT_ABORTED);
        }
    }
}
