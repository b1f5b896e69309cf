//! 端末向けの進捗表示

use colored::Colorize;
use deskflow_cloud::{
    CompensationOutcome, CreatedResources, PipelineAborted, ProgressEvent, ProgressReporter,
    ProvisionedDesktop,
};

/// パイプラインの進捗を 1 行ずつ標準出力へ表示
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Resumed { run_id, stages } => {
                println!(
                    "{} {} ({} stages recorded)",
                    "↻ Resuming run".yellow(),
                    run_id.cyan(),
                    stages
                );
            }
            ProgressEvent::Discarded { run_id, created } => {
                println!("{} {}", "Discarded checkpoint of run".yellow(), run_id.cyan());
                if !created.is_empty() {
                    print_untracked(created);
                }
            }
            ProgressEvent::StageStarted { stage, detail } => {
                println!("{} {}", format!("[{stage}]").blue().bold(), detail);
            }
            ProgressEvent::StageSkipped { stage, resource_id } => {
                println!(
                    "{} {} already done: {}",
                    "↷".dimmed(),
                    format!("[{stage}]").dimmed(),
                    resource_id.cyan()
                );
            }
            ProgressEvent::Polled { kind, id, state } => {
                if self.verbose {
                    println!("  · {} {} is {}", kind, id, state.yellow());
                }
            }
            ProgressEvent::StageCompleted { stage, resource_id } => {
                println!("  {} {} {}", "✓".green(), stage, resource_id.cyan());
            }
            ProgressEvent::Compensated {
                kind,
                resource_id,
                error: None,
            } => {
                println!("  {} removed {} {}", "✓".green(), kind, resource_id.cyan());
            }
            ProgressEvent::Compensated {
                kind,
                resource_id,
                error: Some(error),
            } => {
                eprintln!(
                    "  {} failed to remove {} {}: {}",
                    "⚠".yellow(),
                    kind,
                    resource_id,
                    error
                );
            }
            ProgressEvent::Aborted { stage, error } => match stage.resource_kind() {
                Some(kind) => eprintln!(
                    "{} {} ({}): {}",
                    "✗ Aborted at".red().bold(),
                    stage,
                    kind,
                    error
                ),
                None => eprintln!("{} {}: {}", "✗ Aborted at".red().bold(), stage, error),
            },
            // 最終結果は print_success で表示する
            ProgressEvent::Done { .. } => {}
        }
    }
}

pub fn print_success(desktop: &ProvisionedDesktop) {
    println!();
    println!("{}", "✓ Desktop is available".green().bold());
    println!("  Image:   {}", desktop.image_id.cyan());
    println!("  Bundle:  {}", desktop.bundle_id.cyan());
    println!("  Desktop: {}", desktop.desktop_id.cyan());
    println!("  Private: {}", desktop.private_address);
    println!("  Public:  {}", desktop.public_address.green().bold());
}

pub fn print_abort(aborted: &PipelineAborted) {
    eprintln!();
    eprintln!("{} {}", "✗".red().bold(), aborted);

    if !aborted.compensation.is_empty() {
        print_leftovers(&aborted.compensation);
    } else if !aborted.created.is_empty() {
        print_created(&aborted.created);
    }
}

fn print_created(created: &CreatedResources) {
    eprintln!("{}", "Resources created by this run were left in place:".yellow());
    for (kind, id) in created.newest_first() {
        eprintln!("  • {} {}", kind, id);
    }
    eprintln!("Re-run to resume, or pass --cleanup-on-abort to remove them.");
}

fn print_untracked(created: &CreatedResources) {
    println!(
        "{}",
        "These resources are no longer tracked and were not removed:".yellow()
    );
    for (kind, id) in created.newest_first() {
        println!("  • {} {}", kind, id.cyan());
    }
}

fn print_leftovers(outcomes: &[CompensationOutcome]) {
    let remaining: Vec<_> = outcomes.iter().filter(|o| !o.succeeded()).collect();
    if remaining.is_empty() {
        eprintln!("{}", "All resources created by this run were removed.".dimmed());
        return;
    }
    eprintln!("{}", "These resources could not be removed:".yellow());
    for outcome in remaining {
        eprintln!("  • {} {}", outcome.kind, outcome.resource_id);
    }
}
