use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use clap::Parser;

use acttest::browser::WaitUntil;
use acttest::browser::chromium::{BrowserOptions, ChromiumDriver};
use acttest::document::{Batch, Script, list_documents};
use acttest::report::time_stamp;
use acttest::runner::{Modules, RunOptions, Runner, run_batch, run_script};

#[derive(Parser)]
#[command(version, about)]
struct CLI {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Perform a script, once or once per host of a batch.
    Run {
        script: PathBuf,
        #[arg(long)]
        batch: Option<PathBuf>,
        #[arg(long, env = "REPORTDIR")]
        report_dir: PathBuf,
        #[arg(long, default_value_t = false)]
        headless: bool,
        #[arg(long, default_value_t = false)]
        no_sandbox: bool,
        #[arg(long, default_value_t = 1024)]
        width: u16,
        #[arg(long, default_value_t = 768)]
        height: u16,
        #[arg(long, value_enum, default_value_t = WaitUntil::DomContentLoaded)]
        wait_until: WaitUntil,
    },
    /// List the available scripts and batches.
    List {
        #[arg(long, env = "SCRIPTDIR")]
        script_dir: PathBuf,
        #[arg(long, env = "BATCHDIR")]
        batch_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_target(true)
        .init();
    let cli = CLI::parse();
    let outcome = match cli.command {
        Command::Run {
            script,
            batch,
            report_dir,
            headless,
            no_sandbox,
            width,
            height,
            wait_until,
        } => {
            let browser_options = BrowserOptions {
                headless,
                width,
                height,
                no_sandbox,
            };
            run(
                &script,
                batch.as_deref(),
                &report_dir,
                browser_options,
                wait_until,
            )
            .await
        }
        Command::List {
            script_dir,
            batch_dir,
        } => list(&script_dir, &batch_dir).await,
    };
    match outcome {
        Ok(()) => Ok(()),
        Err(error) => {
            eprintln!("{:#}", error);
            std::process::exit(2);
        }
    }
}

async fn run(
    script_path: &Path,
    batch_path: Option<&Path>,
    report_dir: &Path,
    browser_options: BrowserOptions,
    wait_until: WaitUntil,
) -> Result<()> {
    let script = Script::from_path(script_path).await?;
    let batch = match batch_path {
        Some(path) => Some(Batch::from_path(path).await?),
        None => None,
    };
    let base_directory = std::path::absolute(script_path)
        .context("resolving the script directory")?
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let options = RunOptions {
        wait_until,
        base_directory,
        ..RunOptions::default()
    };
    let runner = Runner::new(
        Arc::new(ChromiumDriver::new(browser_options)),
        Arc::new(Modules::builtin()),
        options,
    );
    let stamp = time_stamp(SystemTime::now());

    match batch {
        None => {
            run_script(&runner, &script, report_dir, &stamp).await?;
        }
        Some(batch) => {
            let reports =
                run_batch(Arc::new(runner), &script, &batch, report_dir, &stamp)
                    .await;
            let failures: Vec<String> = reports
                .iter()
                .zip(&batch.hosts)
                .filter_map(|(report, host)| {
                    report
                        .as_ref()
                        .err()
                        .map(|error| format!("{}: {:#}", host.which, error))
                })
                .collect();
            if !failures.is_empty() {
                anyhow::bail!(
                    "batch {} failed for {}",
                    batch.name,
                    failures.join("; ")
                );
            }
        }
    }
    log::info!("reports stored in {}", report_dir.display());
    Ok(())
}

async fn list(script_dir: &Path, batch_dir: &Path) -> Result<()> {
    println!("Scripts:");
    for (name, what) in list_documents(script_dir).await? {
        println!("{}: {}", name, what);
    }
    println!();
    println!("Batches:");
    println!("None: Perform the script without a batch");
    for (name, what) in list_documents(batch_dir).await? {
        println!("{}: {}", name, what);
    }
    Ok(())
}
