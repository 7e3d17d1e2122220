//! Terminal client: submit a contract, follow the audit, print the report.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use auditwolf::config::AppConfig;
use auditwolf::models::audit::{AuditReport, AuditSubmission};
use auditwolf::services::audit_client::{AuditClient, StaticToken};
use auditwolf::services::notify::HttpNotifier;
use auditwolf::services::poller::{PollHandle, PollOutcome};
use auditwolf::services::report::StorageLocation;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "auditwolf-cli")]
#[command(about = "Submit smart contracts to Audit Wolf and follow the results")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print machine-readable JSON instead of a text summary
    #[arg(long, global = true)]
    json: bool,

    /// Access token (defaults to AUDITWOLF_TOKEN)
    #[arg(long, global = true, env = "AUDITWOLF_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a Solidity source file and wait for the report
    Submit {
        /// Path to the contract source
        file: PathBuf,

        /// Wallet or contract address the audit belongs to
        #[arg(long, default_value = "")]
        wallet: String,

        /// Where to send the "report ready" email
        #[arg(long)]
        email: Option<String>,

        /// Return right after submission instead of polling
        #[arg(long)]
        no_wait: bool,
    },
    /// Show the current status of an audit
    Status { id: String },
    /// Fetch the report of a completed audit
    Report { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "auditwolf=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("AUDIT_API_URL must be set")?;

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;
    let client = AuditClient::new(
        http.clone(),
        &config.audit_api_url,
        StorageLocation {
            base_url: config.supabase_url.clone(),
            bucket: config.storage_bucket.clone(),
        },
    )
    .with_tokens(Arc::new(StaticToken(cli.token.clone())))
    .with_notifier(Arc::new(HttpNotifier::new(http, &config.notify_url)));

    match cli.command {
        Commands::Submit {
            file,
            wallet,
            email,
            no_wait,
        } => {
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let audit_id = client
                .submit(&AuditSubmission { wallet, code, email })
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            eprintln!("Submitted audit {audit_id}");

            if no_wait {
                println!("{audit_id}");
                return Ok(());
            }

            let mut poll = PollHandle::spawn_with_observer(
                Arc::new(client.clone()),
                audit_id.clone(),
                config.poll.clone(),
                |attempt, status| eprintln!("[{attempt}] {status}"),
            );

            // Dropping the handle on ctrl-c aborts the local poll only.
            let outcome = tokio::select! {
                outcome = poll.wait() => outcome.map_err(|e| anyhow::anyhow!(e.user_message()))?,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("Stopped following audit {audit_id}; it keeps running on the server.");
                    return Ok(());
                }
            };

            match outcome {
                PollOutcome::Completed { report } => print_report(&report, cli.json)?,
                PollOutcome::Failed => bail!("Audit {audit_id} failed on the server"),
                PollOutcome::TimedOut { attempts, elapsed_secs } => bail!(
                    "Audit {audit_id} still running after {attempts} checks ({elapsed_secs}s); try `auditwolf-cli report {audit_id}` later"
                ),
                PollOutcome::Unreachable { reason } => {
                    bail!("Lost contact with the audit service: {reason}")
                }
            }
        }
        Commands::Status { id } => {
            let status = client
                .poll_status(&id)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{status}");
        }
        Commands::Report { id } => {
            match client
                .fetch_report(&id)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?
            {
                Some(report) => print_report(&report, cli.json)?,
                None => eprintln!("Audit {id} is not finished yet."),
            }
        }
    }

    Ok(())
}

fn print_report(report: &AuditReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Audit Report: {}", report.display_name());
    println!("Security Score: {}/100 ({})", report.security_score, report.rating);
    let s = &report.summary;
    println!(
        "Issues: {} total, {} critical, {} high, {} medium, {} low",
        s.total_issues, s.critical_issues, s.high_issues, s.medium_issues, s.low_issues
    );

    if report.findings.is_empty() {
        println!("\nNo vulnerabilities found.");
    } else {
        println!("\nVulnerabilities:");
        for f in &report.findings {
            println!("  [{}] line {}: {} ({})", f.severity, f.line, f.title, f.category);
            if !f.recommendation.is_empty() {
                println!("      -> {}", f.recommendation);
            }
        }
    }

    if report.gas.suggestions.is_empty() {
        println!("\nNo gas optimizations suggested.");
    } else {
        println!("\nGas Optimizations (estimated total gas {}):", report.gas.estimated_gas);
        for g in &report.gas.suggestions {
            println!("  line {}: {} (~{} gas)", g.line, g.description, g.estimated_savings);
        }
    }

    if let Some(url) = &report.download_url {
        println!("\nDownload PDF: {url}");
    }
    Ok(())
}
