//! Portal token lifecycle commands

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::time::Duration;

use crate::api::recovery::{AutoFixOrchestrator, FailureDetails};
use crate::api::{NewCredentialRecord, TokenManager, constants};
use crate::config::Config;

#[derive(Args)]
pub struct TokenCommands {
    #[command(subcommand)]
    pub command: TokenSubcommands,
}

#[derive(Subcommand)]
pub enum TokenSubcommands {
    /// Show cache and store status
    Status,
    /// Force a refresh from the credential store
    Refresh,
    /// Clear the token cache
    Clear,
    /// Deposit a captured credential into the store
    Capture {
        /// The credential value (with or without the bearer prefix)
        #[arg(long)]
        token: String,
        /// Token kind to deposit under
        #[arg(long, default_value = constants::TOKEN_KIND_PORTAL)]
        kind: String,
        /// Capture source tag
        #[arg(long, default_value = "manual")]
        source: String,
        /// URL the credential was captured against
        #[arg(long, default_value = "")]
        target_url: String,
        /// HTTP method of the captured call
        #[arg(long, default_value = "GET")]
        method: String,
        /// Header the credential was observed on
        #[arg(long, default_value = constants::headers::AUTHORIZATION)]
        header: String,
    },
    /// Delete superseded records, keeping the newest N
    Prune {
        /// Records to keep per kind
        #[arg(long, default_value_t = 5)]
        keep: u32,
    },
    /// Keep the token ready, reporting and auto-correcting failures
    Watch {
        /// Seconds between readiness checks
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
    /// Auto-fix engine controls
    Autofix(AutofixCommands),
}

#[derive(Args)]
pub struct AutofixCommands {
    #[command(subcommand)]
    pub command: AutofixSubcommands,
}

#[derive(Subcommand)]
pub enum AutofixSubcommands {
    /// Show the auto-fix engine state
    Status,
    /// Enable auto-correction
    Enable,
    /// Disable auto-correction
    Disable,
    /// Zero the attempt counter and clear error evidence
    Reset,
}

/// Handle token command
pub async fn token_command(
    cmd: TokenCommands,
    config: &Config,
    manager: &TokenManager,
    orchestrator: &AutoFixOrchestrator,
) -> Result<()> {
    match cmd.command {
        TokenSubcommands::Status => {
            let status = manager.status().await;
            println!();
            println!("  {}", "Portal token status".bright_white().bold());
            println!("    {}: {}", "Initialized".dimmed(), flag(status.initialized));
            println!("    {}: {}", "Cached".dimmed(), flag(status.cached));
            println!("    {}: {}", "Expired".dimmed(), flag(status.expired));
            println!("    {}: {}", "Valid".dimmed(), flag(status.valid));

            match config
                .latest_token(constants::TOKEN_KIND_PORTAL, constants::headers::ACCEPTED)
                .await?
            {
                Some(record) => {
                    println!();
                    println!("  {}", "Newest stored record".bright_white().bold());
                    println!("    {}: {}", "Captured at".dimmed(), record.captured_at);
                    println!("    {}: {}", "Source".dimmed(), record.source.cyan());
                    println!("    {}: {}", "Structured (JWT)".dimmed(), flag(record.is_jwt));
                }
                None => {
                    println!();
                    println!(
                        "  {}",
                        "No credential record in the store yet".bright_yellow()
                    );
                    println!(
                        "  {}",
                        "Deposit one with 'declare-cli token capture --token <value>'".dimmed()
                    );
                }
            }
        }

        TokenSubcommands::Refresh => {
            let info = manager.force_refresh().await;
            if info.valid {
                println!(
                    "{} Token refreshed (captured at {})",
                    "✓".green(),
                    info.captured_at
                );
            } else {
                println!(
                    "{} No usable credential in the store; confirm a capture exists",
                    "✗".red()
                );
            }
        }

        TokenSubcommands::Clear => {
            manager.clear().await;
            println!("{} Token cache cleared", "✓".green());
        }

        TokenSubcommands::Capture {
            token,
            kind,
            source,
            target_url,
            method,
            header,
        } => {
            let mut record = NewCredentialRecord::new(token, kind);
            record.source = source;
            record.target_url = target_url;
            record.method = method;
            record.header_name = header;

            let saved = config.save_token(record).await?;
            println!(
                "{} Stored credential record {} (kind: {}, JWT: {})",
                "✓".green(),
                saved.id,
                saved.kind.cyan(),
                saved.is_jwt
            );
        }

        TokenSubcommands::Prune { keep } => {
            let deleted = config.prune_tokens(constants::TOKEN_KIND_PORTAL, keep).await?;
            println!(
                "{} Pruned {} superseded records (kept newest {})",
                "✓".green(),
                deleted,
                keep
            );
        }

        TokenSubcommands::Watch { interval } => {
            watch(manager, orchestrator, Duration::from_secs(interval.max(1))).await?;
        }

        TokenSubcommands::Autofix(autofix) => match autofix.command {
            AutofixSubcommands::Status => {
                let status = orchestrator.status().await;
                println!();
                println!("  {}", "Auto-fix engine".bright_white().bold());
                println!("    {}: {}", "Enabled".dimmed(), flag(status.enabled));
                println!("    {}: {}", "In progress".dimmed(), flag(status.in_progress));
                println!(
                    "    {}: {}/{}",
                    "Attempts".dimmed(),
                    status.attempts,
                    status.max_attempts
                );
                match status.last_attempt_age_secs {
                    Some(age) => println!("    {}: {}s ago", "Last attempt".dimmed(), age),
                    None => println!("    {}: never", "Last attempt".dimmed()),
                }
                if !status.error_pattern_counts.is_empty() {
                    println!("    {}:", "Error evidence".dimmed());
                    for (category, count) in &status.error_pattern_counts {
                        println!("      {:?}: {}", category, count);
                    }
                }
            }
            AutofixSubcommands::Enable => {
                orchestrator.set_enabled(true).await;
                println!("{} Auto-fix enabled", "✓".green());
            }
            AutofixSubcommands::Disable => {
                orchestrator.set_enabled(false).await;
                println!("{} Auto-fix disabled", "✓".green());
            }
            AutofixSubcommands::Reset => {
                orchestrator.reset_state().await;
                println!("{} Auto-fix state reset", "✓".green());
            }
        },
    }

    Ok(())
}

/// Periodic readiness loop: checks the cache, feeds unusable-token evidence
/// to the auto-fix engine, and prints lifecycle events until interrupted.
async fn watch(
    manager: &TokenManager,
    orchestrator: &AutoFixOrchestrator,
    interval: Duration,
) -> Result<()> {
    let mut events = manager.events().subscribe();
    let mut ticker = tokio::time::interval(interval);

    println!(
        "Watching portal token readiness every {}s (Ctrl-C to stop)",
        interval.as_secs()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match manager.ensure_ready().await {
                    Ok(info) if info.valid => {
                        orchestrator.report_success().await;
                        println!("{} token ready (captured at {})", "✓".green(), info.captured_at);
                    }
                    Ok(_) => {
                        println!("{} stored credential unusable", "✗".red());
                        orchestrator
                            .report_failure(FailureDetails::new(
                                "stored portal credential unusable",
                            ))
                            .await;
                    }
                    Err(err) => {
                        println!("{} initialization failed: {:#}", "✗".red(), err);
                    }
                }
            }
            event = events.recv() => {
                if let Ok(event) = event {
                    println!("  {} {}", "event:".dimmed(), event.description());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping watch");
                break;
            }
        }
    }

    Ok(())
}

fn flag(value: bool) -> colored::ColoredString {
    if value {
        "yes".green()
    } else {
        "no".red()
    }
}
