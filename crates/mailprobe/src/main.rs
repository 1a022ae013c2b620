//! `mailprobe` - end-to-end email delivery probe
//!
//! Sends a uniquely tagged message through one endpoint's SMTP server and
//! watches the POP3 mailboxes of both endpoints for the outcome.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use mailprobe_core::{
    ConfigFile, Endpoint, Pop3Connector, Probe, RunConfig, RunCoordinator, SmtpTransmitter, Status,
    dump_mailbox, purge_mailbox, validate_endpoint,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Email delivery probe between SMTP/POP3 endpoints
#[derive(Parser, Debug)]
#[command(name = "mailprobe")]
#[command(about = "Verify email delivery between mail endpoints", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the endpoint configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a probe and wait for the delivery verdict
    Run {
        /// Sending endpoint name
        #[arg(long)]
        from: String,

        /// Receiving endpoint name
        #[arg(long)]
        to: String,

        /// Probe subject (generated when omitted)
        #[arg(long)]
        subject: Option<String>,

        /// Probe body text
        #[arg(long, default_value = "mailprobe delivery probe")]
        body: String,

        /// File to attach to the probe
        #[arg(long)]
        attachment: Option<PathBuf>,

        /// Status the run is expected to end in
        #[arg(long, default_value = "completed")]
        expect: Status,

        /// Wait for a confirmation at the sending endpoint
        #[arg(long)]
        require_confirmation: bool,

        /// Polling cycles per endpoint before giving up
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Seconds between polling cycles
        #[arg(long)]
        retry_delay: Option<u64>,
    },
    /// Delete every message in an endpoint's mailbox
    Purge {
        /// Endpoint name
        name: String,
    },
    /// List the messages in an endpoint's mailbox
    Dump {
        /// Endpoint name
        name: String,
    },
    /// Validate the configuration file
    CheckConfig,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailprobe=info,mailprobe_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(ConfigFile::default_path);
    let config = ConfigFile::load(&path)
        .await
        .with_context(|| format!("loading {}", path.display()))?;

    let success = match cli.command {
        Commands::Run {
            from,
            to,
            subject,
            body,
            attachment,
            expect,
            require_confirmation,
            max_attempts,
            retry_delay,
        } => {
            let sending = checked_endpoint(&config, &from)?;
            let receiving = checked_endpoint(&config, &to)?;

            let mut run = config.run.clone();
            if require_confirmation {
                run = run.with_require_confirmation(true);
            }
            if let Some(max_attempts) = max_attempts {
                run.retry = run.retry.with_max_attempts(max_attempts);
            }
            if let Some(secs) = retry_delay {
                run.retry = run.retry.with_retry_delay(Duration::from_secs(secs));
            }

            let subject = subject.unwrap_or_else(|| Probe::generate_subject("mailprobe"));
            let mut probe = Probe::between(subject, sending, receiving).with_body(body);
            if let Some(path) = attachment {
                probe = probe.with_attachment(path);
            }

            cmd_run(run, sending, receiving, &probe, expect).await?
        }
        Commands::Purge { name } => {
            let endpoint = checked_endpoint(&config, &name)?;
            let limit = config.run.max_message_size;
            let purged = purge_mailbox(&Pop3Connector::new(), endpoint, limit).await?;
            println!("{purged} message(s) deleted from {name}");
            true
        }
        Commands::Dump { name } => {
            let endpoint = checked_endpoint(&config, &name)?;
            let limit = config.run.max_message_size;
            let summaries = dump_mailbox(&Pop3Connector::new(), endpoint, limit).await?;
            println!("{}", serde_json::to_string_pretty(&summaries)?);
            true
        }
        Commands::CheckConfig => cmd_check_config(&config),
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_run(
    run: RunConfig,
    sending: &Endpoint,
    receiving: &Endpoint,
    probe: &Probe,
    expect: Status,
) -> anyhow::Result<bool> {
    info!(
        subject = %probe.subject,
        max_attempts = run.retry.max_attempts,
        wait_secs = run.retry.budget().as_secs(),
        "starting probe"
    );
    let coordinator = RunCoordinator::new(
        SmtpTransmitter::new(run.client_hostname.clone()),
        Pop3Connector::new(),
        run,
    );

    let mut matched = false;
    let report = coordinator
        .run(
            |outcome| match outcome {
                Ok(()) => {
                    info!(%expect, "probe matched expectation");
                    matched = true;
                }
                Err(e) => error!(error = %e, "probe did not match expectation"),
            },
            sending,
            receiving,
            probe,
            expect,
        )
        .await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(matched)
}

fn cmd_check_config(config: &ConfigFile) -> bool {
    match config.validate() {
        Ok(()) => {
            println!("{} endpoint(s) valid", config.endpoints.len());
            true
        }
        Err(invalid) => {
            for (name, errors) in invalid {
                for error in errors {
                    println!("{name}: {error}");
                }
            }
            false
        }
    }
}

fn checked_endpoint<'a>(config: &'a ConfigFile, name: &str) -> anyhow::Result<&'a Endpoint> {
    let endpoint = config.endpoint(name)?;
    if let Err(errors) = validate_endpoint(endpoint) {
        let details = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        bail!("endpoint {name:?} is invalid: {details}");
    }
    Ok(endpoint)
}
