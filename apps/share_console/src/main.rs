use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use share_core::{
    ConfirmationCoordinator, ConfirmationModal, EventBus, RemovalOutcome, ShareWorkflow,
};
use shared::{
    domain::{CaseId, EntityId, OwnerId, Scope},
    error::{ShareError, ShareErrorReport},
    protocol::{BusEvent, EventName},
};
use storage::MemoryStorage;
use tracing_subscriber::EnvFilter;

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
struct Cli {
    /// Seed file with cases and their shares.
    #[arg(long)]
    seed: Option<PathBuf>,
    /// Page scope key; a fresh one is generated when omitted.
    #[arg(long)]
    scope: Option<String>,
    /// Print results as JSON.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List cases.
    List,
    /// List users and groups with access to a case.
    Entities { case_id: String },
    /// Share a case with a user or group.
    Add { case_id: String, entity_id: String },
    /// Remove access to a case, answering the confirmation prompt.
    Remove {
        case_id: String,
        entity_id: String,
        /// Answer the prompt with cancel instead of confirm.
        #[arg(long)]
        cancel: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(seed) = cli.seed.clone() {
        settings.seed_path = seed;
    }
    if let Some(scope) = cli.scope.clone() {
        settings.page_scope = Some(scope);
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = MemoryStorage::load_seed(&settings.seed_path)
        .await
        .context("failed to load case seed")?;
    let bus = Arc::new(EventBus::new());
    let scope = settings.scope();
    let workflow = ShareWorkflow::new(
        Arc::clone(&bus),
        Arc::new(store),
        ConfirmationCoordinator::with_timeout(Arc::clone(&bus), settings.confirmation_timeout()),
        scope.clone(),
    );
    register_drop_reporter(&bus, &scope);

    match cli.command {
        Command::List => {
            let cases = workflow.list_cases().await.map_err(report_failure)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&cases)?);
            } else {
                for case in cases {
                    println!("{}\t{}", case.id, case.name);
                }
            }
        }
        Command::Entities { case_id } => {
            let set = workflow
                .load_entities(&CaseId::new(case_id))
                .await
                .map_err(report_failure)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&set)?);
            } else {
                for entity in set.entities {
                    let marker = if entity.is_owner { " (owner)" } else { "" };
                    let name = entity.name.unwrap_or_default();
                    println!("{}\t{name}{marker}", entity.id);
                }
            }
        }
        Command::Add { case_id, entity_id } => {
            let case_id = CaseId::new(case_id);
            let current = workflow
                .load_entities(&case_id)
                .await
                .map_err(report_failure)?;
            let outcome = workflow
                .request_addition(&case_id, &entity_id, &current.entities)
                .await
                .map_err(report_failure)?;
            println!("{}", outcome.message);
            if outcome.refresh {
                let refreshed = workflow
                    .load_entities(&case_id)
                    .await
                    .map_err(report_failure)?;
                println!("{} users and groups now have access", refreshed.len());
            }
        }
        Command::Remove {
            case_id,
            entity_id,
            cancel,
        } => {
            let case_id = CaseId::new(case_id);
            let owner = workflow
                .load_owner(&case_id)
                .await
                .map_err(report_failure)?;
            let modal = ConfirmationModal::new(Arc::clone(&bus), scope.clone());
            modal.attach();

            workflow
                .request_removal(&case_id, &EntityId::new(entity_id), &owner)
                .map_err(report_failure)?;
            if let Some(target) = modal.shown_for() {
                println!(
                    "{}: remove {} from {}?",
                    modal.header_text, target.entity_id, target.case_id
                );
            }
            if cancel {
                println!("{}", modal.cancel_text);
                modal.cancel();
            } else {
                println!("{}", modal.confirmation_text);
                modal.confirm();
            }
            modal.detach();

            let outcomes = workflow.process_confirmed().await;
            if outcomes.is_empty() {
                println!("Removal cancelled");
            }
            for outcome in outcomes {
                print_removal(&outcome, cli.json);
            }
        }
    }

    Ok(())
}

fn register_drop_reporter(bus: &EventBus, scope: &Scope) {
    for event_name in [EventName::ShareDropSuccess, EventName::ShareDropFailure] {
        bus.register(
            event_name,
            scope.clone(),
            OwnerId::new("shareConsole"),
            Arc::new(|event: &BusEvent| -> anyhow::Result<()> {
                tracing::debug!(event = %event.name(), "console: drop result received");
                Ok(())
            }),
        );
    }
}

fn print_removal(outcome: &RemovalOutcome, json: bool) {
    if json {
        let report = outcome.result.as_ref().err().map(ShareErrorReport::from);
        println!(
            "{}",
            serde_json::json!({
                "case_id": outcome.target.case_id,
                "entity_id": outcome.target.entity_id,
                "error": report,
            })
        );
    } else {
        println!("{}", outcome.message());
    }
}

fn report_failure(err: ShareError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}
