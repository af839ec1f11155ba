//! medassist CLI
//!
//! Interactive consultation in the terminal. Attach files inline with
//! `--image <path>` and `--file <path>`; type `exit` to quit.

mod input;

use std::io::Write;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_runtime::ProviderConfig;
use med_advisor::{
    intake, research, AdvisorConfig, Collaborators, Consultation, ConsultationManager,
    ResearchSettings,
};

use crate::input::TurnInput;

/// MedAssist command-line consultation
#[derive(Parser, Debug)]
#[command(name = "medassist", version, about = "MedAssist CLI consultation", long_about = None)]
struct Cli {
    /// Start an interactive chat session
    #[arg(long)]
    interactive: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never mix with the conversation
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if !cli.interactive {
        println!("Please use the --interactive flag to start a chat session.");
        println!("Example: medassist --interactive");
        return Ok(());
    }

    let provider_config = ProviderConfig::from_env()?;
    let provider = provider_config.build()?;
    let config = AdvisorConfig::from_env(
        provider_config.kind.default_agent_model(),
        provider_config.kind.default_decision_model(),
    )?;
    let pipeline = research::pipeline_from_env(
        provider.clone(),
        ResearchSettings::from_env(&config.agent_model)?,
    );

    let manager = ConsultationManager::new(Collaborators::new(provider, pipeline), config);
    let consultation = manager.open().await?;

    interactive_chat(&consultation).await
}

async fn interactive_chat(consultation: &Consultation) -> anyhow::Result<()> {
    println!("Welcome to the MedAssist CLI Chat! Type 'exit' to end the conversation.");
    println!("To attach files, use the following syntax anywhere in a message:");
    println!("  --image path/to/image.jpg");
    println!("  --file path/to/document.pdf");
    println!("You can include multiple files in a single message.");
    println!("Start chatting:");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        if line.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }

        let turn = TurnInput::parse(line);
        if turn.is_empty() {
            println!("Please provide a message or file to process.");
            continue;
        }

        let mut attachments = Vec::new();
        let mut rejected = false;
        for path in turn.paths() {
            match intake::attachment_from_path(path).await {
                Ok(attachment) => attachments.push(attachment),
                Err(e) => {
                    println!("{}", e.user_message());
                    rejected = true;
                }
            }
        }
        if rejected {
            continue;
        }

        match consultation.send(&turn.message, attachments).await {
            Ok(reply) => println!("\nAI: {}", reply.message),
            Err(e) => {
                tracing::error!(error = %e, "Consultation turn failed");
                println!("\nAI: {}", e.user_message());
            }
        }
    }

    Ok(())
}
