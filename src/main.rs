//! AI Gateway CLI
//!
//! Sends chat completions through the rate-limited gateway client

use aigateway::config::{LoggingConfig, Settings};
use aigateway::models::{ChatCompletionRequest, ChatMessage, CompletionContent, JsonSchema};
use aigateway::services::{FlashcardGenerator, GatewayClient};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "aigateway")]
#[command(about = "Rate-limited client for OpenAI-compatible chat completion APIs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one prompt and print the completion
    Complete {
        /// Prompt text; read from stdin when omitted
        prompt: Option<String>,
        /// Optional system message
        #[arg(long)]
        system: Option<String>,
        /// JSON schema file requesting structured output
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Model overriding the configured default
        #[arg(long)]
        model: Option<String>,
    },
    /// Generate flashcard proposals from a text file (stdin when omitted)
    Flashcards {
        file: Option<PathBuf>,
    },
    /// Print the effective configuration's rate limit status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().context("Failed to load gateway settings")?;

    // Initialize logging
    init_logging(&settings.logging);
    info!(
        preset = settings.rate_limit.preset.as_str(),
        model = %settings.gateway.default_model,
        "Gateway settings loaded"
    );

    let client = GatewayClient::from_settings(&settings).context("Failed to create gateway client")?;

    match cli.command {
        Commands::Complete { prompt, system, schema, model } => {
            let prompt = match prompt {
                Some(prompt) => prompt,
                None => read_stdin()?,
            };

            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(ChatMessage::system(system)?);
            }
            messages.push(ChatMessage::user(prompt)?);

            let mut request = ChatCompletionRequest::new(messages);
            if let Some(model) = model {
                request = request.with_model(model);
            }
            if let Some(path) = schema {
                request = request.with_schema(load_schema(&path)?);
            }

            let response = client.chat_completion(request).await?;
            match response.content {
                CompletionContent::Text(text) => println!("{}", text),
                CompletionContent::Structured(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            }
            info!(
                model = %response.model,
                attempts = response.attempts,
                tokens_used = response.tokens_used,
                "Completion finished in {:.2}ms",
                response.duration.as_secs_f64() * 1000.0
            );
        }
        Commands::Flashcards { file } => {
            let source = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read source file: {:?}", path))?,
                None => read_stdin()?,
            };

            let generator = FlashcardGenerator::new(client);
            let proposals = generator.generate(&source, None).await?;
            println!("{}", serde_json::to_string_pretty(&proposals)?);
        }
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&client.rate_limit_status())?);
        }
    }

    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read stdin")?;
    Ok(input)
}

fn load_schema(path: &PathBuf) -> Result<JsonSchema> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file: {:?}", path))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| "Failed to parse schema JSON")?;
    Ok(JsonSchema::from_value(value)?)
}

/// Initialize logging system
fn init_logging(logging: &LoggingConfig) {
    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if logging.format == "json" {
        // JSON format logs (production environment)
        Box::new(tracing_subscriber::fmt()
            .with_env_filter(logging.level.as_str())
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .finish())
    } else {
        // Human readable format, on stderr so stdout stays clean for results
        Box::new(tracing_subscriber::fmt()
            .with_env_filter(logging.level.as_str())
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish())
    };

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Tracing subscriber already set");
    }
}
