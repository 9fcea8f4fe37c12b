//! lexflow - Main CLI Entry Point

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use lexflow::{
    cli::{Args, Commands, Verbosity},
    config::{Config, StorageBackend},
    llm::{HashingEmbedder, ScriptedProvider},
    service::{ChatRequest, Engine, ServiceBuilder},
    store::ExecutionQuery,
    telemetry::{init_tracing, TelemetryCollector, TelemetryDisplay},
    types::{NewKnowledgeEntry, Role},
    workflow::WorkflowRequest,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Reply of the offline provider
const OFFLINE_REPLY: &str = "(offline) Nenhum modelo configurado; resposta simulada.";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbosity());

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if args.offline {
        config.storage.backend = StorageBackend::Memory;
    }
    let engine = build_engine(&args, config)?;

    match &args.command {
        Commands::Chat {
            message,
            agent,
            conversation,
            folder,
        } => {
            let mut request = ChatRequest::new(&args.user, agent, message);
            request.conversation_id = *conversation;
            request.folder_id = folder.clone();
            run_chat(&args, &engine, request).await?;
        }
        Commands::Workflow {
            slug,
            input,
            conversation,
            folder,
        } => {
            let mut request =
                WorkflowRequest::new(slug, &args.user, input).with_folder(folder.clone());
            request.conversation_id = *conversation;
            run_workflow(&args, &engine, request).await?;
        }
        Commands::Agents => list_agents(&engine),
        Commands::Workflows => list_workflows(&engine),
        Commands::Conversations => list_conversations(&args, &engine).await?,
        Commands::Show { id } => show_conversation(&engine, *id).await?,
        Commands::Delete { id } => {
            engine.service.delete_conversation(*id, &args.user).await?;
            println!("✓ Conversation {} deleted", id);
        }
        Commands::Stats { agent } => show_stats(&engine, agent.as_deref()).await?,
        Commands::Failed { agent, limit } => {
            show_failed(&engine, agent.as_deref(), *limit).await?
        }
        Commands::Ingest {
            path,
            source_type,
            title,
            url,
            tags,
            backfill,
        } => {
            let mut entry = None;
            if let Some(path) = path {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let mut new_entry = NewKnowledgeEntry::new(source_type, content).with_tags(tags);
                new_entry.title = title
                    .clone()
                    .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()));
                new_entry.source_url = url.clone();
                entry = Some(new_entry);
            }
            run_ingest(&engine, entry, *backfill).await?;
        }
        Commands::Config { init } => show_config(&args, &engine.config, *init)?,
    }

    Ok(())
}

fn build_engine(args: &Args, config: Config) -> Result<Engine> {
    let mut builder = ServiceBuilder::new(config.clone());
    if args.offline {
        builder = builder
            .with_provider(Arc::new(ScriptedProvider::echo(OFFLINE_REPLY, 0)))
            .with_embedder(Arc::new(HashingEmbedder::new(
                config.provider.embedding_dimensions,
            )));
    }
    builder.build().context("Failed to assemble the engine")
}

fn spinner(args: &Args, message: &str) -> Option<ProgressBar> {
    if !matches!(args.verbosity(), Verbosity::Normal) {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

async fn run_chat(args: &Args, engine: &Engine, request: ChatRequest) -> Result<()> {
    let collector = TelemetryCollector::new();
    let display = TelemetryDisplay::new(collector.clone(), args.verbosity());

    let mut stream = engine.service.send_message_streaming(request).await?;
    let pb = spinner(args, "Agent thinking...");

    while let Some(event) = stream.events.recv().await {
        collector.record(&event);
        display.show_event(&event);
        if event.is_terminal() {
            break;
        }
    }
    let result = stream.finish().await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let response = match result {
        Ok(response) => response,
        Err(e) => bail!("{}", e),
    };

    println!("{}", response.outcome.output);
    if !response.outcome.citations.is_empty() && args.verbosity().show_progress() {
        println!();
        println!("{}", "Sources:".bold());
        for citation in &response.outcome.citations {
            println!(
                "  • [{}] {:.0}% {}",
                citation.source_type,
                citation.confidence_score * 100.0,
                citation.source_url.as_deref().unwrap_or(&citation.excerpt)
            );
        }
    }
    if args.verbosity().show_progress() {
        eprintln!(
            "{}",
            format!("conversation {}", response.conversation_id).dimmed()
        );
    }
    display.display_summary();
    Ok(())
}

async fn run_workflow(args: &Args, engine: &Engine, request: WorkflowRequest) -> Result<()> {
    let pb = spinner(args, &format!("Running workflow {}...", request.workflow_slug));
    let result = engine.service.execute_workflow(request).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let result = result?;

    if let Some(output) = &result.output {
        println!("{}", output);
    }
    eprintln!();
    eprintln!(
        "Steps: {}/{}  Tokens: {}  Conversation: {}",
        result.steps_completed, result.total_steps, result.total_tokens, result.conversation_id
    );
    if let Some(failure) = &result.failure {
        bail!("{}", failure);
    }
    Ok(())
}

fn list_agents(engine: &Engine) {
    println!("{}", "Agents:".bold());
    for agent in engine.service.list_agents() {
        let tools = if agent.tools.is_empty() {
            "-".to_string()
        } else {
            agent.tools.join(", ")
        };
        println!("  {} {}", agent.slug.cyan(), agent.description);
        println!("      model: {}  tools: {}", agent.model, tools);
    }
}

fn list_workflows(engine: &Engine) {
    println!("{}", "Workflows:".bold());
    for workflow in engine.service.list_workflows() {
        println!("  {} {}", workflow.slug.cyan(), workflow.description);
        println!("      {}", workflow.agent_sequence.join(" → "));
    }
}

async fn list_conversations(args: &Args, engine: &Engine) -> Result<()> {
    let conversations = engine.service.list_conversations(&args.user).await?;
    if conversations.is_empty() {
        println!("No conversations.");
        return Ok(());
    }
    for conversation in conversations {
        println!(
            "{}  {:<8} {:>7} tokens  {}  {}",
            conversation.id,
            conversation.mode.as_str(),
            conversation.total_tokens,
            conversation.updated_at.format("%Y-%m-%d %H:%M"),
            conversation.title.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn show_conversation(engine: &Engine, id: Uuid) -> Result<()> {
    let view = engine.service.get_conversation(id).await?;
    println!(
        "{} ({} tokens)",
        view.conversation.title.as_deref().unwrap_or("Conversation").bold(),
        view.conversation.total_tokens
    );
    for message in &view.messages {
        let speaker = match message.role {
            Role::User => "user".green(),
            Role::Assistant => message.agent_slug.as_deref().unwrap_or("assistant").cyan(),
            Role::System => "system".yellow(),
        };
        println!();
        println!("[{}] {}", message.position, speaker);
        println!("{}", message.content);
        for call in &message.tool_calls {
            println!("  {} {}", "tool:".dimmed(), call.tool_slug);
        }
    }

    let executions = engine
        .service
        .executions(&ExecutionQuery::conversation(id))
        .await?;
    if !executions.is_empty() {
        println!();
        println!("{}", "Executions:".bold());
        for execution in executions {
            println!(
                "  {} {:<18} {:<9} {:>6} tokens {:>7}ms",
                execution.id,
                execution.agent_slug,
                execution.status.as_str(),
                execution.tokens_used,
                execution.duration_ms.unwrap_or(0)
            );
        }
    }
    Ok(())
}

async fn show_stats(engine: &Engine, agent: Option<&str>) -> Result<()> {
    let stats = engine.service.statistics(agent).await?;
    println!("{}", format!("Executions ({})", agent.unwrap_or("all agents")).bold());
    println!("  Total:        {}", stats.total);
    println!("  Successful:   {}", stats.successful.to_string().green());
    println!("  Failed:       {}", stats.failed.to_string().red());
    println!("  Running:      {}", stats.running);
    println!("  Success rate: {:.1}%", stats.success_rate() * 100.0);
    println!("  Avg duration: {:.0}ms", stats.average_duration_ms);
    println!("  Total tokens: {}", stats.total_tokens);
    Ok(())
}

async fn show_failed(engine: &Engine, agent: Option<&str>, limit: usize) -> Result<()> {
    let failed = engine.service.failed_executions(agent, Some(limit)).await?;
    if failed.is_empty() {
        println!("No failed executions.");
        return Ok(());
    }
    for execution in failed {
        println!(
            "{} {} {} {}",
            execution.started_at.format("%Y-%m-%d %H:%M:%S"),
            execution.agent_slug.cyan(),
            execution.id,
            execution.error_message.as_deref().unwrap_or("-").red()
        );
    }
    Ok(())
}

async fn run_ingest(engine: &Engine, entry: Option<NewKnowledgeEntry>, backfill: bool) -> Result<()> {
    if entry.is_none() && !backfill {
        bail!("Nothing to ingest: pass a file or --backfill");
    }
    let handle = engine.ingestion_worker().spawn();

    if let Some(entry) = entry {
        let stored = handle.ingest(entry).await?;
        println!("✓ Stored knowledge entry {} ({})", stored.id, stored.source_type);
    }
    if backfill {
        let embedded = handle.backfill(64).await?;
        println!("✓ Embedded {} pending entries", embedded);
    }
    handle.shutdown().await?;
    println!("Knowledge base: {} entries", engine.knowledge.count().await?);
    Ok(())
}

fn show_config(args: &Args, config: &Config, init: bool) -> Result<()> {
    if init {
        let path = match &args.config {
            Some(path) => path.clone(),
            None => Config::default_path().context("Could not determine home directory")?,
        };
        config.save(&path)?;
        println!("✓ Wrote configuration to {}", path.display());
        return Ok(());
    }

    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}
