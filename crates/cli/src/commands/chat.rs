//! `persona chat` — Single-message or interactive conversation.

use persona_config::AppConfig;
use persona_core::cache::CacheMetrics;
use persona_core::message::{ConversationRequest, HistoryMessage};
use persona_engine::ConversationService;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::{CommandResult, Session, Target};

pub async fn run(target: Target, message: Option<String>) -> CommandResult {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let provider = match persona_providers::build_from_config(&config) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!();
            eprintln!("  ERROR: {e}");
            eprintln!();
            eprintln!("  Set one of these environment variables:");
            eprintln!("    PERSONA_API_KEY / ANTHROPIC_API_KEY / OPENAI_API_KEY");
            eprintln!();
            eprintln!("  Or add it to your config file:");
            eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
            eprintln!();
            return Err("No usable provider. See above for setup instructions.".into());
        }
    };

    let session = Session::open(config, &target).await?;
    let service =
        ConversationService::from_config(session.assembler.clone(), provider, &session.config);

    let outcome = if let Some(msg) = message {
        single(&service, &target, msg).await
    } else {
        interactive(&service, &target, &session).await
    };
    session.close().await;
    outcome
}

fn request_for(
    target: &Target,
    message: String,
    history: &[HistoryMessage],
) -> ConversationRequest {
    let mut request = ConversationRequest::new(&target.character, &target.user, message)
        .with_history(history.to_vec());
    if let Some(scenario) = &target.scenario {
        request = request.with_scenario(scenario);
    }
    request
}

async fn single(service: &ConversationService, target: &Target, message: String) -> CommandResult {
    eprint!("  Thinking...");
    let response = service
        .process_request(&request_for(target, message, &[]), CancellationToken::new())
        .await;
    eprint!("\r              \r");
    let response = response?;
    println!("{}", response.content);
    eprintln!("{}", describe_metrics(&response.cache_metrics));
    Ok(())
}

async fn interactive(
    service: &ConversationService,
    target: &Target,
    session: &Session,
) -> CommandResult {
    println!();
    println!("  Persona — Interactive Mode");
    println!();
    println!("  Provider:  {}", session.config.default_provider);
    println!("  Model:     {}", session.config.default_model);
    println!("  Character: {}", target.character);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C cancels a pending reply; 'exit' quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<HistoryMessage> = Vec::new();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let request = request_for(target, line.clone(), &history);
        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });

        let result = service.process_request(&request, cancel).await;
        ctrl_c.abort();

        match result {
            Ok(response) => {
                println!();
                for text in response.content.lines() {
                    println!("  {} > {text}", target.character);
                }
                println!("  {}", describe_metrics(&response.cache_metrics));
                println!();
                history.push(HistoryMessage::user(line));
                history.push(HistoryMessage::assistant(response.content));
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn describe_metrics(metrics: &CacheMetrics) -> String {
    let latency = metrics.latency.as_millis();
    if !metrics.hit {
        return format!("[cache miss, {latency} ms]");
    }
    let layers = if metrics.layers.is_empty() {
        "response memo".to_string()
    } else {
        metrics
            .layers
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("[cache hit: {layers}, ~{} tokens saved, {latency} ms]", metrics.saved_tokens)
}
