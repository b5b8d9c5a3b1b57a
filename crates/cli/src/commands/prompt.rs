//! `persona prompt` — Assemble a prompt and show its layers.

use persona_config::AppConfig;
use persona_core::message::ConversationRequest;
use persona_engine::AssembledPrompt;

use super::{CommandResult, Session, Target};

pub async fn run(target: Target, message: String) -> CommandResult {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let session = Session::open(config, &target).await?;

    let mut request = ConversationRequest::new(&target.character, &target.user, message);
    if let Some(scenario) = &target.scenario {
        request = request.with_scenario(scenario);
    }

    let assembled = session.assembler.build_prompt(&request).await;
    session.close().await;
    let assembled = assembled?;

    println!("{}", render_table(&assembled));
    println!("--- prefix ({} chars) ---", assembled.prefix.len());
    println!("{}", assembled.prefix);
    println!("--- suffix ---");
    println!("{}", assembled.suffix);
    Ok(())
}

fn render_table(assembled: &AssembledPrompt) -> String {
    let mut out = format!("  {:<18} {:>7} {:>9}  {}\n", "LAYER", "TOKENS", "TTL", "SOURCE");
    for bp in &assembled.breakpoints {
        out.push_str(&format!(
            "  {:<18} {:>7} {:>8}s  {}\n",
            bp.layer.as_str(),
            bp.token_count,
            bp.ttl.as_secs(),
            if bp.from_cache { "cache" } else { "fresh" }
        ));
    }
    out.push_str(&format!("  {:<18} {:>7}", "total", assembled.total_tokens()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use persona_core::cache::{CacheBreakpoint, CacheLayer};
    use std::time::Duration;

    #[test]
    fn table_lists_every_layer() {
        let mut core =
            CacheBreakpoint::new(CacheLayer::CorePersonality, "core text", Duration::from_secs(60));
        core.from_cache = true;
        let assembled = AssembledPrompt {
            full_prompt: String::new(),
            prefix: String::new(),
            suffix: String::new(),
            breakpoints: vec![
                CacheBreakpoint::new(CacheLayer::SystemAdmin, "rules", Duration::from_secs(86400)),
                core,
            ],
            is_complex: false,
        };
        let table = render_table(&assembled);
        assert!(table.contains("system_admin"));
        assert!(table.contains("86400s"));
        assert!(table.lines().any(|l| l.contains("core_personality") && l.ends_with("cache")));
        assert!(table.lines().last().unwrap().contains("total"));
    }
}
