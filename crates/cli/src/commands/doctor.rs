//! `persona doctor` — Diagnose configuration and provider health.

use persona_config::AppConfig;

use super::CommandResult;

pub async fn run() -> CommandResult {
    println!("Persona Doctor — System Diagnostics");
    println!("===================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file — defaults in use (run `persona onboard`)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  1 issue(s) found. Fix the config before continuing.");
            return Ok(());
        }
    };

    println!("  Provider: {}", config.default_provider);
    println!("  Model:    {}", config.default_model);
    println!(
        "  Cache:    base TTL {}s (clamped to {}s..{}s), responses {}s",
        config.cache.base_ttl_secs,
        config.cache.min_ttl_secs,
        config.cache.max_ttl_secs,
        config.cache.response_ttl_secs
    );

    if !config.has_api_key() && config.default_provider != "ollama" {
        println!("  ⚠️  No API key configured — set PERSONA_API_KEY or api_key in config.toml");
        issues += 1;
    }

    match persona_providers::build_from_config(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider '{}' reachable", provider.name()),
            Ok(false) => {
                println!(
                    "  ⚠️  Provider '{}' answered the health check with an error",
                    provider.name()
                );
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider '{}' unreachable: {e}", provider.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Provider not usable: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
