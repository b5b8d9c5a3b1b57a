//! Request processing — memo fast path, prompt assembly, provider call,
//! cache population.

use persona_cache::{CacheService, ResponseMemo, generate_cache_key};
use persona_config::AppConfig;
use persona_core::cache::{CacheLayer, CacheMetrics};
use persona_core::error::{Error, ProviderError, Result};
use persona_core::message::ConversationRequest;
use persona_core::provider::{AiResponse, PromptRequest, Provider, ProviderResponse, TokenUsage};
use persona_core::token::estimate_tokens;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::assembler::{AssembledPrompt, PromptAssembler};

/// Serves conversation turns through the layered caches.
pub struct ConversationService {
    assembler: Arc<PromptAssembler>,
    provider: Arc<dyn Provider>,
    cache: Arc<CacheService>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    request_timeout: Duration,
}

impl ConversationService {
    pub fn new(
        assembler: Arc<PromptAssembler>,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
    ) -> Self {
        let cache = Arc::clone(assembler.cache());
        Self {
            assembler,
            provider,
            cache,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn from_config(
        assembler: Arc<PromptAssembler>,
        provider: Arc<dyn Provider>,
        config: &AppConfig,
    ) -> Self {
        Self::new(assembler, provider, config.default_model.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_request_timeout(config.request_timeout())
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn assembler(&self) -> &Arc<PromptAssembler> {
        &self.assembler
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.cache
    }

    /// Answer one conversation turn.
    ///
    /// Caches are written only after the provider succeeds. `cancel` aborts
    /// an in-flight provider call with [`ProviderError::Cancelled`].
    pub async fn process_request(
        &self,
        request: &ConversationRequest,
        cancel: CancellationToken,
    ) -> Result<AiResponse> {
        let span = info_span!(
            "process_request",
            request_id = %Uuid::new_v4(),
            character_id = %request.character_id,
            user_id = %request.user_id,
        );
        self.process(request, cancel).instrument(span).await
    }

    async fn process(
        &self,
        request: &ConversationRequest,
        cancel: CancellationToken,
    ) -> Result<AiResponse> {
        let started = Instant::now();

        // ── Fast path: exact-request memo ──────────────────────────────────
        let memo_key =
            ResponseMemo::generate_key(&request.character_id, &request.user_id, &request.message);
        if let Some(cached) = self.cache.responses.get(&memo_key).await {
            debug!(hits = cached.hit_count, "Response memo hit");
            return Ok(AiResponse {
                content: cached.content,
                cache_metrics: CacheMetrics {
                    hit: true,
                    layers: Vec::new(),
                    saved_tokens: cached.token_usage.total_tokens as usize,
                    latency: started.elapsed(),
                },
                token_usage: cached.token_usage,
                model: cached.model,
            });
        }

        // ── Assemble and look up the local entry ───────────────────────────
        let assembled = self.assembler.build_prompt(request).await?;
        let cache_key = generate_cache_key(
            &request.character_id,
            &request.user_id,
            request.scenario_id.as_deref(),
            &assembled.breakpoints,
        );
        let entry = self.cache.breakpoints.get(&cache_key).await;
        let ttl = self
            .cache
            .breakpoints
            .calculate_adaptive_ttl(entry.as_ref(), assembled.is_complex);
        debug!(
            key = %cache_key,
            local_hit = entry.is_some(),
            ttl_secs = ttl.as_secs(),
            "Breakpoint store lookup"
        );

        // ── Provider call, outside every cache lock ────────────────────────
        let prompt = PromptRequest {
            model: self.model.clone(),
            character_id: request.character_id.clone(),
            user_id: request.user_id.clone(),
            system_prompt: assembled.prefix.clone(),
            message: assembled.suffix.clone(),
            breakpoints: assembled.breakpoints.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let response = match self.call_provider(prompt, &cancel).await {
            Ok(response) => response,
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Provider request failed");
                return Err(Error::Provider(e));
            }
        };

        let usage = response
            .usage
            .clone()
            .unwrap_or_else(|| estimated_usage(&assembled, &response.content));

        // ── Populate caches ────────────────────────────────────────────────
        self.cache
            .breakpoints
            .store_with_ttl(&cache_key, assembled.prefix_breakpoints(), ttl)
            .await;
        self.cache
            .responses
            .store(
                &memo_key,
                &request.character_id,
                response.content.clone(),
                usage.clone(),
                response.model.clone(),
            )
            .await;

        let cache_metrics = metrics_for(&assembled, &usage, started.elapsed());
        info!(
            model = %response.model,
            prompt_tokens = usage.prompt_tokens,
            cached_tokens = usage.cached_prompt_tokens,
            cache_hit = cache_metrics.hit,
            "Request complete"
        );

        Ok(AiResponse {
            content: response.content,
            token_usage: usage,
            cache_metrics,
            model: response.model,
        })
    }

    async fn call_provider(
        &self,
        prompt: PromptRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let call = tokio::time::timeout(self.request_timeout, self.provider.send_request(prompt));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            outcome = call => {
                outcome.unwrap_or_else(|_| {
                    Err(ProviderError::Timeout(format!(
                        "no response within {}s",
                        self.request_timeout.as_secs()
                    )))
                })
            }
        }
    }
}

/// Cache metrics for a provider-served request.
///
/// A provider-reported cache read wins; otherwise a core personality reused
/// from the breakpoint store counts as a partial hit.
fn metrics_for(assembled: &AssembledPrompt, usage: &TokenUsage, latency: Duration) -> CacheMetrics {
    if usage.cached_prompt_tokens > 0 {
        return CacheMetrics {
            hit: true,
            layers: assembled
                .breakpoints
                .iter()
                .map(|bp| bp.layer)
                .filter(|layer| layer.is_prefix())
                .collect(),
            saved_tokens: usage.cached_prompt_tokens as usize,
            latency,
        };
    }
    if let Some(core) = assembled
        .breakpoint(CacheLayer::CorePersonality)
        .filter(|bp| bp.from_cache)
    {
        return CacheMetrics {
            hit: true,
            layers: vec![CacheLayer::CorePersonality],
            saved_tokens: core.token_count,
            latency,
        };
    }
    CacheMetrics {
        latency,
        ..Default::default()
    }
}

fn estimated_usage(assembled: &AssembledPrompt, content: &str) -> TokenUsage {
    let prompt = u32::try_from(estimate_tokens(&assembled.full_prompt)).unwrap_or(u32::MAX);
    let completion = u32::try_from(estimate_tokens(content)).unwrap_or(u32::MAX);
    TokenUsage::new(prompt, completion)
}
