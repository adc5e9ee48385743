//! Rewrites chat-style queries into short image captions before embedding.
//!
//! Flow: validate, normalize (trim + lowercase), cap the length, look up the
//! cache, skip the LLM for queries that already read like captions, otherwise
//! rewrite once per key and cache the caption.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::completion::TextCompletion;
use crate::config::TranslatorSettings;
use crate::error::{CompletionError, Result, RetrievalError};

const CHAT_PATTERNS: &[&str] = &[
    "show me",
    "please",
    "give me",
    "can you",
    "i want",
    "find me",
    "could you",
];

const PROMPT_TEMPLATE: &str = "You are an expert at rewriting queries for the CLIP image-text model.

Goal:
Rewrite the user query into a short, concrete, descriptive image caption.
The rewritten query must maximize CLIP retrieval accuracy.

Guidelines:
- Keep the original meaning.
- Use 3-12 word caption style.
- Remove chat words (show me, give me, please, etc.)
- Keep colors, objects, actions.
- Translate to English if needed.
- Do NOT add new details.

User Query: {input_query}

Respond with only the rewritten caption.";

/// Bounded LRU of normalized query -> caption.
pub struct TranslationCache {
    entries: Mutex<LruCache<String, String>>,
}

impl TranslationCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, query: &str) -> Option<String> {
        self.entries.lock().get(query).cloned()
    }

    pub fn insert(&self, query: String, caption: String) {
        self.entries.lock().put(query, caption);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type Gate = Arc<tokio::sync::Mutex<()>>;

/// Holds a per-key gate; removes it from the in-flight map once the last holder leaves.
struct FlightSlot<'a> {
    flights: &'a Mutex<HashMap<String, Gate>>,
    key: String,
    gate: Gate,
}

impl<'a> FlightSlot<'a> {
    fn join(flights: &'a Mutex<HashMap<String, Gate>>, key: &str) -> Self {
        let gate = flights
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        Self {
            flights,
            key: key.to_string(),
            gate,
        }
    }
}

impl Drop for FlightSlot<'_> {
    fn drop(&mut self) {
        let mut flights = self.flights.lock();
        let ours = flights
            .get(&self.key)
            .is_some_and(|gate| Arc::ptr_eq(gate, &self.gate));
        // map + this slot
        if ours && Arc::strong_count(&self.gate) <= 2 {
            flights.remove(&self.key);
        }
    }
}

pub struct QueryTranslator {
    completion: Arc<dyn TextCompletion>,
    cache: Arc<TranslationCache>,
    max_query_length: usize,
    timeout: Duration,
    flights: Mutex<HashMap<String, Gate>>,
}

impl QueryTranslator {
    pub fn new(
        completion: Arc<dyn TextCompletion>,
        cache: Arc<TranslationCache>,
        settings: &TranslatorSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            completion,
            cache,
            max_query_length: settings.max_query_length,
            timeout,
            flights: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Trimmed, lowercased and capped at the configured number of characters.
    pub fn normalize(&self, raw_query: &str) -> Result<String> {
        let trimmed = raw_query.trim();
        if trimmed.is_empty() {
            warn!(query = raw_query, "Invalid input query for translation");
            return Err(RetrievalError::InvalidQuery(
                "query must be a non-empty string".to_string(),
            ));
        }

        let normalized = trimmed.to_lowercase();
        let length = normalized.chars().count();
        if length > self.max_query_length {
            info!(
                original_length = length,
                max_length = self.max_query_length,
                "Query truncated due to length limit"
            );
            return Ok(normalized.chars().take(self.max_query_length).collect());
        }
        Ok(normalized)
    }

    pub async fn translate(&self, raw_query: &str) -> Result<String> {
        let normalized = self.normalize(raw_query)?;
        info!(input_query = %normalized, "Translating query");

        if let Some(caption) = self.cache.get(&normalized) {
            info!(query = %normalized, "Cache hit - returning cached translation");
            return Ok(caption);
        }

        if !is_conversational(&normalized) {
            info!("Caption-style query detected - skipping rewrite");
            return Ok(normalized);
        }

        info!("Conversational query detected - rewriting required");
        let slot = FlightSlot::join(&self.flights, &normalized);
        let _turn = slot.gate.lock().await;

        // another request may have finished the rewrite while we waited
        if let Some(caption) = self.cache.get(&normalized) {
            info!(query = %normalized, "Cache hit after waiting on in-flight rewrite");
            return Ok(caption);
        }

        let caption = self.rewrite(&normalized).await?;
        self.cache.insert(normalized, caption.clone());
        Ok(caption)
    }

    async fn rewrite(&self, normalized: &str) -> Result<String> {
        let prompt = PROMPT_TEMPLATE.replace("{input_query}", normalized);
        info!("Sending translation prompt to LLM");

        let reply = self
            .completion
            .complete(&prompt, self.timeout)
            .await
            .map_err(|e| {
                error!(query = normalized, error = %e, "LLM translation failed");
                RetrievalError::TranslationFailure {
                    query: normalized.to_string(),
                    source: e.into(),
                }
            })?;

        let caption = reply.trim();
        if caption.is_empty() {
            error!(query = normalized, "LLM returned an empty caption");
            return Err(RetrievalError::TranslationFailure {
                query: normalized.to_string(),
                source: CompletionError::EmptyResponse.into(),
            });
        }

        info!(original = normalized, translated = caption, "Translation completed");
        Ok(caption.to_string())
    }
}

fn is_conversational(query: &str) -> bool {
    CHAT_PATTERNS.iter().any(|pattern| query.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::testing::ScriptedCompletion;

    fn translator(completion: Arc<ScriptedCompletion>, capacity: usize) -> QueryTranslator {
        QueryTranslator::new(
            completion,
            Arc::new(TranslationCache::new(capacity)),
            &TranslatorSettings {
                max_query_length: 200,
                cache_capacity: capacity,
            },
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn caption_style_query_is_normalized_without_llm() {
        let completion = Arc::new(ScriptedCompletion::replying("unused"));
        let translator = translator(completion.clone(), 16);

        let translated = translator.translate("  Red Sports CAR ").await.unwrap();
        assert_eq!(translated, "red sports car");
        assert_eq!(completion.calls(), 0);
        assert_eq!(translator.cache_len(), 0);
    }

    #[tokio::test]
    async fn conversational_query_is_rewritten_once() {
        let completion = Arc::new(ScriptedCompletion::replying("  red sports car\n"));
        let translator = translator(completion.clone(), 16);

        let first = translator.translate("Show me a beautiful red sports car").await.unwrap();
        let second = translator.translate("show me a beautiful red sports car").await.unwrap();
        assert_eq!(first, "red sports car");
        assert_eq!(first, second);
        assert_eq!(completion.calls(), 1);
        assert_eq!(translator.cache_len(), 1);

        let prompt = completion.last_prompt().unwrap();
        assert!(prompt.contains("User Query: show me a beautiful red sports car"));
    }

    #[tokio::test]
    async fn blank_queries_are_invalid() {
        let completion = Arc::new(ScriptedCompletion::replying("x"));
        let translator = translator(completion.clone(), 16);

        for query in ["", "   ", "\n\t"] {
            assert!(matches!(
                translator.translate(query).await,
                Err(RetrievalError::InvalidQuery(_))
            ));
        }
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn long_queries_are_truncated_before_caching() {
        let completion = Arc::new(ScriptedCompletion::replying("caption"));
        let translator = translator(completion.clone(), 16);

        let caption_style = "x".repeat(300);
        assert_eq!(translator.translate(&caption_style).await.unwrap().chars().count(), 200);

        let chatty = format!("please {}", "y".repeat(400));
        translator.translate(&chatty).await.unwrap();
        let truncated: String = chatty.chars().take(200).collect();
        let prompt = completion.last_prompt().unwrap();
        assert!(prompt.contains(&format!("User Query: {}\n", truncated)));

        // a different tail past the limit maps to the same cache key
        let other_tail = format!("{}{}", truncated, "z".repeat(50));
        translator.translate(&other_tail).await.unwrap();
        assert_eq!(completion.calls(), 1);
    }

    #[tokio::test]
    async fn failed_rewrite_leaves_no_cache_entry() {
        let completion = Arc::new(ScriptedCompletion::failing());
        let translator = translator(completion.clone(), 16);

        let result = translator.translate("can you find cats").await;
        assert!(matches!(result, Err(RetrievalError::TranslationFailure { .. })));
        assert_eq!(translator.cache_len(), 0);

        let _ = translator.translate("can you find cats").await;
        assert_eq!(completion.calls(), 2);
    }

    #[tokio::test]
    async fn slow_rewrite_times_out_without_caching() {
        let completion = Arc::new(
            ScriptedCompletion::replying("cat on a sofa").with_delay(Duration::from_millis(500)),
        );
        let translator = QueryTranslator::new(
            completion.clone(),
            Arc::new(TranslationCache::new(16)),
            &TranslatorSettings {
                max_query_length: 200,
                cache_capacity: 16,
            },
            Duration::from_millis(50),
        );

        let result = translator.translate("could you find a cat on a sofa").await;
        assert!(matches!(
            result,
            Err(RetrievalError::TranslationFailure {
                source: CollaboratorError::Completion(CompletionError::Timeout(_)),
                ..
            })
        ));
        assert_eq!(translator.cache_len(), 0);
        assert!(translator.flights.lock().is_empty());
    }

    #[tokio::test]
    async fn empty_reply_is_a_translation_failure() {
        let completion = Arc::new(ScriptedCompletion::replying("   "));
        let translator = translator(completion, 16);
        assert!(matches!(
            translator.translate("please show dogs").await,
            Err(RetrievalError::TranslationFailure { .. })
        ));
        assert_eq!(translator.cache_len(), 0);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_rewrite() {
        let completion = Arc::new(
            ScriptedCompletion::replying("dog on a beach").with_delay(Duration::from_millis(50)),
        );
        let translator = Arc::new(translator(completion.clone(), 16));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let translator = translator.clone();
                tokio::spawn(async move { translator.translate("give me a dog on a beach").await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "dog on a beach");
        }
        assert_eq!(completion.calls(), 1);
        assert!(translator.flights.lock().is_empty());
    }

    #[tokio::test]
    async fn cache_evicts_least_recently_used() {
        let completion = Arc::new(ScriptedCompletion::replying("caption"));
        let translator = translator(completion.clone(), 1);

        translator.translate("show me cats").await.unwrap();
        translator.translate("show me dogs").await.unwrap();
        translator.translate("show me cats").await.unwrap();
        assert_eq!(completion.calls(), 3);
        assert_eq!(translator.cache_len(), 1);
    }
}
