//! Session-scoped translation memory.
//!
//! A [`TranslationSession`] holds everything that must be shared between
//! calls of one translation job: the content-addressed cache, the short-term
//! terminology store, call counters and the set of scripts seen so far. It is
//! owned by exactly one [`crate::engine::TranslationEngine`] and dropped with
//! it, so two jobs never see each other's memory and nothing is persisted
//! across runs.

use crate::language::{is_term, Language};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Stable fingerprint of a normalised source text (hex SHA-256 of the trimmed
/// string).
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.trim().as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Cache, terminology store and counters for one translation job.
#[derive(Debug, Default)]
pub struct TranslationSession {
    cache: HashMap<String, String>,
    terminology: HashMap<String, String>,
    detected: BTreeSet<Language>,
    model_calls: u64,
    translations: u64,
    cache_hits: u64,
    terminology_hits: u64,
    forced_fallbacks: u64,
}

impl TranslationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a previous translation of `text`. Counts a hit on success.
    pub fn cached(&mut self, text: &str) -> Option<String> {
        let hit = self.cache.get(&fingerprint(text)).cloned();
        if hit.is_some() {
            self.cache_hits += 1;
            debug!("cache hit for {:?}", truncate(text));
        }
        hit
    }

    /// Look up an exact short term. Counts a hit on success.
    pub fn term(&mut self, text: &str) -> Option<String> {
        let hit = self.terminology.get(text.trim()).cloned();
        if hit.is_some() {
            self.terminology_hits += 1;
        }
        hit
    }

    /// Record a finished translation in the cache, and in the terminology
    /// store when the source is short enough to be a term.
    pub fn remember(&mut self, source: &str, translation: &str) {
        self.cache
            .insert(fingerprint(source), translation.to_string());
        let source = source.trim();
        if is_term(source) {
            self.terminology
                .insert(source.to_string(), translation.to_string());
        }
        self.translations += 1;
    }

    pub fn record_model_call(&mut self) {
        self.model_calls += 1;
    }

    pub fn record_forced(&mut self) {
        self.forced_fallbacks += 1;
    }

    /// Accumulate detected scripts. Reporting only.
    pub fn record_languages(&mut self, langs: &BTreeSet<Language>) {
        self.detected.extend(langs.iter().copied());
    }

    pub fn model_calls(&self) -> u64 {
        self.model_calls
    }

    pub fn forced_fallbacks(&self) -> u64 {
        self.forced_fallbacks
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            model_calls: self.model_calls,
            translations: self.translations,
            cache_hits: self.cache_hits,
            terminology_hits: self.terminology_hits,
            forced_fallbacks: self.forced_fallbacks,
            cache_size: self.cache.len(),
            terminology_size: self.terminology.len(),
            detected_languages: self.detected.iter().copied().collect(),
        }
    }
}

/// Snapshot of a session's counters, returned with every translation output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Requests actually sent to the model (retries not counted).
    pub model_calls: u64,
    /// Distinct translations produced and remembered.
    pub translations: u64,
    pub cache_hits: u64,
    pub terminology_hits: u64,
    /// Items that needed the force-English substitution.
    pub forced_fallbacks: u64,
    pub cache_size: usize,
    pub terminology_size: usize,
    pub detected_languages: Vec<Language>,
}

fn truncate(text: &str) -> String {
    text.chars().take(40).collect()
}
