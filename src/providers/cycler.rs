//! Provider cycling: ordered fallback for generation, scored pool for
//! validation.
//!
//! When the preferred provider is unavailable or fails, the next one in the
//! configured order takes over. Validation additionally excludes every
//! provider that generated the batch under review — a model must not grade
//! its own output.

use std::collections::HashMap;
use std::sync::Arc;

use super::SharedProvider;
use crate::providers::feedback::score_or_neutral;

/// Sentinel accepted in `criteria.provider` to pick a pseudo-random starting
/// provider.
pub const RANDOM_PROVIDER: &str = "random";

pub struct ProviderCycler {
    providers: Vec<SharedProvider>,
}

impl ProviderCycler {
    /// `providers` in configured priority order.
    pub fn new(providers: Vec<SharedProvider>) -> Self {
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<SharedProvider> {
        self.providers
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// All providers with credentials, in configured order.
    pub fn configured(&self) -> Vec<SharedProvider> {
        self.providers
            .iter()
            .filter(|p| p.is_configured())
            .cloned()
            .collect()
    }

    /// Ordered cycle for one generation round.
    ///
    /// The preferred provider (or a pseudo-randomly chosen one for
    /// [`RANDOM_PROVIDER`]) goes first; the rest follow in configured order.
    /// An unknown or unconfigured preference degrades to the plain order.
    pub fn generation_cycle(&self, preferred: Option<&str>) -> Vec<SharedProvider> {
        let configured = self.configured();
        if configured.is_empty() {
            return configured;
        }

        let first = match preferred {
            Some(RANDOM_PROVIDER) => {
                // No strict randomness needed, just spread load across runs.
                let idx = (std::time::UNIX_EPOCH
                    .elapsed()
                    .map(|d| d.subsec_nanos())
                    .unwrap_or(0) as usize)
                    % configured.len();
                Some(configured[idx].name().to_string())
            }
            Some(name) => configured
                .iter()
                .find(|p| p.name().eq_ignore_ascii_case(name))
                .map(|p| p.name().to_string()),
            None => None,
        };

        match first {
            Some(first) => {
                let mut cycle: Vec<SharedProvider> = Vec::with_capacity(configured.len());
                cycle.extend(configured.iter().filter(|p| p.name() == first).cloned());
                cycle.extend(configured.iter().filter(|p| p.name() != first).cloned());
                cycle
            }
            None => configured,
        }
    }

    /// Validation pool: configured validators, minus the generators of the
    /// batch, best feedback score first (stable for ties).
    pub fn validation_pool(
        &self,
        exclude: &[String],
        scores: &HashMap<String, f64>,
    ) -> Vec<SharedProvider> {
        let mut pool: Vec<SharedProvider> = self
            .providers
            .iter()
            .filter(|p| p.is_configured() && p.supports_validation())
            .filter(|p| !exclude.iter().any(|e| e.eq_ignore_ascii_case(p.name())))
            .cloned()
            .collect();
        pool.sort_by(|a, b| {
            score_or_neutral(scores, b.name())
                .partial_cmp(&score_or_neutral(scores, a.name()))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        pool
    }
}

pub type SharedCycler = Arc<ProviderCycler>;
