//! Parallel work dispatch
//!
//! Executes all generation units for one stage concurrently, bounded by a
//! worker pool and the admission rate limiter. Every unit terminates: a
//! small fixed retry budget covers transient provider errors, rate limits
//! wait out the window without burning retries, and when generation or
//! extraction still fails the fallback synthesizer takes over. The
//! dispatcher enforces an absolute per-unit deadline independent of the
//! client's own timeout, so a stage never blocks indefinitely.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::DispatchConfig;
use crate::domain::{ArtifactDraft, StageKind};
use crate::extract::extract_records;
use crate::fallback::synthesize;
use crate::generation::GenerationClient;
use crate::progress::ProgressEmitter;

mod rate;

pub use rate::RateLimiter;

/// Initial backoff delay between retries
const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Jitter added to each backoff so retries from parallel units spread out
const BACKOFF_JITTER_MS: u64 = 250;

/// One request to produce children for one parent at one stage
#[derive(Debug, Clone)]
pub struct GenerationUnit {
    /// Parent artifact id; None for the root epic unit
    pub parent_id: Option<String>,

    /// Parent title, used in prompts and fallback synthesis
    pub parent_title: String,

    /// Stage this unit belongs to
    pub stage: StageKind,

    /// Fully-rendered prompt for the generator
    pub prompt: String,

    /// Records requested from this unit
    pub expected_records: usize,
}

/// Terminal outcome of a generation unit
///
/// The synthesizer is total, so in practice no unit ever fails: it either
/// succeeded through the generator or fell back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    Pending,
    Succeeded,
    FellBack,
}

/// Completed unit with its records, ready for tree attachment
#[derive(Debug, Clone)]
pub struct UnitResult {
    pub parent_id: Option<String>,
    pub parent_title: String,
    pub stage: StageKind,
    pub outcome: UnitOutcome,
    pub attempts: u32,
    pub records: Vec<ArtifactDraft>,
}

/// Bounded parallel executor for one stage's generation units
pub struct Dispatcher {
    client: Arc<dyn GenerationClient>,
    config: DispatchConfig,
    /// Timeout for a single provider call (the unit deadline is separate)
    call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn GenerationClient>, config: DispatchConfig, call_timeout: Duration) -> Self {
        Self {
            client,
            config,
            call_timeout,
        }
    }

    /// Run all units for one stage to terminal outcomes
    ///
    /// Results are collected in completion order; callers reconcile
    /// attachment order through each result's parent id.
    pub async fn run_stage(&self, units: Vec<GenerationUnit>, emitter: &ProgressEmitter) -> Vec<UnitResult> {
        let total = units.len();
        debug!(total, "run_stage: dispatching units");

        let limiter = Arc::new(RateLimiter::new(self.config.requests_per_second));
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut join_set = JoinSet::new();

        for unit in units {
            let client = Arc::clone(&self.client);
            let limiter = Arc::clone(&limiter);
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();
            let call_timeout = self.call_timeout;

            join_set.spawn(async move {
                // Semaphore is never closed; acquisition only fails after close
                let _permit = semaphore.acquire_owned().await.expect("worker semaphore closed");
                execute_unit(client, limiter, &config, call_timeout, unit).await
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    emitter.unit_finished(result.stage, results.len() + 1, total, &result.parent_title);
                    results.push(result);
                }
                Err(e) => {
                    // A panicked worker loses its unit; the completeness
                    // pass will detect and remediate the gap.
                    warn!(error = %e, "run_stage: worker task failed");
                }
            }
        }

        results
    }
}

/// Drive one unit to a terminal outcome
async fn execute_unit(
    client: Arc<dyn GenerationClient>,
    limiter: Arc<RateLimiter>,
    config: &DispatchConfig,
    call_timeout: Duration,
    unit: GenerationUnit,
) -> UnitResult {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(config.unit_timeout_ms);
    let mut attempts = 0u32;

    let generated = tokio::time::timeout_at(
        deadline,
        generate_with_retries(&client, &limiter, config, call_timeout, &unit, &mut attempts),
    )
    .await;

    match generated {
        Ok(Some(records)) => UnitResult {
            outcome: UnitOutcome::Succeeded,
            attempts,
            records,
            parent_id: unit.parent_id,
            parent_title: unit.parent_title,
            stage: unit.stage,
        },
        Ok(None) => {
            debug!(stage = %unit.stage, parent = %unit.parent_title, "execute_unit: falling back");
            fall_back(unit, attempts)
        }
        Err(_) => {
            warn!(stage = %unit.stage, parent = %unit.parent_title, "execute_unit: deadline reached, falling back");
            fall_back(unit, attempts)
        }
    }
}

fn fall_back(unit: GenerationUnit, attempts: u32) -> UnitResult {
    let records = synthesize(&unit.parent_title, unit.stage, unit.expected_records);
    UnitResult {
        outcome: UnitOutcome::FellBack,
        attempts,
        records,
        parent_id: unit.parent_id,
        parent_title: unit.parent_title,
        stage: unit.stage,
    }
}

/// Generate and extract, retrying only on transient provider errors
///
/// Returns None when the unit should fall back: malformed output, a
/// non-retryable error, or an exhausted retry budget. Rate limits wait
/// for the admission window instead of consuming a retry.
async fn generate_with_retries(
    client: &Arc<dyn GenerationClient>,
    limiter: &RateLimiter,
    config: &DispatchConfig,
    call_timeout: Duration,
    unit: &GenerationUnit,
    attempts: &mut u32,
) -> Option<Vec<ArtifactDraft>> {
    let mut retries_left = config.retry_bound;

    loop {
        limiter.admit().await;
        *attempts += 1;

        match client.generate(&unit.prompt, call_timeout).await {
            Ok(raw) => {
                // Malformed output is an expected outcome, not a retry
                // trigger: spend the budget on transport problems only.
                return extract_records(&raw, unit.stage, unit.expected_records);
            }
            Err(e) if e.is_rate_limit() => {
                let retry_after = e.retry_after().unwrap_or(Duration::from_secs(1));
                debug!(stage = %unit.stage, ?retry_after, "generate_with_retries: provider rate limit");
                limiter.penalize(retry_after).await;
            }
            Err(e) if e.is_retryable() && retries_left > 0 => {
                retries_left -= 1;
                let exponent = config.retry_bound - retries_left - 1;
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(exponent)
                    + rand::rng().random_range(0..BACKOFF_JITTER_MS);
                debug!(stage = %unit.stage, retries_left, backoff_ms = backoff, error = %e, "generate_with_retries: retrying");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) => {
                debug!(stage = %unit.stage, error = %e, "generate_with_retries: giving up");
                return None;
            }
        }
    }
}
