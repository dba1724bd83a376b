//! ledgerlens-ai library interface
//!
//! Turns photographed financial documents into proposed accounting entries:
//! tenant reference data cache, rate-limited reasoning-service calls with
//! categorized retry, template and counterparty matching, balance validation
//! and confidence scoring, sequenced by [`services::AnalysisOrchestrator`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{PipelineError, PipelineResult};

use ledgerlens_common::config::TomlConfig;
use ledgerlens_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::db::{ReferenceStore, SqliteReferenceStore};
use crate::services::{
    AnalysisOrchestrator, CallGovernor, HttpReasoningClient, ReasoningService,
    ReferenceDataCache, RetryPolicy,
};

/// Wire the pipeline from configuration
///
/// # Arguments
/// * `config` - Loaded TOML configuration
/// * `store` - Backing store for tenant reference data
/// * `reasoning` - Reasoning service (HTTP client in production)
/// * `event_bus` - Shared event bus for observers
pub fn build_orchestrator(
    config: &TomlConfig,
    store: Arc<dyn ReferenceStore>,
    reasoning: Arc<dyn ReasoningService>,
    event_bus: EventBus,
) -> AnalysisOrchestrator {
    let cache = ReferenceDataCache::new(store, config.cache.ttl()).with_event_bus(event_bus.clone());
    let governor = CallGovernor::new(&config.rate_limit).with_event_bus(event_bus.clone());

    AnalysisOrchestrator::new(
        Arc::new(cache),
        Arc::new(governor),
        reasoning,
        RetryPolicy::from_config(&config.retry),
        config.pipeline.clone(),
    )
    .with_event_bus(event_bus)
}

/// Wire the production pipeline: SQLite reference store and HTTP reasoning client
pub fn build_default_orchestrator(
    config: &TomlConfig,
    db: SqlitePool,
    event_bus: EventBus,
) -> PipelineResult<AnalysisOrchestrator> {
    let api_key = crate::config::resolve_reasoning_api_key(config);
    let reasoning = HttpReasoningClient::new(&config.reasoning, api_key)?;

    Ok(build_orchestrator(
        config,
        Arc::new(SqliteReferenceStore::new(db)),
        Arc::new(reasoning),
        event_bus,
    ))
}
