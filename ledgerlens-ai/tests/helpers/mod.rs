//! Test Helper Utilities
//!
//! Shared utilities for testing ledgerlens-ai

#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

// Re-export commonly used items
pub use fixtures::{
    build_test_orchestrator, fuel_analysis_json, fuel_tenant, image, test_pipeline_config,
    FUEL_RECEIPT, PAYMENT_SLIP, TENANT,
};
pub use mocks::{MockReasoning, MockStore, TenantData};
