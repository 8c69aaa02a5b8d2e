//! Test doubles and fixtures for engine consumers.

mod fixtures;
mod mocks;

pub use fixtures::{
    boolean_stage, descriptive_stage, init_test_logging, keywords_stage, EngineHarness,
};
pub use mocks::{FlakyAnalysisClient, ScriptedAnalysisClient};
