//! Integration tests for the incremental derivation engine

mod cache_persistence;
mod fold_budget;
mod orchestration;
mod waterfall_scenarios;
