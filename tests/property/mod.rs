//! Property-based tests for chunking and scheduling guarantees

mod chunking;
mod scheduling;
