pub mod acceptance;
pub mod cache;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod geo;
pub mod matching;
pub mod model;
pub mod orchestrator;
pub mod pool;
pub mod reaper;
pub mod spatial;
pub mod store;
pub mod worker;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use engine::MatchEngine;
pub use error::MatchError;
