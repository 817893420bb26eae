pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod llm;
pub mod perception;
pub mod protocol;

pub use agent_engine::{NavigationAgent, Observation, OneShotPredictor, PredictionOutcome};
pub use errors::{DeskPilotError, DeskPilotResult};
pub use protocol::{Action, DuplicateGuard};

/// Install the global fmt subscriber. `RUST_LOG` wins over `default_directive`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default_directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
