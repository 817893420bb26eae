pub mod engine;
pub mod history;
pub mod oneshot;
pub mod prompt;
pub mod state;
pub mod trajectory;

pub use engine::NavigationAgent;
pub use oneshot::{OneShotPrediction, OneShotPredictor};
pub use state::{Observation, PredictionOutcome};
pub use trajectory::{StepFeedback, Trajectory, TrajectoryStep};
