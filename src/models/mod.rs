pub mod loaders;
pub mod request;
pub mod scores;

pub use loaders::load_request;
pub use request::{Mode, OptimizeRequest};
pub use scores::{IterationRecord, OptimizationOutcome, Scores, Thresholds};
