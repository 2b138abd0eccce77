pub mod actors;
pub mod invariants;
pub mod ops;
pub mod sim;

pub use actors::{RandomInput, RecordingAlerts, RecordingObserver};
pub use invariants::Violation;
pub use ops::Op;
pub use sim::{Sim, SimReport};
