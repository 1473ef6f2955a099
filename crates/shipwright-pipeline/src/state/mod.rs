pub mod machine;

pub use machine::{AutomationPhase, RunPhase};
