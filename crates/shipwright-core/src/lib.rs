pub mod automation;
pub mod content;
pub mod context;
pub mod error;
pub mod repository;
pub mod session;
pub mod types;

pub use types::*;
