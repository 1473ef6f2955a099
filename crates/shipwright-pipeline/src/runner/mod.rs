pub mod compose;
pub mod notify;
pub mod pipeline;
