// Book merge engine and the value types it publishes
pub mod book;
pub mod types;

pub use book::Book;
pub use types::*;
