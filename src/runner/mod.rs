pub mod executor;
pub mod parser;
pub mod variables;

pub use executor::{RequestExecutor, RequestOutcome};
