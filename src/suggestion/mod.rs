// Suggestion module
pub mod aggregator;
pub mod composite;
pub mod engine;
pub mod impact;

#[cfg(test)]
mod tests;

pub use aggregator::*;
pub use composite::*;
pub use engine::*;
pub use impact::*;
