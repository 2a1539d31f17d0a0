// DDL output module
pub mod report;
pub mod statement_builder;

#[cfg(test)]
mod tests;

pub use report::*;
pub use statement_builder::*;
