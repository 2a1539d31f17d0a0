// Query parser module
pub mod clauses;
pub mod extractor;
pub mod from_resolver;
pub mod join_resolver;
pub mod lexer;
pub mod normalizer;
pub mod predicates;
pub mod subquery;


pub use extractor::*;
pub use normalizer::normalize;
