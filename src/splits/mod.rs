//! Split definitions: wire format, compiled form, and matchers.
mod compiled;
mod error;
mod matchers;
mod models;
mod transform;

pub use compiled::{Condition, Partition, Split};
pub use error::ParseError;
pub use matchers::{AttributeMatcher, Combiner, CombiningMatcher};
pub use models::*;

pub(crate) use matchers::MatchValue;
