//! Kubernetes manifest primitives.
//!
//! Turns an arbitrary evaluated JSON tree into a flat list of Kubernetes
//! objects: [`extract`] walks the tree, [`unwrap`] expands `*List` containers
//! and [`filter`] narrows the result down by `<kind>/<name>` expressions.

mod extract;
mod filter;
mod manifest;

pub use extract::{extract, unwrap, Extracted, ExtractError, PrimitiveReached};
pub use filter::{filter, BadExpression, Matchers};
pub use manifest::{List, Manifest, ManifestKey, SchemaError};
