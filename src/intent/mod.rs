//! Intent trees
//!
//! Multi-resolution weighted trees built from a normalized event stream.

pub mod builder;
pub mod node;

pub use builder::{AmbiguityOverflow, BuiltTree, TreeBuilder, TreeSet, WindowOverflow};
pub use node::{AffectVector, Confidence, ContextFrame, IntentLabel, IntentNode, IntentTree};
