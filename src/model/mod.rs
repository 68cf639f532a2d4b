//! # Attributed Graph Model
//!
//! Plain data types shared by every other module: attribute values and
//! sets, attribute dictionaries, identifiers and the graph itself.
//!
//! Design rule: no hierarchy types here. This module is pure data with
//! no I/O and no global state.

pub mod value;
pub mod attribute_set;
pub mod attrs;
pub mod node;
pub mod graph;

pub use value::AttrValue;
pub use attribute_set::{AttributeSet, IntervalSet};
pub use attrs::Attrs;
pub use node::{GraphId, NodeId};
pub use graph::{Graph, MergeMethod};
