//! # Content Tree Model
//!
//! Pure data shared by every layer: paths, property kinds, raw scalar values
//! and entity references.
//!
//! Design rule: nothing here touches the record store or a session.
//! This module is pure data with no I/O and no state.

pub mod path;
pub mod value;

pub use path::Path;
pub use value::{EntityRef, PropertyType, Scalar};
