//! # Sizing
//!
//! Composable size selectors and their construction from config.
//!
//! Selectors filter and/or order a candidate size list. They never invent
//! sizes; [`SizeSelector::select_checked`] enforces that at the boundary.

pub mod error;
pub mod parser;
pub mod selector;

pub use error::{Result, SizingError};
pub use parser::{parse_constraints, parse_optional};
pub use selector::{
    and, aspect_ratio, biggest, max_area, max_height, max_width, min_area, min_height, min_width,
    not, or, smallest, SizeSelector,
};
