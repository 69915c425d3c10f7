//! SizeConstraints -> SizeSelector
//!
//! Turns the declarative config section into a selector chain.

use contracts::SizeConstraints;
use tracing::debug;

use crate::selector::{self, SizeSelector};

/// Build the selector described by `constraints`.
///
/// Filters are combined with `and` in a fixed order (width, height, area,
/// aspect ratio) followed by the requested sort. An unconstrained section
/// means `biggest()`.
pub fn parse_constraints(constraints: &SizeConstraints) -> SizeSelector {
    let mut chain = Vec::new();

    if let Some(width) = constraints.min_width {
        chain.push(selector::min_width(width));
    }
    if let Some(width) = constraints.max_width {
        chain.push(selector::max_width(width));
    }
    if let Some(height) = constraints.min_height {
        chain.push(selector::min_height(height));
    }
    if let Some(height) = constraints.max_height {
        chain.push(selector::max_height(height));
    }
    if let Some(area) = constraints.min_area {
        chain.push(selector::min_area(area));
    }
    if let Some(area) = constraints.max_area {
        chain.push(selector::max_area(area));
    }
    if let Some(ratio) = constraints.aspect_ratio {
        let tolerance = constraints.aspect_tolerance.unwrap_or(0.0);
        chain.push(selector::aspect_ratio(ratio, tolerance));
    }
    if constraints.smallest {
        chain.push(selector::smallest());
    }
    if constraints.biggest {
        chain.push(selector::biggest());
    }

    let parsed = match chain.len() {
        0 => selector::biggest(),
        1 => chain.remove(0),
        _ => selector::and(chain),
    };
    debug!(selector = %parsed, "parsed size constraints");
    parsed
}

/// Optional variant used for the preview section.
pub fn parse_optional(constraints: Option<&SizeConstraints>) -> Option<SizeSelector> {
    constraints.map(parse_constraints)
}
