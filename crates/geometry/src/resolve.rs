//! Capture / preview stream size resolution.
//!
//! Hardware lists are in the sensor frame while surfaces and user selectors
//! think in the view frame, so candidates are flipped into the view frame,
//! selected, and the winner is flipped back.

use contracts::{AspectRatio, Reference, Size};
use sizing::{self as sel, SizeSelector};
use tracing::debug;

use crate::angles::Angles;

/// Pick the capture size from `candidates` (sensor frame).
///
/// The user selector falls back to `biggest()` when it selects nothing.
/// The result is in the sensor frame.
pub fn compute_capture_size(
    angles: &Angles,
    candidates: &[Size],
    selector: &SizeSelector,
) -> sizing::Result<Size> {
    let flip = angles.flip(Reference::Sensor, Reference::View);
    let view = to_view(candidates, flip);

    let chain = sel::or([selector.clone(), sel::biggest()]);
    let chosen = chain.first(&view)?;
    debug!(selector = %selector, chosen = %chosen, flip, "computed capture size");
    Ok(chosen.flip_if(flip))
}

/// Pick the preview stream size from `available` (sensor frame).
///
/// `capture_size` is the resolved capture size (sensor frame) whose aspect
/// ratio the stream should share, `surface` the delivery surface (view
/// frame) acting as a minimum bound. Fallback order, first non-empty wins:
///
/// 1. matching aspect ratio and at least the surface, biggest first
/// 2. at least the surface, smallest first
/// 3. matching aspect ratio, biggest first
/// 4. biggest
///
/// An `external` selector, if any, is tried before all of these.
pub fn compute_preview_stream_size(
    angles: &Angles,
    available: &[Size],
    capture_size: Size,
    surface: Size,
    external: Option<&SizeSelector>,
) -> sizing::Result<Size> {
    let flip = angles.flip(Reference::Sensor, Reference::View);
    let view = to_view(available, flip);
    let target_ratio = AspectRatio::of(capture_size.flip_if(flip));

    let min_width = sel::min_width(surface.width);
    let min_height = sel::min_height(surface.height);

    let mut policy = Vec::with_capacity(4);
    if let Some(ratio) = target_ratio {
        policy.push(sel::and([
            sel::aspect_ratio(ratio, 0.0),
            min_width.clone(),
            min_height.clone(),
            sel::biggest(),
        ]));
    }
    policy.push(sel::and([min_width, min_height, sel::smallest()]));
    if let Some(ratio) = target_ratio {
        policy.push(sel::and([sel::aspect_ratio(ratio, 0.0), sel::biggest()]));
    }
    policy.push(sel::biggest());

    let matcher = sel::or(policy);
    let chain = match external {
        Some(external) => sel::or([external.clone(), matcher]),
        None => matcher,
    };

    let chosen = chain.first(&view)?;
    debug!(
        target_ratio = ?target_ratio.map(|r| r.to_string()),
        surface = %surface,
        chosen = %chosen,
        flip,
        "computed preview stream size"
    );
    Ok(chosen.flip_if(flip))
}

/// Largest size with the aspect ratio of `base` that fits within the given
/// bounds. Missing or zero bounds are unbounded. Both bounds and `base` must
/// be in the same frame.
pub fn uncropped_snapshot_size(base: Size, max_width: Option<u32>, max_height: Option<u32>) -> Size {
    if base.is_empty() {
        return base;
    }
    let max_width = max_width.filter(|w| *w > 0).unwrap_or(u32::MAX);
    let max_height = max_height.filter(|h| *h > 0).unwrap_or(u32::MAX);

    // max_w / max_h >= base_w / base_h, by cross multiplication
    let bounds_wider = max_width as u64 * base.height as u64 >= base.width as u64 * max_height as u64;

    if bounds_wider {
        let height = base.height.min(max_height);
        let width = height as u64 * base.width as u64 / base.height as u64;
        Size::new(width as u32, height)
    } else {
        let width = base.width.min(max_width);
        let height = width as u64 * base.height as u64 / base.width as u64;
        Size::new(width, height as u32)
    }
}

fn to_view(sizes: &[Size], flip: bool) -> Vec<Size> {
    sizes.iter().map(|size| size.flip_if(flip)).collect()
}
