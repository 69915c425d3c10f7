//! SizeSelector algebra
//!
//! A selector maps a candidate list to a filtered and/or reordered subset of
//! it. Primitives filter or sort; `and`, `or` and `not` compose them.

use std::fmt;
use std::sync::Arc;

use contracts::{AspectRatio, Size};

use crate::error::{Result, SizingError};

type SelectFn = dyn Fn(Vec<Size>) -> Vec<Size> + Send + Sync;

/// Cheap-to-clone composable size selector.
///
/// Every selector carries a label describing its composition, used in logs
/// and in error messages.
#[derive(Clone)]
pub struct SizeSelector {
    label: Arc<str>,
    select: Arc<SelectFn>,
}

impl SizeSelector {
    /// Wrap an arbitrary list transformation.
    ///
    /// The function must return elements of its input only. Use
    /// [`SizeSelector::select_checked`] where a violation must be caught.
    pub fn from_fn<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Size>) -> Vec<Size> + Send + Sync + 'static,
    {
        Self {
            label: Arc::from(label.into()),
            select: Arc::new(f),
        }
    }

    /// Keep the sizes matching `predicate`, in input order.
    pub fn with_filter<P>(label: impl Into<String>, predicate: P) -> Self
    where
        P: Fn(&Size) -> bool + Send + Sync + 'static,
    {
        Self::from_fn(label, move |mut sizes| {
            sizes.retain(|size| predicate(size));
            sizes
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn select(&self, sizes: &[Size]) -> Vec<Size> {
        (self.select)(sizes.to_vec())
    }

    /// Like [`select`](Self::select) but rejects any output element that is
    /// not in the input (counting duplicates).
    pub fn select_checked(&self, sizes: &[Size]) -> Result<Vec<Size>> {
        let selected = self.select(sizes);
        let mut pool = sizes.to_vec();
        for size in &selected {
            match pool.iter().position(|candidate| candidate == size) {
                Some(index) => {
                    pool.swap_remove(index);
                }
                None => {
                    return Err(SizingError::Fabricated {
                        selector: self.label.to_string(),
                        size: *size,
                    })
                }
            }
        }
        Ok(selected)
    }

    /// First element of the checked selection.
    pub fn first(&self, sizes: &[Size]) -> Result<Size> {
        self.select_checked(sizes)?
            .first()
            .copied()
            .ok_or_else(|| SizingError::NoCandidates {
                selector: self.label.to_string(),
                available: sizes.len(),
            })
    }
}

impl fmt::Debug for SizeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SizeSelector").field(&self.label).finish()
    }
}

impl fmt::Display for SizeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

// ===== Primitives =====

pub fn min_width(width: u32) -> SizeSelector {
    SizeSelector::with_filter(format!("min_width({width})"), move |s| s.width >= width)
}

pub fn max_width(width: u32) -> SizeSelector {
    SizeSelector::with_filter(format!("max_width({width})"), move |s| s.width <= width)
}

pub fn min_height(height: u32) -> SizeSelector {
    SizeSelector::with_filter(format!("min_height({height})"), move |s| s.height >= height)
}

pub fn max_height(height: u32) -> SizeSelector {
    SizeSelector::with_filter(format!("max_height({height})"), move |s| s.height <= height)
}

pub fn min_area(area: u64) -> SizeSelector {
    SizeSelector::with_filter(format!("min_area({area})"), move |s| s.area() >= area)
}

pub fn max_area(area: u64) -> SizeSelector {
    SizeSelector::with_filter(format!("max_area({area})"), move |s| s.area() <= area)
}

/// Keep sizes whose `width / height` is within `tolerance` of `ratio`.
pub fn aspect_ratio(ratio: AspectRatio, tolerance: f32) -> SizeSelector {
    SizeSelector::with_filter(format!("aspect_ratio({ratio}, {tolerance})"), move |s| {
        ratio.matches(*s, tolerance)
    })
}

/// Ascending by area. Stable: equal areas keep input order.
pub fn smallest() -> SizeSelector {
    SizeSelector::from_fn("smallest", |mut sizes| {
        sizes.sort_by(Size::cmp_by_area);
        sizes
    })
}

/// Descending by area, the exact reverse of [`smallest`].
///
/// Equal areas therefore come out in reverse input order:
/// `[(100,100), (200,50), (50,200)]` yields `(50,200)` first.
pub fn biggest() -> SizeSelector {
    SizeSelector::from_fn("biggest", |mut sizes| {
        sizes.sort_by(Size::cmp_by_area);
        sizes.reverse();
        sizes
    })
}

// ===== Combinators =====

/// Apply each selector to the output of the previous one.
///
/// Sorts are stable, so the last sorting selector determines the order.
pub fn and(selectors: impl IntoIterator<Item = SizeSelector>) -> SizeSelector {
    let selectors: Vec<SizeSelector> = selectors.into_iter().collect();
    let label = compose_label("and", &selectors);
    SizeSelector::from_fn(label, move |sizes| {
        selectors
            .iter()
            .fold(sizes, |acc, selector| (selector.select)(acc))
    })
}

/// First non-empty result among `selectors`, else the input unchanged.
pub fn or(selectors: impl IntoIterator<Item = SizeSelector>) -> SizeSelector {
    let selectors: Vec<SizeSelector> = selectors.into_iter().collect();
    let label = compose_label("or", &selectors);
    SizeSelector::from_fn(label, move |sizes| {
        for selector in &selectors {
            let selected = (selector.select)(sizes.clone());
            if !selected.is_empty() {
                return selected;
            }
        }
        sizes
    })
}

/// Input elements that `selector` does not select, in input order.
pub fn not(selector: SizeSelector) -> SizeSelector {
    let label = format!("not({})", selector.label);
    SizeSelector::from_fn(label, move |sizes| {
        let mut selected = (selector.select)(sizes.clone());
        sizes
            .into_iter()
            .filter(|size| match selected.iter().position(|s| s == size) {
                Some(index) => {
                    selected.swap_remove(index);
                    false
                }
                None => true,
            })
            .collect()
    })
}

fn compose_label(name: &str, selectors: &[SizeSelector]) -> String {
    let inner: Vec<&str> = selectors.iter().map(|s| s.label()).collect();
    format!("{name}({})", inner.join(", "))
}
