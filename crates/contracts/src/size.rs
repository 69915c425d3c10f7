//! Size / AspectRatio - integral frame dimensions
//!
//! Both are small `Copy` value objects. Sizes travel through configs as
//! `"WxH"` strings and aspect ratios as `"X:Y"` strings.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::ContractError;

/// Width x height in pixels.
///
/// Equality is by dimensions. Distinct sizes can share an area, so area
/// ordering lives in [`Size::cmp_by_area`] rather than an `Ord` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Swap width and height.
    #[inline]
    pub const fn flip(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    #[inline]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// `0x0` and friends only act as "unset" sentinels.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Flip only when `flip` is set. Used for frame conversions.
    #[inline]
    pub const fn flip_if(self, flip: bool) -> Self {
        if flip {
            self.flip()
        } else {
            self
        }
    }

    pub fn cmp_by_area(&self, other: &Size) -> Ordering {
        self.area().cmp(&other.area())
    }

    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        AspectRatio::of(*self)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| ContractError::config_parse(format!("invalid size '{s}', expected WxH")))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|e| ContractError::config_parse(format!("invalid width in '{s}': {e}")))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|e| ContractError::config_parse(format!("invalid height in '{s}': {e}")))?;
        Ok(Self::new(width, height))
    }
}

impl TryFrom<String> for Size {
    type Error = ContractError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Size> for String {
    fn from(size: Size) -> Self {
        size.to_string()
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

/// Reduced width:height ratio.
///
/// The stored pair is always gcd-reduced, so `16:9` and `32:18` are equal
/// and hash identically. Ordering compares `x / y` by cross multiplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    x: u32,
    y: u32,
}

impl AspectRatio {
    /// Build a reduced ratio. Returns `None` if either side is zero.
    pub fn new(x: u32, y: u32) -> Option<Self> {
        if x == 0 || y == 0 {
            return None;
        }
        let d = gcd(x, y);
        Some(Self { x: x / d, y: y / d })
    }

    pub fn of(size: Size) -> Option<Self> {
        Self::new(size.width, size.height)
    }

    #[inline]
    pub fn x(&self) -> u32 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn to_f32(&self) -> f32 {
        self.x as f32 / self.y as f32
    }

    pub fn flip(self) -> Self {
        Self {
            x: self.y,
            y: self.x,
        }
    }

    /// `|size.w / size.h - x / y| <= tolerance`. Empty sizes never match.
    pub fn matches(&self, size: Size, tolerance: f32) -> bool {
        if size.is_empty() {
            return false;
        }
        let ratio = size.width as f32 / size.height as f32;
        (ratio - self.to_f32()).abs() <= tolerance
    }
}

impl PartialOrd for AspectRatio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AspectRatio {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.x as u64 * other.y as u64;
        let rhs = other.x as u64 * self.y as u64;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.x, self.y)
    }
}

impl FromStr for AspectRatio {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s.trim().split_once(':').ok_or_else(|| {
            ContractError::config_parse(format!("invalid aspect ratio '{s}', expected X:Y"))
        })?;
        let x = x
            .trim()
            .parse::<u32>()
            .map_err(|e| ContractError::config_parse(format!("invalid aspect ratio '{s}': {e}")))?;
        let y = y
            .trim()
            .parse::<u32>()
            .map_err(|e| ContractError::config_parse(format!("invalid aspect ratio '{s}': {e}")))?;
        Self::new(x, y).ok_or_else(|| {
            ContractError::config_parse(format!("aspect ratio '{s}' has a zero component"))
        })
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = ContractError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(ratio: AspectRatio) -> Self {
        ratio.to_string()
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}
