use std::fmt::{Debug, Formatter};

/// A rectangle in image coordinates, stored as top / left / bottom / right edges.
///
/// The bottom and right edges are exclusive.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub t: i32,
    pub l: i32,
    pub b: i32,
    pub r: i32,
}

impl Rect {
    pub fn new(t: i32, l: i32, b: i32, r: i32) -> Self {
        Self { t, l, b, r }
    }

    /// The rectangle with its origin at (0, 0) covering `height` rows and `width` columns.
    ///
    /// Sizes beyond `i32::MAX` are clamped.
    pub fn from_size(height: u32, width: u32) -> Self {
        Self::new(
            0,
            0,
            i32::try_from(height).unwrap_or(i32::MAX),
            i32::try_from(width).unwrap_or(i32::MAX),
        )
    }

    pub fn is_zero(&self) -> bool {
        self.t == 0 && self.l == 0 && self.b == 0 && self.r == 0
    }

    pub fn is_empty(&self) -> bool {
        self.t >= self.b || self.l >= self.r
    }

    pub fn not_empty(&self) -> bool {
        !self.is_empty()
    }

    pub fn width(&self) -> u32 {
        if self.r > self.l {
            (self.r as i64 - self.l as i64) as u32
        } else {
            0
        }
    }

    pub fn height(&self) -> u32 {
        if self.b > self.t {
            (self.b as i64 - self.t as i64) as u32
        } else {
            0
        }
    }

    /// The overlap of two rectangles; the zero rectangle when they do not overlap.
    pub fn intersection(&self, other: &Rect) -> Rect {
        let result = Rect {
            t: self.t.max(other.t),
            l: self.l.max(other.l),
            b: self.b.min(other.b),
            r: self.r.min(other.r),
        };
        if result.is_empty() {
            Rect::default()
        } else {
            result
        }
    }

    pub fn contains(&self, other: &Rect) -> bool {
        self.intersection(other) == *other
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.intersection(other).not_empty()
    }
}

impl Debug for Rect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "T = {} L = {} B = {} R = {}", self.t, self.l, self.b, self.r)
    }
}

/// An unsigned rational number. A zero denominator marks an unset value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct URational {
    pub n: u32,
    pub d: u32,
}

impl URational {
    pub fn new(n: u32, d: u32) -> Self {
        Self { n, d }
    }

    pub fn is_unset(&self) -> bool {
        self.d == 0
    }

    pub fn as_f64(&self) -> f64 {
        if self.d == 0 {
            0.0
        } else {
            self.n as f64 / self.d as f64
        }
    }

    /// Approximates a real number, picking a denominator that keeps the numerator in range.
    pub fn from_f64(x: f64) -> Self {
        if !(x > 0.0) {
            return Self::new(0, 1);
        }
        let d: u32 = if x < 32768.0 {
            32768
        } else if x < 1048576.0 {
            1024
        } else if x < 33554432.0 {
            32
        } else {
            1
        };
        let n = (x * d as f64).round().min(u32::MAX as f64) as u32;
        Self::new(n, d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_of_disjoint_rects_is_zero() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(10, 10, 20, 20);
        assert!(a.intersection(&b).is_zero());
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn containment() {
        let image = Rect::from_size(100, 200);
        assert_eq!(image.width(), 200);
        assert_eq!(image.height(), 100);
        assert!(image.contains(&Rect::new(10, 10, 90, 190)));
        assert!(!image.contains(&Rect::new(10, 10, 101, 190)));
        assert!(image.overlaps(&Rect::new(90, 190, 110, 210)));
    }

    #[test]
    fn huge_sizes_are_clamped() {
        let r = Rect::from_size(u32::MAX, 1 << 31);
        assert_eq!((r.b, r.r), (i32::MAX, i32::MAX));
        assert_eq!(r.height(), i32::MAX as u32);
        assert!(r.not_empty());
        assert!(r.contains(&Rect::from_size(100, 200)));
    }

    #[test]
    fn inverted_rect_is_empty() {
        let r = Rect::new(10, 0, 5, 20);
        assert!(r.is_empty());
        assert_eq!(r.height(), 0);
    }

    #[test]
    fn rationals() {
        assert_eq!(URational::new(3, 2).as_f64(), 1.5);
        assert_eq!(URational::default().as_f64(), 0.0);
        assert!(URational::default().is_unset());
        assert_eq!(URational::from_f64(0.5), URational::new(16384, 32768));
        assert_eq!(URational::from_f64(-1.0), URational::new(0, 1));
    }
}
