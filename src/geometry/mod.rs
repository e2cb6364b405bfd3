//! Geometric primitives for OCR fragment layout.
//!
//! Coordinates follow image conventions: x grows to the right, y grows
//! downwards, so `top <= bottom` for every well-formed box. Angles are in
//! degrees; a positive angle means a line descends from left to right.

use serde::{Deserialize, Serialize};

/// A 2D point in image space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

impl Point {
    /// Create a new point.
    ///
    /// # Examples
    ///
    /// ```
    /// use table_oxide::geometry::Point;
    ///
    /// let point = Point::new(10.0, 20.0);
    /// assert_eq!(point.x, 10.0);
    /// assert_eq!(point.y, 20.0);
    /// ```
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Rotate this point around `origin` by `angle` degrees.
    pub fn rotate_around(&self, origin: Point, angle: f32) -> Point {
        let (sin, cos) = angle.to_radians().sin_cos();
        let dx = self.x - origin.x;
        let dy = self.y - origin.y;
        Point {
            x: origin.x + dx * cos - dy * sin,
            y: origin.y + dx * sin + dy * cos,
        }
    }
}

/// Which horizontal reference line of a box to use when measuring angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum YRef {
    /// Vertical center
    Center,
    /// Top edge
    Top,
    /// Bottom edge
    Bottom,
}

impl YRef {
    /// All three references, in the order used for averaging.
    pub const ALL: [YRef; 3] = [YRef::Center, YRef::Top, YRef::Bottom];
}

/// An axis-aligned box given by its edges.
///
/// Callers must keep `left <= right` and `top <= bottom`; the type does not
/// correct inverted boxes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    /// Left edge
    pub left: f32,
    /// Top edge
    pub top: f32,
    /// Right edge
    pub right: f32,
    /// Bottom edge
    pub bottom: f32,
}

impl BBox {
    /// Create a box from its edges.
    ///
    /// # Examples
    ///
    /// ```
    /// use table_oxide::geometry::BBox;
    ///
    /// let b = BBox::new(10.0, 20.0, 110.0, 70.0);
    /// assert_eq!(b.width(), 100.0);
    /// assert_eq!(b.height(), 50.0);
    /// ```
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Smallest box containing all points.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut b = BBox::new(first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            b.left = b.left.min(p.x);
            b.top = b.top.min(p.y);
            b.right = b.right.max(p.x);
            b.bottom = b.bottom.max(p.y);
        }
        Some(b)
    }

    /// Width of the box.
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    /// Height of the box.
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Area of the box.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Horizontal center.
    pub fn cx(&self) -> f32 {
        (self.left + self.right) / 2.0
    }

    /// Vertical center.
    pub fn cy(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }

    /// Center point.
    ///
    /// # Examples
    ///
    /// ```
    /// use table_oxide::geometry::BBox;
    ///
    /// let c = BBox::new(0.0, 0.0, 100.0, 50.0).center();
    /// assert_eq!(c.x, 50.0);
    /// assert_eq!(c.y, 25.0);
    /// ```
    pub fn center(&self) -> Point {
        Point::new(self.cx(), self.cy())
    }

    /// The y coordinate of the requested reference line.
    pub fn y_at(&self, yref: YRef) -> f32 {
        match yref {
            YRef::Center => self.cy(),
            YRef::Top => self.top,
            YRef::Bottom => self.bottom,
        }
    }

    /// Bounding union of two boxes.
    ///
    /// # Examples
    ///
    /// ```
    /// use table_oxide::geometry::BBox;
    ///
    /// let a = BBox::new(0.0, 0.0, 50.0, 50.0);
    /// let b = BBox::new(25.0, 25.0, 75.0, 75.0);
    /// assert_eq!(a.merge(&b), BBox::new(0.0, 0.0, 75.0, 75.0));
    /// ```
    pub fn merge(&self, other: &BBox) -> BBox {
        BBox {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// Union of every box in the iterator, `None` when it is empty.
    pub fn merge_all<'a, I>(boxes: I) -> Option<BBox>
    where
        I: IntoIterator<Item = &'a BBox>,
    {
        boxes.into_iter().fold(None, |acc, b| match acc {
            None => Some(*b),
            Some(acc) => Some(acc.merge(b)),
        })
    }

    /// Intersection of two boxes, `None` when they do not overlap.
    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);
        if left < right && top < bottom {
            Some(BBox::new(left, top, right, bottom))
        } else {
            None
        }
    }

    /// Intersection area divided by this box's own area.
    pub fn ioo(&self, other: &BBox) -> f32 {
        let area = self.area();
        if area <= 0.0 {
            return 0.0;
        }
        self.intersection(other).map_or(0.0, |i| i.area() / area)
    }

    /// Intersection over union.
    pub fn iou(&self, other: &BBox) -> f32 {
        let inter = self.intersection(other).map_or(0.0, |i| i.area());
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Length of the vertical overlap (negative when separated).
    pub fn v_overlap(&self, other: &BBox) -> f32 {
        self.bottom.min(other.bottom) - self.top.max(other.top)
    }

    /// Length of the horizontal overlap (negative when separated).
    pub fn h_overlap(&self, other: &BBox) -> f32 {
        self.right.min(other.right) - self.left.max(other.left)
    }

    /// One-dimensional IoU of the vertical extents.
    pub fn v_iou(&self, other: &BBox) -> f32 {
        interval_iou(self.top, self.bottom, other.top, other.bottom)
    }

    /// Horizontal gap from this box to `other` (negative when overlapping).
    pub fn h_distance(&self, other: &BBox) -> f32 {
        (other.left - self.right).max(self.left - other.right)
    }

    /// True when the centers are within `ratio` × average height vertically.
    pub fn is_same_line(&self, other: &BBox, ratio: f32) -> bool {
        let avg_h = (self.height() + other.height()) / 2.0;
        (self.cy() - other.cy()).abs() < avg_h * ratio
    }

    /// True when this box ends above `other`, allowing `ratio` × average height of overlap.
    pub fn is_above(&self, other: &BBox, ratio: f32) -> bool {
        let avg_h = (self.height() + other.height()) / 2.0;
        self.bottom <= other.top + avg_h * ratio
    }

    /// True when this box starts below `other`, allowing `ratio` × average height of overlap.
    pub fn is_below(&self, other: &BBox, ratio: f32) -> bool {
        other.is_above(self, ratio)
    }

    /// True when this box ends left of `other`, allowing `ratio` × average height of overlap.
    pub fn is_left_of(&self, other: &BBox, ratio: f32) -> bool {
        let avg_h = (self.height() + other.height()) / 2.0;
        self.right <= other.left + avg_h * ratio
    }

    /// True when `other` lies fully inside this box.
    pub fn contains(&self, other: &BBox) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    /// True when the point lies inside or on the edge of this box.
    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.top && p.y <= self.bottom
    }

    /// Corners in clockwise order starting at top-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.left, self.top),
            Point::new(self.right, self.top),
            Point::new(self.right, self.bottom),
            Point::new(self.left, self.bottom),
        ]
    }

    /// Affine registration transform.
    ///
    /// Each corner is shifted by `-offset`, scaled by `scale`, rotated by `angle`
    /// degrees around the origin and shifted by `offset2`; the result is the
    /// axis-aligned bounds of the moved corners.
    pub fn transform(&self, offset: Point, scale: f32, angle: f32, offset2: Point) -> BBox {
        let origin = Point::default();
        let moved: Vec<Point> = self
            .corners()
            .iter()
            .map(|c| {
                let p = Point::new((c.x - offset.x) * scale, (c.y - offset.y) * scale);
                let r = p.rotate_around(origin, angle);
                Point::new(r.x + offset2.x, r.y + offset2.y)
            })
            .collect();
        BBox::from_points(&moved).unwrap_or(*self)
    }
}

/// A quadrilateral text box with its skew angle, as produced by rotated OCR detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotatedBox {
    /// Corners in detector order (top-left, top-right, bottom-right, bottom-left)
    pub points: [Point; 4],
    /// Skew angle in degrees
    pub angle: f32,
}

impl RotatedBox {
    /// Create a rotated box.
    pub fn new(points: [Point; 4], angle: f32) -> Self {
        Self { points, angle }
    }

    /// Axis-aligned bounds.
    pub fn bounding_box(&self) -> BBox {
        BBox::from_points(&self.points).unwrap_or_default()
    }
}

/// Angle in degrees of the line from `a` to `b` using the given y reference.
///
/// The two boxes are ordered left to right first, so the result lies in
/// `(-90, 90]`.
///
/// # Examples
///
/// ```
/// use table_oxide::geometry::{angle_between, BBox, YRef};
///
/// let a = BBox::new(0.0, 0.0, 10.0, 10.0);
/// let b = BBox::new(100.0, 0.0, 110.0, 10.0);
/// assert_eq!(angle_between(&a, &b, YRef::Center), 0.0);
/// ```
pub fn angle_between(a: &BBox, b: &BBox, yref: YRef) -> f32 {
    let (l, r) = if a.cx() <= b.cx() { (a, b) } else { (b, a) };
    let dx = r.cx() - l.cx();
    let dy = r.y_at(yref) - l.y_at(yref);
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    dy.atan2(dx).to_degrees()
}

/// Angle between two boxes averaged over the center, top and bottom references.
pub fn mean_angle_between(a: &BBox, b: &BBox) -> f32 {
    YRef::ALL
        .iter()
        .map(|yref| angle_between(a, b, *yref))
        .sum::<f32>()
        / YRef::ALL.len() as f32
}

/// One-dimensional intersection over union of `[a0, a1]` and `[b0, b1]`.
pub fn interval_iou(a0: f32, a1: f32, b0: f32, b1: f32) -> f32 {
    let inter = (a1.min(b1) - a0.max(b0)).max(0.0);
    let union = (a1.max(b1) - a0.min(b0)).max(0.0);
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Compute the Euclidean distance between two points.
///
/// # Examples
///
/// ```
/// use table_oxide::geometry::{Point, euclidean_distance};
///
/// let p1 = Point::new(0.0, 0.0);
/// let p2 = Point::new(3.0, 4.0);
///
/// assert_eq!(euclidean_distance(&p1, &p2), 5.0);
/// ```
pub fn euclidean_distance(p1: &Point, p2: &Point) -> f32 {
    ((p2.x - p1.x).powi(2) + (p2.y - p1.y).powi(2)).sqrt()
}

/// Median of the values, `None` when empty. NaNs sort last.
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Population variance, `0.0` for fewer than two values.
pub fn variance(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32
}
