//! Planar-approximated geodesy over WGS84 coordinates
//!
//! All functions work in a local planar projection: longitude differences are
//! scaled by `cos(latitude)` and the equatorial radius, latitude differences by
//! the polar radius and an empirical correction for the meridional radius of
//! curvature. No elliptic geometry (orthodromes etc.) is involved, so inputs
//! must be close together and away from the poles.
//!
//! Coordinates are `geo::Coord<f64>` with `x` = longitude and `y` = latitude,
//! both in degrees.

use geo::{Coord, Rect};

/// Polar radius of the Earth in meters
pub const POLAR_RADIUS: f64 = 6356752.3142451795;

/// Equatorial radius of the Earth in meters
pub const EQUATORIAL_RADIUS: f64 = 6378137.0;

/// Adjustment for the meridional radius of curvature (tuned for Central Europe)
pub const MERIDIONAL_CORRECTION: f64 = 1.00185;

/// Coordinates closer than this (in degrees) are considered identical
pub const EPSILON: f64 = 1.0e-12;

/// Meters per radian of longitude at the equator
const X_SCALE: f64 = EQUATORIAL_RADIUS;

/// Meters per radian of latitude, including the meridional correction
const Y_SCALE: f64 = POLAR_RADIUS * MERIDIONAL_CORRECTION;

/// Build a coordinate from latitude and longitude in degrees
#[inline(always)]
pub fn latlon(lat: f64, lon: f64) -> Coord<f64> {
    Coord { x: lon, y: lat }
}

/// Local east/north frame anchored at a latitude
#[derive(Clone, Copy, Debug)]
struct LocalFrame {
    cos_lat: f64,
}

impl LocalFrame {
    #[inline(always)]
    fn at(lat: f64) -> Self {
        Self {
            cos_lat: lat.to_radians().cos(),
        }
    }

    /// Displacement from `from` to `to` in meters (east, north)
    #[inline(always)]
    fn project(&self, from: Coord<f64>, to: Coord<f64>) -> (f64, f64) {
        (
            X_SCALE * (to.x - from.x).to_radians() * self.cos_lat,
            Y_SCALE * (to.y - from.y).to_radians(),
        )
    }
}

#[inline(always)]
fn is_degenerate(a: Coord<f64>, b: Coord<f64>) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dx * dx + dy * dy < EPSILON * EPSILON
}

/// Distance in meters between two coordinates
///
/// The projection is evaluated at the mean latitude, so the result does not
/// depend on argument order.
#[inline]
pub fn distance(p1: Coord<f64>, p2: Coord<f64>) -> f64 {
    let (dx, dy) = LocalFrame::at((p1.y + p2.y) / 2.0).project(p1, p2);
    dx.hypot(dy)
}

/// Perpendicular distance in meters from `p` to the infinite line through `a` and `b`
///
/// Falls back to the distance from `a` when `a` and `b` coincide.
pub fn distance_to_infinite_line(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    if is_degenerate(a, b) {
        return distance(p, a);
    }

    let frame = LocalFrame::at(p.y);
    let (dx, dy) = frame.project(a, b);
    let (px, py) = frame.project(a, p);
    let cross = px * dy - py * dx;

    (cross * cross / (dx * dx + dy * dy)).sqrt()
}

/// Distance in meters from `p` to the segment `a`-`b`
///
/// When the perpendicular foot falls outside the segment, the distance to the
/// nearer endpoint is returned instead of the distance to the line.
pub fn distance_to_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let frame = LocalFrame::at(p.y);
    let (dx, dy) = frame.project(a, b);

    let (pax, pay) = frame.project(a, p);
    if dx * pax + dy * pay < 0.0 {
        return distance(p, a);
    }

    let (pbx, pby) = frame.project(b, p);
    if dx * pbx + dy * pby >= 0.0 {
        return distance(p, b);
    }

    distance_to_infinite_line(p, a, b)
}

/// Project `p` onto the line through `a` and `b`
///
/// Returns `p` unchanged when `a` and `b` coincide.
pub fn perpendicular_foot(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> Coord<f64> {
    if is_degenerate(a, b) {
        return p;
    }

    let frame = LocalFrame::at(p.y);
    let (dx, dy) = frame.project(a, b);
    let (px, py) = frame.project(a, p);
    let f = (px * dx + py * dy) / (dx * dx + dy * dy);

    Coord {
        x: a.x + (b.x - a.x) * f,
        y: a.y + (b.y - a.y) * f,
    }
}

/// Move `p` by `east` and `north` meters
#[inline]
pub fn offset(p: Coord<f64>, east: f64, north: f64) -> Coord<f64> {
    let cos_lat = p.y.to_radians().cos();
    Coord {
        x: p.x + (east / (X_SCALE * cos_lat)).to_degrees(),
        y: p.y + (north / Y_SCALE).to_degrees(),
    }
}

/// Area in square meters of the rectangle spanned by two opposite corners
#[inline]
pub fn area(corner1: Coord<f64>, corner2: Coord<f64>) -> f64 {
    let (dx, dy) = LocalFrame::at((corner1.y + corner2.y) / 2.0).project(corner1, corner2);
    (dx * dy).abs()
}

/// Area in square meters of a rectangle
#[inline]
pub fn rect_area(rect: &Rect<f64>) -> f64 {
    area(rect.min(), rect.max())
}

/// Expand a rectangle outward by `meters` on every side
pub fn buffer_rect(rect: &Rect<f64>, meters: f64) -> Rect<f64> {
    let cos_lat = ((rect.min().y + rect.max().y) / 2.0).to_radians().cos();
    let dx = (meters / (X_SCALE * cos_lat)).to_degrees();
    let dy = (meters / Y_SCALE).to_degrees();

    Rect::new(
        Coord {
            x: rect.min().x - dx,
            y: rect.min().y - dy,
        },
        Coord {
            x: rect.max().x + dx,
            y: rect.max().y + dy,
        },
    )
}

/// Bounding rectangle of a coordinate sequence, `None` when empty
pub fn bounding_rect(coords: &[Coord<f64>]) -> Option<Rect<f64>> {
    let first = coords.first()?;
    let (min, max) = coords
        .iter()
        .fold((*first, *first), |(min, max), c| {
            (
                Coord {
                    x: min.x.min(c.x),
                    y: min.y.min(c.y),
                },
                Coord {
                    x: max.x.max(c.x),
                    y: max.y.max(c.y),
                },
            )
        });
    Some(Rect::new(min, max))
}

/// Smallest rectangle containing both inputs
#[inline]
pub fn rect_union(a: &Rect<f64>, b: &Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}

/// Whether `inner` lies entirely within `outer` (boundaries included)
#[inline]
pub fn rect_within(inner: &Rect<f64>, outer: &Rect<f64>) -> bool {
    inner.min().x >= outer.min().x
        && inner.min().y >= outer.min().y
        && inner.max().x <= outer.max().x
        && inner.max().y <= outer.max().y
}

/// Whether `p` lies within `rect` (boundaries included)
#[inline]
pub fn rect_contains(rect: &Rect<f64>, p: Coord<f64>) -> bool {
    p.x >= rect.min().x && p.x <= rect.max().x && p.y >= rect.min().y && p.y <= rect.max().y
}

/// Convert Web Mercator (x, y) in meters to a WGS84 coordinate
#[inline(always)]
pub fn mercator_to_wgs84(x: f64, y: f64) -> Coord<f64> {
    let lon = (x / EQUATORIAL_RADIUS).to_degrees();
    let lat = (2.0 * (y / EQUATORIAL_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    latlon(lat, lon)
}

/// Convert a rectangle in Web Mercator meters (as reported by map views) to WGS84
pub fn mercator_rect_to_wgs84(rect: &Rect<f64>) -> Rect<f64> {
    Rect::new(
        mercator_to_wgs84(rect.min().x, rect.min().y),
        mercator_to_wgs84(rect.max().x, rect.max().y),
    )
}
