// SPDX-License-Identifier: AGPL-3.0-only

//! Geometric shapes that cut a finite system out of an infinite lattice.
//!
//! A shape answers a vectorized membership query and exposes a vertex set;
//! the vertices only bound the search region, so they may over-approximate
//! the true extent of the shape.

use std::fmt;

use super::Cartesian;

/// Vectorized membership test plus a bounding vertex set.
pub trait Shape: Send + Sync {
    /// `mask[i]` is true if `positions[i]` lies inside the shape.
    fn contains(&self, positions: &[Cartesian]) -> Vec<bool>;

    /// Points whose lattice coordinates bound every site of the shape.
    fn vertices(&self) -> &[Cartesian];
}

/// Number of unit cells along each lattice vector of a shape-free system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitive {
    pub size: [usize; 3],
}

impl Primitive {
    /// Cell counts beyond the lattice dimension are ignored.
    #[must_use]
    pub const fn new(a1: usize, a2: usize, a3: usize) -> Self {
        Self { size: [a1, a2, a3] }
    }
}

impl Default for Primitive {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

/// Axis-aligned rectangle centered at the origin.
#[derive(Debug, Clone)]
pub struct Rectangle {
    half_width: f64,
    half_height: f64,
    vertices: Vec<Cartesian>,
}

impl Rectangle {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        let (x, y) = (0.5 * width, 0.5 * height);
        Self {
            half_width: x,
            half_height: y,
            vertices: vec![
                Cartesian::new(-x, -y, 0.0),
                Cartesian::new(x, -y, 0.0),
                Cartesian::new(x, y, 0.0),
                Cartesian::new(-x, y, 0.0),
            ],
        }
    }
}

impl Shape for Rectangle {
    fn contains(&self, positions: &[Cartesian]) -> Vec<bool> {
        positions
            .iter()
            .map(|p| p.x.abs() <= self.half_width && p.y.abs() <= self.half_height)
            .collect()
    }

    fn vertices(&self) -> &[Cartesian] {
        &self.vertices
    }
}

/// Disc (or sphere slice in the plane of the lattice).
#[derive(Debug, Clone)]
pub struct Circle {
    radius: f64,
    center: Cartesian,
    vertices: Vec<Cartesian>,
}

impl Circle {
    #[must_use]
    pub fn new(radius: f64, center: Cartesian) -> Self {
        let r = radius;
        let vertices = [(-r, -r), (r, -r), (r, r), (-r, r)]
            .iter()
            .map(|&(x, y)| center + Cartesian::new(x, y, 0.0))
            .collect();
        Self {
            radius,
            center,
            vertices,
        }
    }
}

impl Shape for Circle {
    fn contains(&self, positions: &[Cartesian]) -> Vec<bool> {
        let r2 = self.radius * self.radius;
        positions
            .iter()
            .map(|p| {
                let d = p - self.center;
                d.x * d.x + d.y * d.y <= r2
            })
            .collect()
    }

    fn vertices(&self) -> &[Cartesian] {
        &self.vertices
    }
}

/// Line segment for 1D lattices; a site belongs if its projection falls between the ends.
#[derive(Debug, Clone)]
pub struct Line {
    vertices: Vec<Cartesian>,
}

impl Line {
    #[must_use]
    pub fn new(start: Cartesian, end: Cartesian) -> Self {
        Self {
            vertices: vec![start, end],
        }
    }
}

impl Shape for Line {
    fn contains(&self, positions: &[Cartesian]) -> Vec<bool> {
        let (start, end) = (self.vertices[0], self.vertices[1]);
        let direction = end - start;
        let length2 = direction.norm_squared();
        positions
            .iter()
            .map(|p| {
                if length2 == 0.0 {
                    return (p - start).norm_squared() == 0.0;
                }
                let t = (p - start).dot(&direction) / length2;
                (0.0..=1.0).contains(&t)
            })
            .collect()
    }

    fn vertices(&self) -> &[Cartesian] {
        &self.vertices
    }
}

/// Closed 2D polygon in the xy-plane, even-odd fill rule.
#[derive(Debug, Clone)]
pub struct Polygon {
    vertices: Vec<Cartesian>,
}

impl Polygon {
    #[must_use]
    pub fn new(vertices: Vec<Cartesian>) -> Self {
        Self { vertices }
    }

    fn contains_point(&self, p: &Cartesian) -> bool {
        let v = &self.vertices;
        let mut inside = false;
        let mut j = v.len().wrapping_sub(1);
        for i in 0..v.len() {
            let (a, b) = (v[i], v[j]);
            if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

impl Shape for Polygon {
    fn contains(&self, positions: &[Cartesian]) -> Vec<bool> {
        positions.iter().map(|p| self.contains_point(p)).collect()
    }

    fn vertices(&self) -> &[Cartesian] {
        &self.vertices
    }
}

type ContainsFn = dyn Fn(&[Cartesian]) -> Vec<bool> + Send + Sync;

/// Arbitrary shape from a user membership function and a bounding vertex set.
pub struct FreeformShape {
    contains: Box<ContainsFn>,
    vertices: Vec<Cartesian>,
}

impl FreeformShape {
    pub fn new(
        contains: impl Fn(&[Cartesian]) -> Vec<bool> + Send + Sync + 'static,
        vertices: Vec<Cartesian>,
    ) -> Self {
        Self {
            contains: Box::new(contains),
            vertices,
        }
    }

    /// Bounding box `[center - width/2, center + width/2]` as eight vertices.
    pub fn with_box(
        contains: impl Fn(&[Cartesian]) -> Vec<bool> + Send + Sync + 'static,
        width: Cartesian,
        center: Cartesian,
    ) -> Self {
        let h = width / 2.0;
        let mut vertices = Vec::with_capacity(8);
        for sx in [-1.0, 1.0] {
            for sy in [-1.0, 1.0] {
                for sz in [-1.0, 1.0] {
                    vertices.push(center + Cartesian::new(sx * h.x, sy * h.y, sz * h.z));
                }
            }
        }
        Self::new(contains, vertices)
    }
}

impl fmt::Debug for FreeformShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeformShape")
            .field("vertices", &self.vertices)
            .finish_non_exhaustive()
    }
}

impl Shape for FreeformShape {
    fn contains(&self, positions: &[Cartesian]) -> Vec<bool> {
        (self.contains)(positions)
    }

    fn vertices(&self) -> &[Cartesian] {
        &self.vertices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_membership() {
        let rect = Rectangle::new(2.0, 1.0);
        let mask = rect.contains(&[
            Cartesian::new(0.0, 0.0, 0.0),
            Cartesian::new(1.0, 0.5, 0.0),
            Cartesian::new(1.1, 0.0, 0.0),
        ]);
        assert_eq!(mask, vec![true, true, false]);
        assert_eq!(rect.vertices().len(), 4);
    }

    #[test]
    fn circle_membership() {
        let circle = Circle::new(1.0, Cartesian::new(1.0, 0.0, 0.0));
        let mask = circle.contains(&[Cartesian::new(1.5, 0.5, 0.0), Cartesian::new(-0.5, 0.0, 0.0)]);
        assert_eq!(mask, vec![true, false]);
    }

    #[test]
    fn polygon_even_odd() {
        // triangle
        let tri = Polygon::new(vec![
            Cartesian::new(0.0, 0.0, 0.0),
            Cartesian::new(4.0, 0.0, 0.0),
            Cartesian::new(0.0, 4.0, 0.0),
        ]);
        let mask = tri.contains(&[Cartesian::new(1.0, 1.0, 0.0), Cartesian::new(3.0, 3.0, 0.0)]);
        assert_eq!(mask, vec![true, false]);
    }

    #[test]
    fn line_projection() {
        let line = Line::new(Cartesian::new(-1.0, 0.0, 0.0), Cartesian::new(1.0, 0.0, 0.0));
        let mask = line.contains(&[Cartesian::new(0.5, 3.0, 0.0), Cartesian::new(1.5, 0.0, 0.0)]);
        assert_eq!(mask, vec![true, false]);
    }

    #[test]
    fn freeform_delegates_to_closure() {
        let shape = FreeformShape::with_box(
            |p| p.iter().map(|r| r.x > 0.0).collect(),
            Cartesian::new(2.0, 2.0, 0.0),
            Cartesian::zeros(),
        );
        assert_eq!(shape.vertices().len(), 8);
        assert_eq!(
            shape.contains(&[Cartesian::new(0.5, 0.0, 0.0), Cartesian::new(-0.5, 0.0, 0.0)]),
            vec![true, false]
        );
    }
}
