//! Geometry of affine tetrahedra and quadrature rules.

pub type Point = na::Vector3<f64>;

/// Barycentric coordinates relative to the four cell vertices.
pub type Barycentric = [f64; 4];

/// Affine tetrahedron with precomputed barycentric gradients.
#[derive(Debug, Clone)]
pub struct TetGeometry {
  vertices: [Point; 4],
  vol: f64,
  difbarys: [na::Vector3<f64>; 4],
}

impl TetGeometry {
  /// Returns `None` for a degenerate (zero volume) tetrahedron.
  pub fn new(vertices: [Point; 4]) -> Option<Self> {
    let jacobian = na::Matrix3::from_columns(&[
      vertices[1] - vertices[0],
      vertices[2] - vertices[0],
      vertices[3] - vertices[0],
    ]);
    let det = jacobian.determinant();
    let vol = det.abs() / 6.0;
    let scale = jacobian.norm().powi(3);
    if vol <= f64::EPSILON * scale {
      return None;
    }
    let inv = jacobian.try_inverse()?;

    // rows of the inverse jacobian are the gradients of lambda_1..lambda_3
    let g1 = inv.row(0).transpose();
    let g2 = inv.row(1).transpose();
    let g3 = inv.row(2).transpose();
    let g0 = -(g1 + g2 + g3);

    Some(Self {
      vertices,
      vol,
      difbarys: [g0, g1, g2, g3],
    })
  }

  pub fn vertices(&self) -> &[Point; 4] {
    &self.vertices
  }
  pub fn vol(&self) -> f64 {
    self.vol
  }
  /// $nabla lambda_i$
  pub fn difbarys(&self) -> &[na::Vector3<f64>; 4] {
    &self.difbarys
  }
  pub fn difbary(&self, i: usize) -> &na::Vector3<f64> {
    &self.difbarys[i]
  }

  pub fn centroid(&self) -> Point {
    self.vertices.iter().sum::<Point>() / 4.0
  }

  pub fn bary2global(&self, bary: &Barycentric) -> Point {
    bary
      .iter()
      .zip(self.vertices.iter())
      .map(|(&l, v)| l * v)
      .sum()
  }

  pub fn global2bary(&self, x: &Point) -> Barycentric {
    let d = x - self.vertices[0];
    let l1 = self.difbarys[1].dot(&d);
    let l2 = self.difbarys[2].dot(&d);
    let l3 = self.difbarys[3].dot(&d);
    [1.0 - l1 - l2 - l3, l1, l2, l3]
  }

  /// $integral_K lambda_i lambda_j$
  pub fn bary_mass(&self, i: usize, j: usize) -> f64 {
    let factor = if i == j { 2.0 } else { 1.0 };
    factor * self.vol / 20.0
  }
}

/// Oriented area vector of a triangle, $1/2 (x_1 - x_0) times (x_2 - x_0)$.
pub fn triangle_area_vector(x: &[Point; 3]) -> na::Vector3<f64> {
  0.5 * (x[1] - x[0]).cross(&(x[2] - x[0]))
}

/// Quadrature rule in barycentric coordinates with weights summing to one.
pub struct QuadRule<const N: usize> {
  pub points: Vec<[f64; N]>,
  pub weights: Vec<f64>,
}

/// Exact for polynomials up to degree two on a tetrahedron.
pub fn tet_quadrature() -> QuadRule<4> {
  let a = 0.585_410_196_624_968_5;
  let b = 0.138_196_601_125_010_5;
  QuadRule {
    points: vec![[a, b, b, b], [b, a, b, b], [b, b, a, b], [b, b, b, a]],
    weights: vec![0.25; 4],
  }
}

/// Triangle rule matched to the polynomial degree of the integrand.
///
/// Degree one uses the centroid, higher degrees the edge midpoint rule,
/// which is exact up to degree two.
pub fn triangle_quadrature(degree: usize) -> QuadRule<3> {
  if degree <= 1 {
    QuadRule {
      points: vec![[1.0 / 3.0; 3]],
      weights: vec![1.0],
    }
  } else {
    QuadRule {
      points: vec![[0.5, 0.5, 0.0], [0.0, 0.5, 0.5], [0.5, 0.0, 0.5]],
      weights: vec![1.0 / 3.0; 3],
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use approx::assert_relative_eq;

  fn reference() -> TetGeometry {
    TetGeometry::new([
      Point::zeros(),
      Point::x(),
      Point::y(),
      Point::z(),
    ])
    .unwrap()
  }

  #[test]
  fn reference_tet() {
    let geo = reference();
    assert_relative_eq!(geo.vol(), 1.0 / 6.0);
    assert_relative_eq!(geo.difbary(0), &na::Vector3::new(-1.0, -1.0, -1.0));
    assert_relative_eq!(geo.difbary(2), &na::Vector3::y());

    let x = Point::new(0.1, 0.2, 0.3);
    let bary = geo.global2bary(&x);
    assert_relative_eq!(bary[0], 0.4, epsilon = 1e-14);
    assert_relative_eq!(geo.bary2global(&bary), x, epsilon = 1e-14);
  }

  #[test]
  fn degenerate_tet_is_rejected() {
    let flat = TetGeometry::new([Point::zeros(), Point::x(), Point::y(), Point::x() + Point::y()]);
    assert!(flat.is_none());
  }

  #[test]
  fn quadrature_integrates_quadratics() {
    let geo = reference();
    let rule = tet_quadrature();
    let integral: f64 = rule
      .points
      .iter()
      .zip(&rule.weights)
      .map(|(p, w)| w * geo.vol() * p[1] * p[2])
      .sum();
    assert_relative_eq!(integral, geo.bary_mass(1, 2), epsilon = 1e-15);
  }
}
