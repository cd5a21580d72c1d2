//! Structured tetrahedral meshes of axis aligned boxes.

use super::{Attribute, BoundaryElement, Mesh, VertexIdx};
use crate::{error::Result, geometry::Point};

/// Kuhn subdivision of the unit cube into six tetrahedra sharing the main diagonal.
///
/// Cube corners are indexed as $i + 2 j + 4 k$.
const KUHN_TETS: [[usize; 4]; 6] = [
  [0, 1, 3, 7],
  [0, 1, 5, 7],
  [0, 2, 3, 7],
  [0, 2, 6, 7],
  [0, 4, 5, 7],
  [0, 4, 6, 7],
];

/// Boundary attributes of the six sides: x-, x+, y-, y+, z-, z+.
pub const SIDE_ATTRIBUTES: [Attribute; 6] = [1, 2, 3, 4, 5, 6];

pub struct CuboidMeshInfo {
  min: Point,
  max: Point,
  nboxes: [usize; 3],
}

impl CuboidMeshInfo {
  pub fn new(min: Point, max: Point, nboxes: [usize; 3]) -> Self {
    Self { min, max, nboxes }
  }
  pub fn unit(nboxes_axis: usize) -> Self {
    Self::new(Point::zeros(), Point::from_element(1.0), [nboxes_axis; 3])
  }

  pub fn min(&self) -> &Point {
    &self.min
  }
  pub fn max(&self) -> &Point {
    &self.max
  }
  pub fn nboxes(&self) -> [usize; 3] {
    self.nboxes
  }
  pub fn nvertices_axis(&self) -> [usize; 3] {
    self.nboxes.map(|n| n + 1)
  }
  pub fn nvertices(&self) -> usize {
    self.nvertices_axis().iter().product()
  }

  /// Converts a cartesian vertex index to a linear one, x varying fastest.
  pub fn vertex_index(&self, cart_idx: [usize; 3]) -> VertexIdx {
    let n = self.nvertices_axis();
    cart_idx[0] + n[0] * (cart_idx[1] + n[1] * cart_idx[2])
  }

  pub fn vertex_coord(&self, cart_idx: [usize; 3]) -> Point {
    let mut x = Point::zeros();
    for d in 0..3 {
      let t = cart_idx[d] as f64 / self.nboxes[d] as f64;
      x[d] = self.min[d] + t * (self.max[d] - self.min[d]);
    }
    x
  }

  /// Mesh with all elements tagged with attribute 1.
  pub fn to_mesh(&self) -> Result<Mesh> {
    self.to_mesh_with_attributes(|_| 1)
  }

  /// Mesh whose element attributes are chosen per box by its cartesian index.
  pub fn to_mesh_with_attributes<F>(&self, box_attribute: F) -> Result<Mesh>
  where
    F: Fn([usize; 3]) -> Attribute,
  {
    let n = self.nvertices_axis();
    let mut coords = Vec::with_capacity(self.nvertices());
    for k in 0..n[2] {
      for j in 0..n[1] {
        for i in 0..n[0] {
          coords.push(self.vertex_coord([i, j, k]));
        }
      }
    }

    let mut cells = Vec::new();
    let mut attributes = Vec::new();
    for k in 0..self.nboxes[2] {
      for j in 0..self.nboxes[1] {
        for i in 0..self.nboxes[0] {
          let corners: [VertexIdx; 8] = std::array::from_fn(|c| {
            self.vertex_index([i + (c & 1), j + ((c >> 1) & 1), k + ((c >> 2) & 1)])
          });
          let attribute = box_attribute([i, j, k]);
          for tet in KUHN_TETS {
            cells.push(tet.map(|c| corners[c]));
            attributes.push(attribute);
          }
        }
      }
    }

    let mesh = Mesh::new(coords, cells, attributes)?;
    self.tag_sides(&mesh)?;
    Ok(mesh)
  }

  fn tag_sides(&self, mesh: &Mesh) -> Result<()> {
    let tol = 1e-12 * (self.max - self.min).norm();
    for f in 0..mesh.nfaces() {
      if mesh.face_is_interior(f) {
        continue;
      }
      let x = mesh.face_coords(f);
      let side = (0..3).find_map(|d| {
        if x.iter().all(|p| (p[d] - self.min[d]).abs() <= tol) {
          Some(2 * d)
        } else if x.iter().all(|p| (p[d] - self.max[d]).abs() <= tol) {
          Some(2 * d + 1)
        } else {
          None
        }
      });
      if let Some(side) = side {
        mesh.add_boundary_element(BoundaryElement {
          vertices: mesh.face_oriented_outward(f, mesh.face_cells(f)[0]),
          attribute: SIDE_ATTRIBUTES[side],
        })?;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::geometry::triangle_area_vector;
  use approx::assert_relative_eq;

  #[test]
  fn cuboid_counts_and_volume() {
    let info = CuboidMeshInfo::new(Point::zeros(), Point::new(2.0, 1.0, 1.0), [2, 1, 1]);
    let mesh = info.to_mesh().unwrap();
    assert_eq!(mesh.nvertices(), 12);
    assert_eq!(mesh.ncells(), 12);
    let vol: f64 = (0..mesh.ncells()).map(|c| mesh.cell_geometry(c).vol()).sum();
    assert_relative_eq!(vol, 2.0, epsilon = 1e-14);
    // every box side is split into two triangles
    assert_eq!(mesh.nboundary_elements(), 2 * (2 + 2 + 2 + 2 + 1 + 1));
  }

  #[test]
  fn sides_are_oriented_outward() {
    let mesh = CuboidMeshInfo::unit(2).to_mesh().unwrap();
    for be in mesh.boundary_elements().iter() {
      let normal = triangle_area_vector(&mesh.boundary_element_coords(be));
      let d = ((be.attribute - 1) / 2) as usize;
      let sign = if be.attribute % 2 == 1 { -1.0 } else { 1.0 };
      assert!(sign * normal[d] > 0.0);
      let area: f64 = normal.norm();
      assert_relative_eq!(area, 0.125, epsilon = 1e-14);
    }
  }

  #[test]
  fn box_attributes() {
    let info = CuboidMeshInfo::unit(2);
    let mesh = info
      .to_mesh_with_attributes(|[i, _, _]| if i == 0 { 1 } else { 2 })
      .unwrap();
    assert_eq!(mesh.max_attribute(), 2);
    let nfirst = mesh.cell_attributes().iter().filter(|&&a| a == 1).count();
    assert_eq!(nfirst, mesh.ncells() / 2);
  }
}
