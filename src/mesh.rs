//! Tetrahedral meshes with element attributes and boundary elements.

pub mod cuboid;
pub mod submesh;

use crate::{
  error::{Error, Result},
  geometry::{triangle_area_vector, Point, TetGeometry},
};

use indexmap::IndexSet;
use std::cell::{Ref, RefCell};

pub type VertexIdx = usize;
pub type CellIdx = usize;
pub type EdgeIdx = usize;
pub type FaceIdx = usize;

/// Domain (element) or boundary attribute.
pub type Attribute = i32;

/// Local edges of a tetrahedron as pairs of local vertices.
pub const LOCAL_EDGES: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];
/// Local faces of a tetrahedron, face `i` is opposite to vertex `i`.
pub const LOCAL_FACES: [[usize; 3]; 4] = [[1, 2, 3], [0, 2, 3], [0, 1, 3], [0, 1, 2]];

/// Triangle tagged with a boundary attribute.
///
/// The vertex order defines the orientation of the element.
/// Boundary elements may lie on interior faces of the mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryElement {
  pub vertices: [VertexIdx; 3],
  pub attribute: Attribute,
}

#[derive(Debug, Clone)]
struct Attributes {
  cells: Vec<Attribute>,
  boundary: Vec<BoundaryElement>,
}

/// Conforming tetrahedral mesh.
///
/// Cell vertices are stored sorted ascending, such that local and global
/// orientation of edges and faces coincide: every edge and face is oriented
/// by increasing global vertex index.
/// Attributes live behind a `RefCell`, so that mesh surgery can retag
/// elements of a shared mesh.
#[derive(Debug)]
pub struct Mesh {
  coords: Vec<Point>,
  cells: Vec<[VertexIdx; 4]>,
  geometries: Vec<TetGeometry>,
  edges: IndexSet<[VertexIdx; 2]>,
  faces: IndexSet<[VertexIdx; 3]>,
  cell_edges: Vec<[EdgeIdx; 6]>,
  cell_faces: Vec<[FaceIdx; 4]>,
  face_cells: Vec<Vec<CellIdx>>,
  attributes: RefCell<Attributes>,
}

impl Mesh {
  pub fn new(
    coords: Vec<Point>,
    mut cells: Vec<[VertexIdx; 4]>,
    cell_attributes: Vec<Attribute>,
  ) -> Result<Self> {
    if cells.len() != cell_attributes.len() {
      return Err(Error::DimensionMismatch {
        context: "mesh cell attributes",
        expected: cells.len(),
        found: cell_attributes.len(),
      });
    }
    if let Some(a) = cell_attributes.iter().find(|&&a| a <= 0) {
      return Err(Error::Mesh(format!("element attributes must be positive, found {a}")));
    }

    let mut geometries = Vec::with_capacity(cells.len());
    for (icell, cell) in cells.iter_mut().enumerate() {
      cell.sort_unstable();
      if cell.iter().any(|&v| v >= coords.len()) {
        return Err(Error::Mesh(format!("cell {icell} references missing vertex")));
      }
      if cell.windows(2).any(|w| w[0] == w[1]) {
        return Err(Error::Mesh(format!("cell {icell} has repeated vertices")));
      }
      let geo = TetGeometry::new(cell.map(|v| coords[v]))
        .ok_or_else(|| Error::Mesh(format!("cell {icell} is degenerate")))?;
      geometries.push(geo);
    }

    let mut edges = IndexSet::new();
    let mut faces = IndexSet::new();
    let mut cell_edges = Vec::with_capacity(cells.len());
    let mut cell_faces = Vec::with_capacity(cells.len());
    for cell in &cells {
      cell_edges.push(LOCAL_EDGES.map(|[a, b]| edges.insert_full([cell[a], cell[b]]).0));
      cell_faces.push(LOCAL_FACES.map(|[a, b, c]| faces.insert_full([cell[a], cell[b], cell[c]]).0));
    }

    let mut face_cells = vec![Vec::new(); faces.len()];
    for (icell, faces) in cell_faces.iter().enumerate() {
      for &iface in faces {
        face_cells[iface].push(icell);
      }
    }
    if face_cells.iter().any(|c| c.len() > 2) {
      return Err(Error::Mesh("face shared by more than two cells".into()));
    }

    Ok(Self {
      coords,
      cells,
      geometries,
      edges,
      faces,
      cell_edges,
      cell_faces,
      face_cells,
      attributes: RefCell::new(Attributes {
        cells: cell_attributes,
        boundary: Vec::new(),
      }),
    })
  }

  pub fn nvertices(&self) -> usize {
    self.coords.len()
  }
  pub fn ncells(&self) -> usize {
    self.cells.len()
  }
  pub fn nedges(&self) -> usize {
    self.edges.len()
  }
  pub fn nfaces(&self) -> usize {
    self.faces.len()
  }

  pub fn coord(&self, v: VertexIdx) -> &Point {
    &self.coords[v]
  }
  pub fn coords(&self) -> &[Point] {
    &self.coords
  }
  pub fn cell(&self, c: CellIdx) -> &[VertexIdx; 4] {
    &self.cells[c]
  }
  pub fn edge(&self, e: EdgeIdx) -> &[VertexIdx; 2] {
    &self.edges[e]
  }
  pub fn face(&self, f: FaceIdx) -> &[VertexIdx; 3] {
    &self.faces[f]
  }
  pub fn cell_edges(&self, c: CellIdx) -> &[EdgeIdx; 6] {
    &self.cell_edges[c]
  }
  pub fn cell_faces(&self, c: CellIdx) -> &[FaceIdx; 4] {
    &self.cell_faces[c]
  }
  /// One cell for faces on the mesh boundary, two for interior faces.
  pub fn face_cells(&self, f: FaceIdx) -> &[CellIdx] {
    &self.face_cells[f]
  }
  pub fn face_is_interior(&self, f: FaceIdx) -> bool {
    self.face_cells[f].len() == 2
  }
  pub fn cell_geometry(&self, c: CellIdx) -> &TetGeometry {
    &self.geometries[c]
  }

  pub fn edge_index(&self, mut vertices: [VertexIdx; 2]) -> Option<EdgeIdx> {
    vertices.sort_unstable();
    self.edges.get_index_of(&vertices)
  }
  pub fn face_index(&self, mut vertices: [VertexIdx; 3]) -> Option<FaceIdx> {
    vertices.sort_unstable();
    self.faces.get_index_of(&vertices)
  }

  /// Local position of a global face within a cell.
  pub fn local_face(&self, c: CellIdx, f: FaceIdx) -> Option<usize> {
    self.cell_faces[c].iter().position(|&i| i == f)
  }

  pub fn face_coords(&self, f: FaceIdx) -> [Point; 3] {
    self.faces[f].map(|v| self.coords[v])
  }
  pub fn boundary_element_coords(&self, be: &BoundaryElement) -> [Point; 3] {
    be.vertices.map(|v| self.coords[v])
  }

  /// Vertices of face `f` ordered such that its normal points out of cell `c`.
  pub fn face_oriented_outward(&self, f: FaceIdx, c: CellIdx) -> [VertexIdx; 3] {
    let [a, b, d] = self.faces[f];
    let normal = triangle_area_vector(&self.face_coords(f));
    let opposite = self.cells[c]
      .iter()
      .find(|&&v| !self.faces[f].contains(&v))
      .map(|&v| self.coords[v])
      .unwrap_or_else(|| self.cell_geometry(c).centroid());
    if normal.dot(&(self.coords[a] - opposite)) >= 0.0 {
      [a, b, d]
    } else {
      [a, d, b]
    }
  }
}

/// Attribute access.
impl Mesh {
  pub fn attribute(&self, c: CellIdx) -> Attribute {
    self.attributes.borrow().cells[c]
  }
  pub fn set_attribute(&self, c: CellIdx, attribute: Attribute) {
    self.attributes.borrow_mut().cells[c] = attribute;
  }
  pub fn cell_attributes(&self) -> Vec<Attribute> {
    self.attributes.borrow().cells.clone()
  }
  pub fn max_attribute(&self) -> Attribute {
    self.attributes.borrow().cells.iter().copied().max().unwrap_or(0)
  }

  pub fn boundary_elements(&self) -> Ref<'_, [BoundaryElement]> {
    Ref::map(self.attributes.borrow(), |a| a.boundary.as_slice())
  }
  pub fn nboundary_elements(&self) -> usize {
    self.attributes.borrow().boundary.len()
  }
  pub fn max_boundary_attribute(&self) -> Attribute {
    self
      .attributes
      .borrow()
      .boundary
      .iter()
      .map(|b| b.attribute)
      .max()
      .unwrap_or(0)
  }

  pub fn add_boundary_element(&self, element: BoundaryElement) -> Result<()> {
    if self.face_index(element.vertices).is_none() {
      return Err(Error::Mesh(format!(
        "boundary element {:?} is not a face of the mesh",
        element.vertices
      )));
    }
    self.attributes.borrow_mut().boundary.push(element);
    Ok(())
  }

  /// Boundary elements carrying one of the given attributes, with their face.
  pub fn boundary_faces(&self, attributes: &[Attribute]) -> Vec<(FaceIdx, BoundaryElement)> {
    self
      .boundary_elements()
      .iter()
      .filter(|be| attributes.contains(&be.attribute))
      .filter_map(|be| self.face_index(be.vertices).map(|f| (f, be.clone())))
      .collect()
  }

  pub fn boundary_vertices(&self, attributes: &[Attribute]) -> Vec<VertexIdx> {
    let mut vertices: Vec<_> = self
      .boundary_faces(attributes)
      .into_iter()
      .flat_map(|(f, _)| self.faces[f])
      .collect();
    vertices.sort_unstable();
    vertices.dedup();
    vertices
  }

  pub fn boundary_edges(&self, attributes: &[Attribute]) -> Vec<EdgeIdx> {
    let mut edges: Vec<_> = self
      .boundary_faces(attributes)
      .into_iter()
      .flat_map(|(f, _)| {
        let [a, b, c] = self.faces[f];
        [[a, b], [a, c], [b, c]]
      })
      .filter_map(|e| self.edges.get_index_of(&e))
      .collect();
    edges.sort_unstable();
    edges.dedup();
    edges
  }

  /// Snapshot of the element attributes, restored when the guard drops.
  pub fn attribute_guard(&self) -> AttributeGuard<'_> {
    AttributeGuard {
      mesh: self,
      saved: self.cell_attributes(),
    }
  }
}

/// Restores the element attributes of a mesh on every exit path.
///
/// Boundary elements added while the guard is alive are kept.
pub struct AttributeGuard<'m> {
  mesh: &'m Mesh,
  saved: Vec<Attribute>,
}

impl AttributeGuard<'_> {
  pub fn saved(&self) -> &[Attribute] {
    &self.saved
  }
}

impl Drop for AttributeGuard<'_> {
  fn drop(&mut self) {
    let mut attributes = self.mesh.attributes.borrow_mut();
    attributes.cells.copy_from_slice(&self.saved);
    tracing::debug!("restored {} element attributes", self.saved.len());
  }
}
