//! Submeshes of element domains and field transfer back to the parent.

use super::{Attribute, BoundaryElement, CellIdx, EdgeIdx, FaceIdx, Mesh, VertexIdx};
use crate::{
  error::{Error, Result},
  fe::{gridfunction::GridFunction, FeFamily},
};

use std::rc::Rc;

/// Mesh of the elements of a parent carrying one of a set of attributes.
///
/// Child vertices keep the relative order of their parents, so edge and face
/// orientations agree between child and parent and dofs transfer without sign changes.
pub struct SubMesh {
  mesh: Rc<Mesh>,
  parent: Rc<Mesh>,
  parent_vertices: Vec<VertexIdx>,
  parent_cells: Vec<CellIdx>,
  parent_edges: Vec<EdgeIdx>,
  parent_faces: Vec<FaceIdx>,
}

impl SubMesh {
  pub fn from_domain(parent: &Rc<Mesh>, domains: &[Attribute]) -> Result<Self> {
    let parent_cells: Vec<CellIdx> = (0..parent.ncells())
      .filter(|&c| domains.contains(&parent.attribute(c)))
      .collect();
    if parent_cells.is_empty() {
      return Err(Error::Mesh(format!(
        "no elements with attributes {domains:?} for submesh"
      )));
    }

    let mut used = vec![false; parent.nvertices()];
    for &c in &parent_cells {
      parent.cell(c).iter().for_each(|&v| used[v] = true);
    }
    let parent_vertices: Vec<VertexIdx> = (0..parent.nvertices()).filter(|&v| used[v]).collect();
    let mut child_vertex = vec![usize::MAX; parent.nvertices()];
    for (ichild, &iparent) in parent_vertices.iter().enumerate() {
      child_vertex[iparent] = ichild;
    }

    let coords = parent_vertices.iter().map(|&v| *parent.coord(v)).collect();
    let cells = parent_cells
      .iter()
      .map(|&c| parent.cell(c).map(|v| child_vertex[v]))
      .collect();
    let attributes = parent_cells.iter().map(|&c| parent.attribute(c)).collect();
    let mesh = Mesh::new(coords, cells, attributes)?;

    for be in parent.boundary_elements().iter() {
      if be.vertices.iter().any(|&v| child_vertex[v] == usize::MAX) {
        continue;
      }
      let vertices = be.vertices.map(|v| child_vertex[v]);
      if mesh.face_index(vertices).is_some() {
        mesh.add_boundary_element(BoundaryElement {
          vertices,
          attribute: be.attribute,
        })?;
      }
    }

    let lift = |ids: &[VertexIdx]| -> Vec<VertexIdx> { ids.iter().map(|&v| parent_vertices[v]).collect() };
    let parent_edges = (0..mesh.nedges())
      .map(|e| {
        let p = lift(mesh.edge(e).as_slice());
        parent
          .edge_index([p[0], p[1]])
          .ok_or_else(|| Error::Mesh("submesh edge missing in parent".into()))
      })
      .collect::<Result<_>>()?;
    let parent_faces = (0..mesh.nfaces())
      .map(|f| {
        let p = lift(mesh.face(f).as_slice());
        parent
          .face_index([p[0], p[1], p[2]])
          .ok_or_else(|| Error::Mesh("submesh face missing in parent".into()))
      })
      .collect::<Result<_>>()?;

    tracing::debug!(
      "extracted submesh with {} of {} elements",
      mesh.ncells(),
      parent.ncells()
    );

    Ok(Self {
      mesh: Rc::new(mesh),
      parent: Rc::clone(parent),
      parent_vertices,
      parent_cells,
      parent_edges,
      parent_faces,
    })
  }

  pub fn mesh(&self) -> &Rc<Mesh> {
    &self.mesh
  }
  pub fn parent(&self) -> &Rc<Mesh> {
    &self.parent
  }
  pub fn parent_cells(&self) -> &[CellIdx] {
    &self.parent_cells
  }
  pub fn parent_vertices(&self) -> &[VertexIdx] {
    &self.parent_vertices
  }

  /// Parent dof of every child dof of the given family.
  pub fn parent_dofs(&self, family: FeFamily) -> &[usize] {
    match family {
      FeFamily::H1 => &self.parent_vertices,
      FeFamily::HCurl => &self.parent_edges,
      FeFamily::HDiv => &self.parent_faces,
    }
  }

  /// Overwrites the parent dofs covered by the submesh with the child field.
  pub fn transfer(&self, child: &GridFunction, parent: &mut GridFunction) -> Result<()> {
    self.transfer_scaled(child, 1.0, parent)
  }

  /// Like [`Self::transfer`] with the child field scaled, leaving the child untouched.
  pub fn transfer_scaled(&self, child: &GridFunction, scale: f64, parent: &mut GridFunction) -> Result<()> {
    if !Rc::ptr_eq(child.space().mesh(), &self.mesh) || !Rc::ptr_eq(parent.space().mesh(), &self.parent) {
      return Err(Error::Mesh("transfer between fields not on this submesh and its parent".into()));
    }
    if child.family() != parent.family() {
      return Err(Error::UnsupportedElement(format!(
        "transfer from {} to {}",
        child.space().collection(),
        parent.space().collection()
      )));
    }
    for (ichild, &iparent) in self.parent_dofs(child.family()).iter().enumerate() {
      parent.set(iparent, scale * child.data()[ichild]);
    }
    Ok(())
  }
}
