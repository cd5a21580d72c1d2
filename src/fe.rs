//! Lowest order finite element spaces on tetrahedral meshes.

pub mod gridfunction;
pub mod whitney;

use crate::{
  error::{Error, Result},
  mesh::{Attribute, CellIdx, Mesh},
};

use std::{fmt, rc::Rc};

pub type DofIdx = usize;

/// Whitney form degree of a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeFamily {
  /// Continuous scalar functions, one dof per vertex.
  H1,
  /// Tangentially continuous vector fields, one dof per edge.
  HCurl,
  /// Normally continuous vector fields, one dof per face.
  HDiv,
}

impl FeFamily {
  pub fn nlocal_dofs(self) -> usize {
    match self {
      Self::H1 => 4,
      Self::HCurl => 6,
      Self::HDiv => 4,
    }
  }
  pub fn is_vector(self) -> bool {
    !matches!(self, Self::H1)
  }
}

/// Named finite element collection, e.g. `ND_3D_P1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeCollection {
  family: FeFamily,
  order: usize,
}

impl FeCollection {
  /// Only the lowest order of each family is available.
  pub fn new(family: FeFamily, order: usize) -> Result<Self> {
    let lowest = Self::lowest_order(family);
    if order != lowest {
      let name = Self { family, order }.to_string();
      return Err(Error::UnsupportedElement(name));
    }
    Ok(Self { family, order })
  }

  pub fn lowest(family: FeFamily) -> Self {
    Self {
      family,
      order: Self::lowest_order(family),
    }
  }

  fn lowest_order(family: FeFamily) -> usize {
    match family {
      FeFamily::H1 | FeFamily::HCurl => 1,
      FeFamily::HDiv => 0,
    }
  }

  pub fn from_name(name: &str) -> Result<Self> {
    let unsupported = || Error::UnsupportedElement(name.to_string());
    let mut parts = name.split('_');
    let family = match parts.next() {
      Some("H1") => FeFamily::H1,
      Some("ND") => FeFamily::HCurl,
      Some("RT") => FeFamily::HDiv,
      _ => return Err(unsupported()),
    };
    if parts.next() != Some("3D") {
      return Err(unsupported());
    }
    let order = parts
      .next()
      .and_then(|p| p.strip_prefix('P'))
      .and_then(|p| p.parse().ok())
      .ok_or_else(unsupported)?;
    if parts.next().is_some() {
      return Err(unsupported());
    }
    Self::new(family, order)
  }

  pub fn family(&self) -> FeFamily {
    self.family
  }
  pub fn order(&self) -> usize {
    self.order
  }
}

impl fmt::Display for FeCollection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let prefix = match self.family {
      FeFamily::H1 => "H1",
      FeFamily::HCurl => "ND",
      FeFamily::HDiv => "RT",
    };
    write!(f, "{prefix}_3D_P{}", self.order)
  }
}

/// Finite element space: a collection on a mesh.
#[derive(Debug)]
pub struct FeSpace {
  mesh: Rc<Mesh>,
  collection: FeCollection,
}

impl FeSpace {
  pub fn new(mesh: Rc<Mesh>, collection: FeCollection) -> Self {
    Self { mesh, collection }
  }
  pub fn from_name(mesh: Rc<Mesh>, collection_name: &str) -> Result<Self> {
    Ok(Self::new(mesh, FeCollection::from_name(collection_name)?))
  }

  pub fn mesh(&self) -> &Rc<Mesh> {
    &self.mesh
  }
  pub fn collection(&self) -> &FeCollection {
    &self.collection
  }
  pub fn family(&self) -> FeFamily {
    self.collection.family
  }
  pub fn order(&self) -> usize {
    self.collection.order
  }

  pub fn ndofs(&self) -> usize {
    match self.family() {
      FeFamily::H1 => self.mesh.nvertices(),
      FeFamily::HCurl => self.mesh.nedges(),
      FeFamily::HDiv => self.mesh.nfaces(),
    }
  }

  /// Global dofs of a cell in local basis order.
  pub fn cell_dofs(&self, c: CellIdx) -> &[DofIdx] {
    match self.family() {
      FeFamily::H1 => self.mesh.cell(c).as_slice(),
      FeFamily::HCurl => self.mesh.cell_edges(c).as_slice(),
      FeFamily::HDiv => self.mesh.cell_faces(c).as_slice(),
    }
  }

  /// Dofs living on boundary elements with the given attributes.
  pub fn boundary_dofs(&self, attributes: &[Attribute]) -> Vec<DofIdx> {
    match self.family() {
      FeFamily::H1 => self.mesh.boundary_vertices(attributes),
      FeFamily::HCurl => self.mesh.boundary_edges(attributes),
      FeFamily::HDiv => {
        let mut faces: Vec<_> = self
          .mesh
          .boundary_faces(attributes)
          .into_iter()
          .map(|(f, _)| f)
          .collect();
        faces.sort_unstable();
        faces.dedup();
        faces
      }
    }
  }

  /// Whether both spaces live on the same mesh object.
  pub fn shares_mesh(&self, other: &FeSpace) -> bool {
    Rc::ptr_eq(&self.mesh, &other.mesh)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::mesh::cuboid::CuboidMeshInfo;

  #[test]
  fn collection_names() {
    for name in ["H1_3D_P1", "ND_3D_P1", "RT_3D_P0"] {
      assert_eq!(FeCollection::from_name(name).unwrap().to_string(), name);
    }
    assert_eq!(
      FeCollection::from_name("ND_3D_P1").unwrap().family(),
      FeFamily::HCurl
    );
    for name in ["ND_3D_P2", "H1_2D_P1", "L2_3D_P0", "ND_3D", "RT_3D_P0_x"] {
      assert!(matches!(
        FeCollection::from_name(name),
        Err(Error::UnsupportedElement(_))
      ));
    }
  }

  #[test]
  fn dof_counts() {
    let mesh = Rc::new(CuboidMeshInfo::unit(1).to_mesh().unwrap());
    let h1 = FeSpace::from_name(mesh.clone(), "H1_3D_P1").unwrap();
    let nd = FeSpace::from_name(mesh.clone(), "ND_3D_P1").unwrap();
    let rt = FeSpace::from_name(mesh.clone(), "RT_3D_P0").unwrap();
    // Euler characteristic of a ball: V - E + F - C = 1
    let (v, e, f, c) = (h1.ndofs(), nd.ndofs(), rt.ndofs(), mesh.ncells());
    assert_eq!(v, 8);
    assert_eq!(v as i64 - e as i64 + f as i64 - c as i64, 1);
    assert_eq!(nd.cell_dofs(0).len(), 6);
    assert_eq!(h1.boundary_dofs(&[1]), vec![0, 2, 4, 6]);
  }
}
