use super::{auxiliary_solver_options, hcurl_mass, unit_coefficient, HelmholtzProjector, OpenCoilSource, Source};
use crate::{
  coefficients::{EvalPoint, ScalarCoefficient},
  error::{Error, Result},
  fe::{gridfunction::GridFunction, FeCollection, FeFamily, FeSpace},
  forms::LinearForm,
  geometry::Point,
  linalg::{solvers::SolverOptions, spmv},
  mesh::{submesh::SubMesh, Attribute, BoundaryElement, CellIdx, FaceIdx, Mesh},
  params::InputParameters,
  registry::Bindings,
};

use indexmap::IndexSet;
use std::{cell::RefCell, rc::Rc};

/// Plane $bold(n) dot bold(x) = d$ with unit normal.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
  normal: na::Vector3<f64>,
  offset: f64,
}

impl Plane {
  /// Plane through three non-collinear points.
  pub fn through(points: &[Point; 3]) -> Result<Self> {
    let normal = (points[0] - points[1]).cross(&(points[1] - points[2]));
    let norm = normal.norm();
    if norm <= f64::MIN_POSITIVE {
      return Err(Error::degenerate("closed coil plane", "electrode face is collinear"));
    }
    let normal = normal / norm;
    Ok(Self {
      normal,
      offset: normal.dot(&points[2]),
    })
  }

  pub fn normal(&self) -> &na::Vector3<f64> {
    &self.normal
  }

  /// Side of the plane a point lies on: -1, 0 or 1.
  pub fn side(&self, x: &Point) -> i32 {
    let value = self.normal.dot(x) - self.offset;
    if value > 0.0 {
      1
    } else if value < 0.0 {
      -1
    } else {
      0
    }
  }
}

/// Elements cut out of a closed coil next to its electrode, together with the
/// faces separating them from the rest of the coil.
#[derive(Debug, Clone)]
pub struct WedgeCut {
  pub plane: Plane,
  pub cells: Vec<CellIdx>,
  /// Second electrode, oriented out of the wedge.
  pub faces: Vec<BoundaryElement>,
  pub domain_attribute: Attribute,
  pub electrode_attribute: Attribute,
}

impl WedgeCut {
  pub fn new(mesh: &Mesh, coil_domains: &[Attribute], electrode: Attribute) -> Result<Self> {
    let electrode_faces = mesh.boundary_faces(&[electrode]);
    let Some((_, first)) = electrode_faces.first() else {
      return Err(Error::Mesh(format!(
        "no boundary elements with electrode attribute {electrode}"
      )));
    };
    let plane = Plane::through(&mesh.boundary_element_coords(first))?;

    let mut on_electrode = vec![false; mesh.nvertices()];
    for (f, _) in &electrode_faces {
      mesh.face(*f).iter().for_each(|&v| on_electrode[v] = true);
    }
    let electrode_face_ids: Vec<FaceIdx> = electrode_faces.iter().map(|(f, _)| *f).collect();

    let in_coil = |c: CellIdx| coil_domains.contains(&mesh.attribute(c));
    let cells: Vec<CellIdx> = (0..mesh.ncells())
      .filter(|&c| in_coil(c))
      .filter(|&c| plane.side(&mesh.cell_geometry(c).centroid()) != 1)
      .filter(|&c| mesh.cell(c).iter().any(|&v| on_electrode[v]))
      .collect();
    let mut in_wedge = vec![false; mesh.ncells()];
    cells.iter().for_each(|&c| in_wedge[c] = true);

    let wedge_faces: IndexSet<FaceIdx> = cells
      .iter()
      .flat_map(|&c| mesh.cell_faces(c).iter().copied())
      .collect();
    let domain_attribute = mesh.max_attribute() + 1;
    let electrode_attribute = mesh.max_boundary_attribute() + 1;

    let mut faces = Vec::new();
    for f in wedge_faces {
      let &[c0, c1] = mesh.face_cells(f) else {
        continue;
      };
      if !in_coil(c0) || !in_coil(c1) || (in_wedge[c0] && in_wedge[c1]) {
        continue;
      }
      if electrode_face_ids.contains(&f) {
        continue;
      }
      let wedge_cell = if in_wedge[c0] { c0 } else { c1 };
      faces.push(BoundaryElement {
        vertices: mesh.face_oriented_outward(f, wedge_cell),
        attribute: electrode_attribute,
      });
    }

    if cells.is_empty() || faces.is_empty() {
      return Err(Error::degenerate(
        format!("closed coil on domains {coil_domains:?}"),
        "cutting the coil at the electrode left no wedge",
      ));
    }
    Ok(Self {
      plane,
      cells,
      faces,
      domain_attribute,
      electrode_attribute,
    })
  }
}

/// Unit current around a closed loop coil.
///
/// A wedge of elements is cut out next to the electrode, introducing a
/// second electrode on its far side. The remaining coil and the wedge are
/// solved as open coils whose currents both pass the original electrode with
/// unit flux. Their average on the whole coil is projected once more without
/// any fixed vertex, so the loop is divergence free across both electrodes,
/// and normalised again to unit flux. Element attributes are restored after
/// the cut, the second electrode stays a boundary element of the mesh.
pub struct ClosedCoilSource {
  source_name: String,
  current_name: Option<String>,
  coil_domains: Vec<Attribute>,
  electrode: Attribute,
  solver_options: Option<InputParameters>,
  options: SolverOptions,
  state: Option<ClosedCoilState>,
}

struct ClosedCoilState {
  cut: WedgeCut,
  coils: [OpenCoilSource; 2],
  submesh: SubMesh,
  unit_source: GridFunction,
  current: Rc<dyn ScalarCoefficient>,
  sample: EvalPoint,
  parent_source: Rc<RefCell<GridFunction>>,
  mass: nas::CsrMatrix<f64>,
}

impl ClosedCoilSource {
  /// Reads `SourceName` and the optional `IFuncCoefName` and `SolverOptions`.
  pub fn new(params: &InputParameters, coil_domains: Vec<Attribute>, electrode: Attribute) -> Result<Self> {
    let current_name = if params.has("IFuncCoefName") {
      Some(params.get_str("IFuncCoefName")?.to_string())
    } else {
      None
    };
    let solver_options = if params.has("SolverOptions") {
      Some(params.get_params("SolverOptions")?.clone())
    } else {
      None
    };
    Ok(Self {
      source_name: params.get_str("SourceName")?.to_string(),
      current_name,
      coil_domains,
      electrode,
      solver_options,
      options: auxiliary_solver_options(params)?,
      state: None,
    })
  }

  fn state(&self) -> Result<&ClosedCoilState> {
    self
      .state
      .as_ref()
      .ok_or_else(|| Error::Uninitialized("ClosedCoilSource".into()))
  }

  pub fn wedge(&self) -> Result<&WedgeCut> {
    Ok(&self.state()?.cut)
  }
  /// Open coils of the remaining coil and of the wedge.
  pub fn open_coils(&self) -> Result<&[OpenCoilSource; 2]> {
    Ok(&self.state()?.coils)
  }
  /// Submesh of the whole coil.
  pub fn submesh(&self) -> Result<&SubMesh> {
    Ok(&self.state()?.submesh)
  }
  /// Unit current around the whole loop, on [`Self::submesh`].
  pub fn unit_source(&self) -> Result<&GridFunction> {
    Ok(&self.state()?.unit_source)
  }

  /// Current $I(t)$ of the coil; constant in space.
  pub fn current(&self) -> Result<f64> {
    let state = self.state()?;
    Ok(state.current.eval(&state.sample))
  }

  fn open_coil_params(&self) -> InputParameters {
    let mut params = InputParameters::new()
      .with("SourceName", self.source_name.as_str())
      .with("IFuncCoefName", self.current_name.as_deref().unwrap_or_default());
    if let Some(options) = &self.solver_options {
      params.set("SolverOptions", options.clone());
    }
    params
  }

  fn solve_open_coils(
    &self,
    mesh: &Mesh,
    cut: &WedgeCut,
    current: Rc<dyn ScalarCoefficient>,
    parent_source: Rc<RefCell<GridFunction>>,
  ) -> Result<[OpenCoilSource; 2]> {
    let _guard = mesh.attribute_guard();
    for &c in &cut.cells {
      mesh.set_attribute(c, cut.domain_attribute);
    }

    let params = self.open_coil_params();
    let mut coil = OpenCoilSource::new(
      &params,
      self.coil_domains.clone(),
      (self.electrode, cut.electrode_attribute),
    )?;
    coil.setup(Rc::clone(&current), Rc::clone(&parent_source), None)?;

    let mut wedge = OpenCoilSource::new(
      &params,
      vec![cut.domain_attribute],
      (cut.electrode_attribute, self.electrode),
    )?;
    wedge.set_ref_face(self.electrode);
    wedge.setup(current, parent_source, None)?;

    Ok([coil, wedge])
  }

  /// Averages the two halves on the whole coil, where they meet only on
  /// the electrodes, and removes the divergence left at the electrode vertices.
  fn combine_open_coils(
    &self,
    parent_space: &FeSpace,
    coils: &[OpenCoilSource; 2],
  ) -> Result<(SubMesh, GridFunction)> {
    let submesh = SubMesh::from_domain(parent_space.mesh(), &self.coil_domains)?;
    let hcurl = Rc::new(FeSpace::new(
      Rc::clone(submesh.mesh()),
      FeCollection::new(FeFamily::HCurl, parent_space.order())?,
    ));

    let mut sum = na::DVector::<f64>::zeros(parent_space.ndofs());
    let mut count = vec![0usize; parent_space.ndofs()];
    for coil in coils {
      let unit = coil.unit_source()?;
      let half_dofs = coil.submesh()?.parent_dofs(FeFamily::HCurl);
      for (&iparent, &value) in half_dofs.iter().zip(unit.data().iter()) {
        sum[iparent] += value;
        count[iparent] += 1;
      }
    }
    let data = submesh
      .parent_dofs(FeFamily::HCurl)
      .iter()
      .map(|&iparent| match count[iparent] {
        0 => 0.0,
        n => sum[iparent] / n as f64,
      });
    let data = na::DVector::from_iterator(hcurl.ndofs(), data);
    let mut unit_source = GridFunction::from_data(Rc::clone(&hcurl), data)?;

    HelmholtzProjector::new(hcurl, self.options.clone())?.project(&mut unit_source, &[])?;
    let flux = unit_source.boundary_flux(&[self.electrode]);
    if !flux.is_finite() || flux.abs() <= f64::MIN_POSITIVE {
      return Err(Error::degenerate(
        format!("closed coil on domains {:?}", self.coil_domains),
        format!("flux {flux:e} through electrode {}", self.electrode),
      ));
    }
    unit_source.scale(1.0 / flux.abs());
    Ok((submesh, unit_source))
  }
}

impl Source for ClosedCoilSource {
  /// Cuts and solves the coil once; later calls keep the first solution.
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    const REQUESTER: &str = "ClosedCoilSource";
    if self.state.is_some() {
      tracing::debug!("closed coil on domains {:?} is already initialised", self.coil_domains);
      return Ok(());
    }
    let parent_source = bindings.gridfunctions.require(&self.source_name, REQUESTER)?;
    let current = match self
      .current_name
      .as_deref()
      .and_then(|name| bindings.coefficients.scalars.get(name))
    {
      Some(current) => current,
      None => {
        tracing::warn!(
          "current coefficient {:?} not found for closed coil; assuming unit current",
          self.current_name
        );
        unit_coefficient()
      }
    };

    let parent_space = Rc::clone(parent_source.borrow().space());
    let mesh = Rc::clone(parent_space.mesh());
    let cut = WedgeCut::new(&mesh, &self.coil_domains, self.electrode)?;
    for face in &cut.faces {
      mesh.add_boundary_element(face.clone())?;
    }
    tracing::debug!(
      "closed coil wedge of {} elements with {} electrode faces",
      cut.cells.len(),
      cut.faces.len()
    );

    let coils = self.solve_open_coils(&mesh, &cut, Rc::clone(&current), Rc::clone(&parent_source))?;
    let (submesh, unit_source) = self.combine_open_coils(&parent_space, &coils)?;

    let sample_cell = submesh.parent_cells()[0];
    let sample = EvalPoint::new(mesh.cell_geometry(sample_cell).centroid(), mesh.attribute(sample_cell));
    let mass = hcurl_mass(&parent_space, unit_coefficient()).to_nalgebra_csr()?;

    self.state = Some(ClosedCoilState {
      cut,
      coils,
      submesh,
      unit_source,
      current,
      sample,
      parent_source,
      mass,
    });
    Ok(())
  }

  /// Writes the scaled loop current into the parent field and adds its dual.
  fn apply(&self, lf: &mut LinearForm) -> Result<()> {
    let state = self.state()?;
    let current = state.current.eval(&state.sample);
    state
      .submesh
      .transfer_scaled(&state.unit_source, current, &mut state.parent_source.borrow_mut())?;
    lf.add(1.0, &spmv(&state.mass, state.parent_source.borrow().data()))
  }
}
