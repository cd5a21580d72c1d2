use super::{auxiliary_solver_options, hcurl_mass, unit_coefficient, HelmholtzProjector, PotentialSolver, Source};
use crate::{
  boundary_conditions::{BcMap, ScalarDirichletBc},
  coefficients::{EvalPoint, ScalarCoefficient},
  error::{Error, Result},
  fe::{gridfunction::GridFunction, FeCollection, FeFamily, FeSpace},
  forms::LinearForm,
  linalg::{solvers::SolverOptions, spmv},
  mesh::{submesh::SubMesh, Attribute},
  params::InputParameters,
  registry::Bindings,
};

use std::{cell::RefCell, rc::Rc};

const POTENTIAL: &str = "V";

/// Unit current through a coil domain between two electrodes.
///
/// On a submesh of the coil the potential with $V = 1$ on the high and
/// $V = 0$ on the low electrode is solved, its negative gradient is cleaned
/// of divergence and normalised to unit flux through the reference face.
/// Every `apply` scales this unit field with the current $I(t)$, writes it
/// into the parent source field and adds its dual.
pub struct OpenCoilSource {
  source_name: String,
  potential_name: Option<String>,
  current_name: String,
  coil_domains: Vec<Attribute>,
  electrodes: (Attribute, Attribute),
  ref_face: Attribute,
  options: SolverOptions,
  state: Option<OpenCoilState>,
}

struct OpenCoilState {
  current: Rc<dyn ScalarCoefficient>,
  sample: EvalPoint,
  parent_source: Rc<RefCell<GridFunction>>,
  parent_potential: Option<Rc<RefCell<GridFunction>>>,
  submesh: SubMesh,
  unit_source: GridFunction,
  unit_potential: GridFunction,
  raw_flux: f64,
  mass: nas::CsrMatrix<f64>,
}

impl OpenCoilSource {
  /// Reads `SourceName`, `IFuncCoefName` and the optional `PotentialName` and `SolverOptions`.
  ///
  /// `electrodes` are the (high, low) boundary attributes; the reference face
  /// defaults to the high electrode.
  pub fn new(params: &InputParameters, coil_domains: Vec<Attribute>, electrodes: (Attribute, Attribute)) -> Result<Self> {
    let potential_name = if params.has("PotentialName") {
      Some(params.get_str("PotentialName")?.to_string())
    } else {
      None
    };
    Ok(Self {
      source_name: params.get_str("SourceName")?.to_string(),
      potential_name,
      current_name: params.get_str("IFuncCoefName")?.to_string(),
      coil_domains,
      electrodes,
      ref_face: electrodes.0,
      options: auxiliary_solver_options(params)?,
      state: None,
    })
  }

  /// Boundary attribute through which the unit flux is measured.
  pub fn set_ref_face(&mut self, attribute: Attribute) {
    self.ref_face = attribute;
  }
  pub fn ref_face(&self) -> Attribute {
    self.ref_face
  }
  pub fn electrodes(&self) -> (Attribute, Attribute) {
    self.electrodes
  }

  fn state(&self) -> Result<&OpenCoilState> {
    self
      .state
      .as_ref()
      .ok_or_else(|| Error::Uninitialized("OpenCoilSource".into()))
  }

  /// Unit current on the coil submesh.
  pub fn unit_source(&self) -> Result<&GridFunction> {
    Ok(&self.state()?.unit_source)
  }
  /// Potential belonging to the unit current.
  pub fn unit_potential(&self) -> Result<&GridFunction> {
    Ok(&self.state()?.unit_potential)
  }
  /// Flux through the reference face before normalisation.
  pub fn raw_flux(&self) -> Result<f64> {
    Ok(self.state()?.raw_flux)
  }
  pub fn submesh(&self) -> Result<&SubMesh> {
    Ok(&self.state()?.submesh)
  }

  /// Solves for the unit current with explicitly resolved parent fields.
  pub(crate) fn setup(
    &mut self,
    current: Rc<dyn ScalarCoefficient>,
    parent_source: Rc<RefCell<GridFunction>>,
    parent_potential: Option<Rc<RefCell<GridFunction>>>,
  ) -> Result<()> {
    let parent_space = Rc::clone(parent_source.borrow().space());
    if parent_space.family() != FeFamily::HCurl {
      return Err(Error::UnsupportedElement(format!(
        "coil source field `{}` in {}",
        self.source_name,
        parent_space.collection()
      )));
    }
    let parent_mesh = Rc::clone(parent_space.mesh());
    let submesh = SubMesh::from_domain(&parent_mesh, &self.coil_domains)?;

    let h1 = Rc::new(FeSpace::new(
      Rc::clone(submesh.mesh()),
      FeCollection::new(FeFamily::H1, parent_space.order())?,
    ));
    let hcurl = Rc::new(FeSpace::new(
      Rc::clone(submesh.mesh()),
      FeCollection::new(FeFamily::HCurl, parent_space.order())?,
    ));
    let mut unit_potential = GridFunction::new(Rc::clone(&h1));
    let mut unit_source = GridFunction::new(Rc::clone(&hcurl));

    let (high, low) = self.electrodes;
    let mut bc_map = BcMap::new();
    bc_map.add_essential("high_potential", ScalarDirichletBc::constant(POTENTIAL, vec![high], 1.0))?;
    bc_map.add_essential("low_potential", ScalarDirichletBc::constant(POTENTIAL, vec![low], 0.0))?;

    let potential_solver = PotentialSolver::new(h1, Rc::clone(&hcurl), unit_coefficient(), self.options.clone())?;
    potential_solver.solve(&bc_map, POTENTIAL, &mut unit_potential, &mut unit_source)?;

    let projector = HelmholtzProjector::new(hcurl, self.options.clone())?;
    let fixed = bc_map.essential_dofs(POTENTIAL, &unit_potential);
    projector.project(&mut unit_source, &fixed)?;

    let raw_flux = unit_source.boundary_flux(&[self.ref_face]);
    if !raw_flux.is_finite() || raw_flux.abs() <= f64::MIN_POSITIVE {
      return Err(Error::degenerate(
        format!("coil on domains {:?}", self.coil_domains),
        format!("flux {raw_flux:e} through reference face {}", self.ref_face),
      ));
    }
    unit_source.scale(1.0 / raw_flux.abs());
    unit_potential.scale(1.0 / raw_flux.abs());
    tracing::debug!(
      "open coil on domains {:?}: raw flux {raw_flux:.6e} through face {}",
      self.coil_domains,
      self.ref_face
    );

    let sample_cell = submesh.parent_cells()[0];
    let sample = EvalPoint::new(
      parent_mesh.cell_geometry(sample_cell).centroid(),
      parent_mesh.attribute(sample_cell),
    );
    let mass = hcurl_mass(&parent_space, unit_coefficient()).to_nalgebra_csr()?;

    self.state = Some(OpenCoilState {
      current,
      sample,
      parent_source,
      parent_potential,
      submesh,
      unit_source,
      unit_potential,
      raw_flux,
      mass,
    });
    Ok(())
  }

  /// Current $I(t)$ of the coil; constant in space.
  pub fn current(&self) -> Result<f64> {
    let state = self.state()?;
    Ok(state.current.eval(&state.sample))
  }

  /// Writes the unit field scaled by `current` into the parent fields.
  pub fn transfer_current(&self, current: f64) -> Result<()> {
    let state = self.state()?;
    state
      .submesh
      .transfer_scaled(&state.unit_source, current, &mut state.parent_source.borrow_mut())?;
    if let Some(potential) = &state.parent_potential {
      state
        .submesh
        .transfer_scaled(&state.unit_potential, current, &mut potential.borrow_mut())?;
    }
    Ok(())
  }

  /// Dual $M bold(J)$ of the parent source field.
  pub(crate) fn parent_dual(&self) -> Result<na::DVector<f64>> {
    let state = self.state()?;
    Ok(spmv(&state.mass, state.parent_source.borrow().data()))
  }
}

impl Source for OpenCoilSource {
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    const REQUESTER: &str = "OpenCoilSource";
    let current = bindings
      .coefficients
      .scalars
      .require(&self.current_name, REQUESTER)?;
    let parent_source = bindings.gridfunctions.require(&self.source_name, REQUESTER)?;
    let parent_potential = match &self.potential_name {
      Some(name) => {
        let potential = bindings.gridfunctions.get(name);
        if potential.is_none() {
          tracing::warn!("{name} not found in grid functions; open coil potential is not transferred");
        }
        potential
      }
      None => None,
    };
    self.setup(current, parent_source, parent_potential)
  }

  fn apply(&self, lf: &mut LinearForm) -> Result<()> {
    self.transfer_current(self.current()?)?;
    lf.add(1.0, &self.parent_dual()?)
  }
}
