//! Finite element assembly and implicit time stepping for low frequency
//! electromagnetics on tetrahedral meshes, with coil current sources.

extern crate nalgebra as na;
extern crate nalgebra_sparse as nas;

pub mod assemble;
pub mod auxsolvers;
pub mod boundary_conditions;
pub mod coefficients;
pub mod equation_system;
pub mod error;
pub mod executioners;
pub mod fe;
pub mod formulations;
pub mod forms;
pub mod geometry;
pub mod kernels;
pub mod linalg;
pub mod mesh;
pub mod ode;
pub mod operators;
pub mod params;
pub mod problem;
pub mod problem_operators;
pub mod registry;
pub mod sources;

pub use error::{Error, Result};
