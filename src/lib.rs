//! Cocina: recipe resolution and execution for on-demand variable change.
//!
//! A cookbook maps each derivable variable to candidate recipes in priority
//! order. The resolver turns requested outputs into an ordered plan; the
//! executor runs that plan forward (NL), tangent-linear (TL) or adjoint (AD).

pub mod cli;
pub mod core;
pub mod provenance;
pub mod recipes;
