//! Domain types
//!
//! Entities exchanged with the generation backend. The step catalog lives in
//! [`step`]; everything else mirrors a backend resource.

pub mod manual;
pub mod profile;
pub mod qa;
pub mod step;
pub mod track;
