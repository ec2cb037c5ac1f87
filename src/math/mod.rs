//! Mathematical utilities: four-momenta and small dense linear algebra.

pub mod linalg;
pub mod lorentz;

pub use linalg::*;
pub use lorentz::*;
