//! Domain records shared by the pipeline and the repository layer.

pub mod forecast;
pub mod hospital;
pub mod macros;
pub mod snapshot;

pub use forecast::*;
pub use hospital::*;
pub use snapshot::*;
