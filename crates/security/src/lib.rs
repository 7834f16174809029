//! Security subsystem for the OpenCrank runtime.
//!
//! Two concerns live here:
//! - [`sandbox`] — process-wide filesystem confinement via Landlock,
//!   with a two-phase init/activate lifecycle
//! - [`path`] — path resolution and validation used by the file tools

pub mod path;
pub mod sandbox;

pub use path::{resolve_path, validate_path, PathValidationError};
pub use sandbox::Sandbox;
