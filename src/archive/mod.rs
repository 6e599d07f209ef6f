//! Post-processing for container outputs: reconciliation against the
//! original container, then validation of the result.

pub mod reconcile;
pub mod runs;
pub mod validate;

pub use reconcile::{reconcile, ReconcileReport};
pub use runs::{RegexRunScanner, TextRun, TextRunScanner};
pub use validate::{validate, ValidationReport};
