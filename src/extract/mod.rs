//! Structural extraction and reassembly for container formats.
//!
//! | Module | Role |
//! |--------|------|
//! | [`package`] | zip container I/O, relationships, span-based XML edits |
//! | [`fragment`] | [`Fragment`], [`Location`] and the [`TranslatableDocument`] contract |
//! | [`spreadsheet`] | `.xlsx` cells, header/footer sections, comments |
//! | [`wordproc`] | `.docx` paragraphs and tables |

pub mod fragment;
pub mod package;
pub mod spreadsheet;
pub mod wordproc;

pub use fragment::{translate_document, Fragment, Location, TranslatableDocument};
pub use package::Package;
pub use spreadsheet::{SpreadsheetCounters, SpreadsheetDocument};
pub use wordproc::WordDocument;
