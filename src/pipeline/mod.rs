//! Pipeline stages for page-image documents (PDFs and images), plus input
//! resolution shared by every family.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ vision ──▶ docgen
//! (URL/path) (pdfium)  (base64)   (VLM +     (.docx)
//!                                  residue)
//! ```
//!
//! 1. [`input`]  — canonicalise the user-supplied path or URL and classify it
//! 2. [`render`] — rasterise pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`] — PNG-encode and base64-wrap each page or image file
//! 4. [`vision`] — analyse and translate a page in one round-trip, then fix
//!    whatever the model left untranslated

pub mod encode;
pub mod input;
pub mod render;
pub mod vision;
