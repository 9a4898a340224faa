//! Syntax Registry Module
//!
//! Maps file extensions and MIME types to syntaxes (display name plus the
//! editor-mode identifier used by the front end).
//!
//! ```text
//!   "PY" ──normalize──► "py" ──► Extension ──► Syntax { "Python", "python" }
//!
//!   "text/html" ──► MimeType { syntax: None, integrated: true }  ──► Native
//!   "text/x-rst" ──► MimeType { syntax: Some(id), .. }          ──► Syntax
//! ```
//!
//! Every key is bound to at most one syntax; a second binding to a
//! different syntax fails with `DuplicateKey`.

mod key;
mod registry;

pub use key::{extension_of, normalize_extension, normalize_mime_type};
pub use registry::{RegistrySnapshot, Resolution, SyntaxRegistry};
