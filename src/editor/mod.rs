//! Editor interface: responsibility and boundaries
//!
//! This module and its submodules are responsible ONLY for talking to the editor:
//! listing windows, opening per-window files, reading events and the creation log.
//! It MUST NOT decide what to do with an event. All dispatch decisions are made
//! by the window session service.

pub mod acme;
pub mod dry_run;
mod r#trait;

pub use self::r#trait::{create_editor, CreationLog, Editor, EditorWindow, WindowFile};
