//! Navigate module
//!
//! Maps client-supplied paths onto the filesystem while keeping every
//! session confined to the configured root directory.

mod resolver;

pub use resolver::{ResolvedPath, display_path, is_root_marker, parent_of, resolve};
