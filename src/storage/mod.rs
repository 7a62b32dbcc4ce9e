//! File system storage management
//!
//! Directory and file operations backing MKD, RMD, DELE and LIST.

pub mod operations;

pub use operations::{
    delete_file, format_entry, list_directory, make_directory, remove_directory,
    prepare_upload, require_file,
};
