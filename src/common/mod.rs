//! Shared utilities across layerbuild modules.

pub mod files;

pub use files::write_file_with_dirs;
