pub mod filesystem;

pub use filesystem::{ensure_directory, FileStorage};
