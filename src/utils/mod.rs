//! Utility functions and types

pub mod atomic;
pub mod data_loader;

pub use atomic::write_atomic;
pub use data_loader::{DataLoader, DataSaver, FileFormat, CLEANED_COLUMNS, RAW_COLUMNS};
