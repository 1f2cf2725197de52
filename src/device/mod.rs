//! Camera device selection and format negotiation

pub mod catalog;
pub mod format;

pub use catalog::DeviceCatalog;
pub use format::{apply_format, select_dual, select_single, DualFormatChoice, FormatChoice};
