pub mod report_models;
pub mod signal_models;
pub mod timestamp;

pub use report_models::*;
pub use signal_models::*;
