mod bbox;
mod config;
mod detection_table;

pub use bbox::{BBox, Detection};
pub use config::{PyramidPolicy, TestConfig};
pub use detection_table::DetectionTable;
