//! Dataset building: feature assembly from sensor readings.
//!
//! [`table`] holds the in-memory columnar representation and parquet
//! persistence, [`assembler`] the feature/target assembly algorithm, and
//! [`builder`] the job wrapper that owns the DataFrame status contract.

pub mod assembler;
pub mod builder;
pub mod table;

pub use assembler::Assembler;
pub use builder::DatasetBuilder;
pub use table::{FeatureTable, StackedTable};
