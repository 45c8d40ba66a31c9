pub mod acquisition;
pub mod dataset;
pub mod materialize;
pub mod normalize;
pub mod operations;
pub mod partition;

pub use acquisition::{acquire, AcquisitionReport};
pub use dataset::{Dataset, DatasetLayout, DatasetSplit};
pub use materialize::{materialize, MaterializationReport};
pub use normalize::{normalize, NormalizationReport};
pub use partition::{partition, SplitAssignment};
