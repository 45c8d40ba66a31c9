#[allow(clippy::module_inception)]
mod dataset;

pub use dataset::{Dataset, DatasetLayout, DatasetSplit};
