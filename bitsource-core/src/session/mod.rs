pub mod data_source;
pub(crate) mod feeder;
pub mod registry;
