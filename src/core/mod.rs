// Core geospatial validation engine (mandatory)
pub mod dataset_registry;
pub mod geometry;
pub mod spatial_gateway;
pub mod validation_engine;
