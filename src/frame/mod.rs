pub mod crs;
pub mod transform;
