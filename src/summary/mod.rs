pub mod aggregate;
pub mod measure;
