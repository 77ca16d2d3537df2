pub mod annotator;
pub mod reference;
pub mod transform;
pub mod types;
