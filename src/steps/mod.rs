pub mod cache;
pub mod journey;
pub mod payload;
pub mod service;
