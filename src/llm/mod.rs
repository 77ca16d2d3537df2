pub mod normalize;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod types;
