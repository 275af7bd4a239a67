pub mod config;
pub mod directory;
pub mod metadata;
pub mod migrate;
pub mod picks;
pub mod source;
pub mod store;
pub mod week;
