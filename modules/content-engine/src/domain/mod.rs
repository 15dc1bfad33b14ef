pub mod context;
pub mod error;
pub mod hooks;
pub mod migration;
pub mod resources;
