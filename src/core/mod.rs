pub mod admission;
pub mod browser;
pub mod error;
pub mod orchestrator;
pub mod readiness;
pub mod registry;
pub mod renderer;
pub mod request;
pub mod session;
