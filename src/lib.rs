pub mod archive;
pub mod assemble;
pub mod config;
pub mod fetch;
pub mod observability;
pub mod pipeline;
pub mod runner;
pub mod session;
