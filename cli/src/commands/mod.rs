pub mod cert;
pub mod delete;
pub mod get;
pub mod healthcheck;
pub mod token;
