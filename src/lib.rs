pub mod auth;
pub mod github;
pub mod handlers;
pub mod issues;
pub mod middleware;
pub mod models;
pub mod router;
pub mod state;
pub mod store;
pub mod utils;

pub use auth::TokenService;
pub use router::create_app;
pub use state::AppState;
pub use store::ReportStore;
pub use utils::{ApiError, ApiResult, Config};
