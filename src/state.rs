use crate::{auth::TokenService, issues::IssueTracker, store::ReportStore, utils::Config};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: ReportStore,
    pub tokens: Arc<TokenService>,
    pub issues: Arc<dyn IssueTracker>,
    pub config: Arc<Config>,
}
