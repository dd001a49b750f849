use std::sync::Arc;

use crate::modules::job::service::JobController;

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobController>,
}

impl AppState {
    pub fn new(jobs: Arc<JobController>) -> Self {
        Self { jobs }
    }
}
