use crate::{clock::Clock, workflow::WorkflowRepository};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub workflows: Arc<dyn WorkflowRepository>,
    pub clock: Arc<dyn Clock>,
}
