use crate::service::VisitorService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<VisitorService>,
}

impl AppState {
    pub fn new(service: VisitorService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
