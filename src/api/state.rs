use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::media::ToolReport;
use crate::observability::Metrics;
use crate::selection::SelectionCache;
use crate::users::UserDirectory;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub selections: Arc<SelectionCache>,
    pub users: Arc<dyn UserDirectory>,
    pub metrics: Arc<Metrics>,
    pub tools: Arc<ToolReport>,
}

impl AppState {
    pub fn new(
        dispatcher: Dispatcher,
        selections: Arc<SelectionCache>,
        users: Arc<dyn UserDirectory>,
        metrics: Arc<Metrics>,
        tools: ToolReport,
    ) -> Self {
        Self {
            dispatcher,
            selections,
            users,
            metrics,
            tools: Arc::new(tools),
        }
    }
}
