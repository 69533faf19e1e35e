use std::sync::Arc;

use crate::backend::MediaSource;
use crate::config::Config;
use crate::jobs::{Dispatcher, JobRegistry, SessionIndex};
use crate::library::MediaLibrary;
use crate::observability::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<JobRegistry>,
    pub sessions: Arc<SessionIndex>,
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        source: Arc<dyn MediaSource>,
        library: Arc<dyn MediaLibrary>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let sessions = Arc::new(SessionIndex::new());
        let metrics = Arc::new(Metrics::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&sessions),
            source,
            library,
            Arc::clone(&metrics),
        ));

        Self {
            config: Arc::new(config),
            registry,
            sessions,
            dispatcher,
            metrics,
        }
    }
}
