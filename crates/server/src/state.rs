use std::sync::Arc;
use triage_core::{
    Authenticator, Config, LiveUpdateGateway, SanitizedConfig, TicketService, TicketStore,
    TriageQueue, TriageWorkerPool,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    tickets: Arc<TicketService>,
    queue: Arc<TriageQueue>,
    gateway: Arc<LiveUpdateGateway>,
    worker_pool: Option<Arc<TriageWorkerPool>>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        tickets: Arc<TicketService>,
        queue: Arc<TriageQueue>,
        gateway: Arc<LiveUpdateGateway>,
        worker_pool: Option<Arc<TriageWorkerPool>>,
    ) -> Self {
        Self {
            config,
            authenticator,
            tickets,
            queue,
            gateway,
            worker_pool,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn tickets(&self) -> &TicketService {
        &self.tickets
    }

    pub fn ticket_store(&self) -> &Arc<dyn TicketStore> {
        self.tickets.store()
    }

    pub fn queue(&self) -> &TriageQueue {
        &self.queue
    }

    pub fn gateway(&self) -> &LiveUpdateGateway {
        &self.gateway
    }

    /// Worker pool, if the worker is enabled in this process.
    pub fn worker_pool(&self) -> Option<&TriageWorkerPool> {
        self.worker_pool.as_deref()
    }
}
