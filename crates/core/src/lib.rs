pub mod analysis;
pub mod auth;
pub mod config;
pub mod events;
pub mod metrics;
pub mod queue;
pub mod testing;
pub mod ticket;
pub mod worker;

pub use analysis::{create_analyzer, AiConfig, AiProvider, AnalysisError, Analyzer, TicketAnalysis};
pub use auth::{
    create_authenticator, ApiKeyAuthenticator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator, Role,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use events::{EventBus, LiveSession, LiveUpdateGateway, TriageEvent, TICKETS_UPDATED_CHANNEL};
pub use queue::{JobCounts, JobFilter, JobState, QueueConfig, SqliteJobStore, TriageJob, TriageQueue};
pub use ticket::{
    AgentEdit, Category, SqliteTicketStore, SubmitTicket, Ticket, TicketError, TicketFilter,
    TicketService, TicketStatus, TicketStore, TicketSummary, Urgency,
};
pub use worker::{PoolStatus, TriageWorkerPool, WorkerConfig};
