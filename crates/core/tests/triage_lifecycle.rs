//! Triage lifecycle integration tests.
//!
//! These tests run tickets through the real worker pool over an on-disk
//! database: pending -> processing -> completed | failed, with live updates.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use triage_core::{
    analysis::{Analyzer, MockAnalyzer},
    events::{EventBus, LiveUpdateGateway, TICKETS_UPDATED_CHANNEL},
    queue::{JobFilter, JobState, JobStore, QueueConfig, SqliteJobStore, TriageQueue},
    testing::{fixtures, FailingJobStore, Script, ScriptedAnalyzer},
    ticket::{
        Category, SqliteTicketStore, SubmitTicket, TicketService, TicketStatus, TicketStore,
        Urgency,
    },
    Identity, TriageWorkerPool, WorkerConfig,
};

/// Test helper wiring every component over one database file.
struct TestHarness {
    tickets: Arc<dyn TicketStore>,
    queue: Arc<TriageQueue>,
    bus: Arc<EventBus>,
    service: TicketService,
    gateway: LiveUpdateGateway,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("triage.db");

        let tickets: Arc<dyn TicketStore> =
            Arc::new(SqliteTicketStore::new(&db_path).expect("Failed to create ticket store"));
        let jobs = Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));
        let queue = Arc::new(TriageQueue::new(
            jobs,
            &QueueConfig {
                backoff_base_ms: 20,
                poll_interval_ms: 20,
                ..Default::default()
            },
        ));
        let bus = Arc::new(EventBus::new(64));
        let service = TicketService::new(Arc::clone(&tickets), Arc::clone(&queue), Arc::clone(&bus));
        let gateway = LiveUpdateGateway::new(Arc::clone(&bus), 16);

        Self {
            tickets,
            queue,
            bus,
            service,
            gateway,
            _temp_dir: temp_dir,
        }
    }

    fn pool(&self, analyzer: Arc<dyn Analyzer>, config: WorkerConfig) -> TriageWorkerPool {
        TriageWorkerPool::new(
            config,
            Arc::clone(&self.tickets),
            Arc::clone(&self.queue),
            analyzer,
            Arc::clone(&self.bus),
        )
    }

    fn submit(&self, customer_id: &str, title: &str, description: &str) -> String {
        self.service
            .submit(
                &Identity::customer(customer_id),
                SubmitTicket {
                    title: title.to_string(),
                    description: description.to_string(),
                    customer_id: None,
                },
            )
            .expect("Failed to submit ticket")
            .id
    }

    fn status(&self, ticket_id: &str) -> TicketStatus {
        self.tickets
            .find_by_id(ticket_id)
            .unwrap()
            .expect("ticket exists")
            .status
    }

    async fn wait_for_status(&self, ticket_id: &str, expected: TicketStatus) {
        let result = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if self.status(ticket_id) == expected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(
            result.is_ok(),
            "ticket {} stuck in {} waiting for {}",
            ticket_id,
            self.status(ticket_id),
            expected
        );
    }
}

#[tokio::test]
async fn test_submit_to_completed_publishes_exactly_one_event() {
    let harness = TestHarness::new();
    let mut rx = harness.bus.subscribe(TICKETS_UPDATED_CHANNEL);
    let pool = harness.pool(Arc::new(MockAnalyzer::new()), WorkerConfig::default());
    pool.start().await;

    let id = harness.submit(
        "customer-1",
        "Urgent: bill is wrong",
        "The invoice shows the wrong amount.",
    );
    harness.wait_for_status(&id, TicketStatus::Completed).await;

    let ticket = harness.tickets.find_by_id(&id).unwrap().unwrap();
    assert_eq!(ticket.urgency, Some(Urgency::High));
    assert_eq!(ticket.category, Some(Category::Billing));
    assert_eq!(ticket.sentiment, Some(5));
    assert_eq!(
        ticket.resolution_response.as_deref(),
        Some("Thank you for reaching out regarding \"Urgent: bill is wrong\". We have logged your request.")
    );

    let event = rx.recv().await.unwrap();
    assert_eq!(event.ticket_id, id);
    assert_eq!(event.status, TicketStatus::Completed);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    pool.stop().await;
}

#[tokio::test]
async fn test_always_timeout_fails_after_three_attempts() {
    let harness = TestHarness::new();
    let mut rx = harness.bus.subscribe(TICKETS_UPDATED_CHANNEL);
    let analyzer = Arc::new(ScriptedAnalyzer::always(Script::Hang));
    let config = WorkerConfig {
        analysis_timeout_ms: 50,
        ..Default::default()
    };
    let pool = harness.pool(analyzer.clone(), config);
    pool.start().await;

    let id = harness.submit("customer-1", "Cannot log in", "The login page throws an error.");
    harness.wait_for_status(&id, TicketStatus::Failed).await;

    let jobs = harness
        .queue
        .list(&JobFilter::new().with_ticket(&id))
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].state, JobState::Failed);
    assert_eq!(jobs[0].attempts_made, 3);
    assert_eq!(analyzer.call_count(), 3);

    let ticket = harness.tickets.find_by_id(&id).unwrap().unwrap();
    assert!(ticket.urgency.is_none());
    assert!(ticket.resolution_response.is_none());
    assert!(rx.try_recv().is_err());

    pool.stop().await;
}

#[tokio::test]
async fn test_duplicate_delivery_is_claimed_once() {
    let harness = TestHarness::new();
    let mut rx = harness.bus.subscribe(TICKETS_UPDATED_CHANNEL);
    let analyzer = Arc::new(ScriptedAnalyzer::always(Script::Ok(fixtures::analysis())));
    let config = WorkerConfig {
        processing_delay_ms: 100,
        ..Default::default()
    };

    let id = harness.submit("customer-1", "Double charge", "I was billed twice for May.");
    harness.queue.enqueue(&id).unwrap();
    harness.queue.enqueue(&id).unwrap();

    let pool = harness.pool(analyzer.clone(), config);
    pool.start().await;
    harness.wait_for_status(&id, TicketStatus::Completed).await;

    let all_done = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let counts = harness.queue.counts().unwrap();
            if counts.waiting == 0 && counts.active == 0 {
                return counts;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(all_done.completed, 3);

    assert_eq!(analyzer.call_count(), 1);
    assert_eq!(rx.recv().await.unwrap().status, TicketStatus::Completed);
    assert!(rx.try_recv().is_err());

    pool.stop().await;
}

#[tokio::test]
async fn test_redelivery_after_completion_is_noop() {
    let harness = TestHarness::new();
    let analyzer = Arc::new(ScriptedAnalyzer::always(Script::Ok(fixtures::analysis())));
    let pool = harness.pool(analyzer.clone(), WorkerConfig::default());
    pool.start().await;

    let id = harness.submit("customer-1", "Double charge", "I was billed twice for May.");
    harness.wait_for_status(&id, TicketStatus::Completed).await;
    let before = harness.tickets.find_by_id(&id).unwrap().unwrap();

    let mut rx = harness.bus.subscribe(TICKETS_UPDATED_CHANNEL);
    let job = harness.queue.enqueue(&id).unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.queue.get(&job.id).unwrap().unwrap().state != JobState::Completed {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(analyzer.call_count(), 1);
    assert_eq!(harness.tickets.find_by_id(&id).unwrap().unwrap(), before);
    assert!(rx.try_recv().is_err());

    pool.stop().await;
}

#[tokio::test]
async fn test_cancel_before_processing_drops_job() {
    let harness = TestHarness::new();
    let analyzer = Arc::new(ScriptedAnalyzer::always(Script::Ok(fixtures::analysis())));
    let customer = Identity::customer("customer-1");

    let id = harness.submit("customer-1", "Never mind", "I found the answer myself.");
    let cancelled = harness.service.cancel(&customer, &id).unwrap();
    assert_eq!(cancelled.status, TicketStatus::Cancelled);

    let pool = harness.pool(analyzer.clone(), WorkerConfig::default());
    pool.start().await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.queue.counts().unwrap().completed < 1 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(harness.status(&id), TicketStatus::Cancelled);
    assert_eq!(analyzer.call_count(), 0);

    pool.stop().await;
}

#[tokio::test]
async fn test_cancel_while_processing_is_rejected() {
    let harness = TestHarness::new();
    let config = WorkerConfig {
        processing_delay_ms: 300,
        ..Default::default()
    };
    let pool = harness.pool(Arc::new(MockAnalyzer::new()), config);
    pool.start().await;

    let customer = Identity::customer("customer-1");
    let id = harness.submit("customer-1", "Login bug", "There is a bug on the login page.");
    harness.wait_for_status(&id, TicketStatus::Processing).await;

    let result = harness.service.cancel(&customer, &id);
    assert!(result.is_err());

    harness.wait_for_status(&id, TicketStatus::Completed).await;
    let cancelled = harness.service.cancel(&customer, &id).unwrap();
    assert_eq!(cancelled.status, TicketStatus::Cancelled);

    pool.stop().await;
}

#[tokio::test]
async fn test_live_updates_are_scoped_and_masked() {
    let harness = TestHarness::new();
    let mut agent = harness.gateway.connect(Identity::agent("agent-1"));
    let mut owner = harness.gateway.connect(Identity::customer("customer-1"));
    let mut stranger = harness.gateway.connect(Identity::customer("customer-2"));

    let pool = harness.pool(Arc::new(MockAnalyzer::new()), WorkerConfig::default());
    pool.start().await;

    let id = harness.submit(
        "customer-1",
        "Feature idea",
        "It would be nice to export reports as CSV.",
    );

    let seen_by_agent = tokio::time::timeout(Duration::from_secs(5), agent.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen_by_agent.ticket_id, id);
    assert_eq!(seen_by_agent.status, TicketStatus::Completed);
    assert_eq!(seen_by_agent.urgency, Some(Urgency::Low));
    assert_eq!(seen_by_agent.category, Some(Category::FeatureRequest));

    let seen_by_owner = tokio::time::timeout(Duration::from_secs(5), owner.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen_by_owner.status, TicketStatus::Pending);
    assert!(seen_by_owner.urgency.is_none());
    assert!(seen_by_owner.category.is_none());
    assert!(seen_by_owner.sentiment.is_none());
    assert!(seen_by_owner.resolution_response.is_none());

    let nothing = tokio::time::timeout(Duration::from_millis(200), stranger.recv()).await;
    assert!(nothing.is_err());

    harness
        .service
        .resolve(&Identity::agent("agent-1"), &id)
        .unwrap();
    let resolved = tokio::time::timeout(Duration::from_secs(5), owner.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.status, TicketStatus::Resolved);
    assert!(resolved.resolution_response.is_some());

    pool.stop().await;
    harness.gateway.shutdown();
}

#[tokio::test]
async fn test_restart_resumes_pending_work() {
    let harness = TestHarness::new();
    let id = harness.submit("customer-1", "Error on export", "Export fails with an error.");

    // Claimed by a worker that died before settling.
    let job = harness.queue.next().await.unwrap();
    harness
        .tickets
        .conditional_update_status(&id, TicketStatus::Pending, TicketStatus::Processing)
        .unwrap();
    assert_eq!(job.attempts_made, 1);

    let pool = harness.pool(Arc::new(MockAnalyzer::new()), WorkerConfig::default());
    pool.start().await;
    harness.wait_for_status(&id, TicketStatus::Completed).await;

    let ticket = harness.tickets.find_by_id(&id).unwrap().unwrap();
    assert_eq!(ticket.urgency, Some(Urgency::Medium));
    assert_eq!(ticket.category, Some(Category::FeatureRequest));

    // The attempt lost to the crash still counts against the budget.
    let job = harness.queue.get(&job.id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts_made, 2);

    pool.stop().await;
}

#[tokio::test]
async fn test_failed_enqueue_is_picked_up_on_restart() {
    let temp_dir = TempDir::new().unwrap();
    let tickets: Arc<dyn TicketStore> =
        Arc::new(SqliteTicketStore::new(&temp_dir.path().join("triage.db")).unwrap());
    let jobs = Arc::new(FailingJobStore::new());
    let queue = Arc::new(TriageQueue::new(
        Arc::clone(&jobs) as Arc<dyn JobStore>,
        &QueueConfig {
            poll_interval_ms: 20,
            ..Default::default()
        },
    ));
    let bus = Arc::new(EventBus::new(16));
    let service = TicketService::new(Arc::clone(&tickets), Arc::clone(&queue), Arc::clone(&bus));

    jobs.set_fail_inserts(true);
    let ticket = service
        .submit(
            &Identity::customer("customer-1"),
            SubmitTicket {
                title: "Billing error".to_string(),
                description: "I was billed twice and got an error page.".to_string(),
                customer_id: None,
            },
        )
        .expect("submission succeeds even though the job was not queued");
    assert_eq!(ticket.status, TicketStatus::Pending);
    assert!(!queue.has_open_job(&ticket.id).unwrap());

    jobs.set_fail_inserts(false);
    let pool = TriageWorkerPool::new(
        WorkerConfig::default(),
        Arc::clone(&tickets),
        Arc::clone(&queue),
        Arc::new(MockAnalyzer::new()),
        Arc::clone(&bus),
    );
    pool.start().await;

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let current = tickets.find_by_id(&ticket.id).unwrap().unwrap();
            if current.status == TicketStatus::Completed {
                return current;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("ticket was never triaged");
    assert_eq!(completed.category, Some(Category::Billing));

    let jobs = queue
        .list(&JobFilter::new().with_ticket(&ticket.id))
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].state, JobState::Completed);

    pool.stop().await;
}
