//! Triage worker pool.
//!
//! One dispatcher task claims jobs and spawns one task per job:
//! - Concurrency: bounded by a semaphore (`worker.concurrency`)
//! - Start rate: bounded by a token bucket (`worker.rate_limit_*`)
//! - Shutdown: broadcast signal, then a grace period for in-flight jobs

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::processor::TriageProcessor;
use super::rate_limiter::StartLimiter;
use super::types::PoolStatus;
use super::WorkerConfig;
use crate::analysis::Analyzer;
use crate::events::EventBus;
use crate::metrics::STALLED_JOBS_RECOVERED;
use crate::queue::{JobState, TriageJob, TriageQueue};
use crate::ticket::{Ticket, TicketFilter, TicketStatus, TicketStore};

const RECOVERY_PAGE_SIZE: i64 = 500;

/// The triage worker pool - drives queued tickets through analysis.
pub struct TriageWorkerPool {
    config: WorkerConfig,
    tickets: Arc<dyn TicketStore>,
    queue: Arc<TriageQueue>,
    processor: Arc<TriageProcessor>,

    // Runtime state
    running: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    permits: Arc<Semaphore>,
    limiter: Arc<StartLimiter>,
    shutdown_tx: broadcast::Sender<()>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl TriageWorkerPool {
    pub fn new(
        config: WorkerConfig,
        tickets: Arc<dyn TicketStore>,
        queue: Arc<TriageQueue>,
        analyzer: Arc<dyn Analyzer>,
        bus: Arc<EventBus>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let concurrency = config.concurrency.max(1);

        let processor = Arc::new(TriageProcessor::new(
            Arc::clone(&tickets),
            Arc::clone(&queue),
            analyzer,
            bus,
            &config,
        ));
        let limiter = Arc::new(StartLimiter::new(
            config.rate_limit_max,
            Duration::from_millis(config.rate_limit_window_ms),
        ));

        Self {
            config,
            tickets,
            queue,
            processor,
            running: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            permits: Arc::new(Semaphore::new(concurrency)),
            limiter,
            shutdown_tx,
            dispatcher: Mutex::new(None),
        }
    }

    pub fn processor(&self) -> &Arc<TriageProcessor> {
        &self.processor
    }

    /// Recover from a previous crash, then start claiming jobs.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already running");
            return;
        }

        info!(
            concurrency = self.config.concurrency,
            rate_limit_max = self.config.rate_limit_max,
            rate_limit_window_ms = self.config.rate_limit_window_ms,
            "Starting triage worker pool"
        );

        self.recover();

        let handle = self.spawn_dispatch_loop();
        *self.dispatcher.lock().await = Some(handle);

        info!("Triage worker pool started");
    }

    /// Stop claiming jobs and wait up to the grace period for in-flight ones.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker pool not running");
            return;
        }

        info!("Stopping triage worker pool");

        // Signal shutdown to the dispatcher
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatcher task ended abnormally");
            }
        }

        // Every permit back means every job finished.
        let all = self.config.concurrency.max(1) as u32;
        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        match tokio::time::timeout(grace, self.permits.acquire_many(all)).await {
            Ok(Ok(permits)) => drop(permits),
            Ok(Err(_)) => {}
            Err(_) => warn!(
                in_flight = self.in_flight.load(Ordering::SeqCst),
                "Grace period elapsed with jobs still running; they will be recovered on next start"
            ),
        }

        info!("Triage worker pool stopped");
    }

    /// Get current pool status.
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            running: self.running.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            concurrency: self.config.concurrency,
            queue: self.queue.counts().unwrap_or_default(),
        }
    }

    /// Undo the work of a process that died mid-job.
    ///
    /// Active jobs go back to waiting, PROCESSING tickets go back to
    /// PENDING, and any PENDING ticket without an open job gets one. A job
    /// interrupted on its final attempt is failed along with its ticket.
    pub fn recover(&self) {
        match self.queue.recover_stalled() {
            Ok(jobs) if !jobs.is_empty() => {
                STALLED_JOBS_RECOVERED.inc_by(jobs.len() as u64);
                let exhausted: Vec<&TriageJob> = jobs
                    .iter()
                    .filter(|job| job.state == JobState::Failed)
                    .collect();
                for job in &exhausted {
                    self.fail_interrupted(job);
                }
                info!(
                    count = jobs.len(),
                    exhausted = exhausted.len(),
                    "Recovered stalled triage jobs"
                );
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Failed to recover stalled triage jobs"),
        }

        let processing = self.all_with_status(TicketStatus::Processing);
        for ticket in &processing {
            match self.tickets.conditional_update_status(
                &ticket.id,
                TicketStatus::Processing,
                TicketStatus::Pending,
            ) {
                Ok(1) => debug!(ticket_id = %ticket.id, "Rolled back interrupted ticket"),
                Ok(_) => {}
                Err(e) => warn!(ticket_id = %ticket.id, error = %e, "Failed to roll back interrupted ticket"),
            }
        }

        let mut requeued = 0usize;
        for ticket in self.all_with_status(TicketStatus::Pending) {
            match self.queue.has_open_job(&ticket.id) {
                Ok(true) => {}
                Ok(false) => match self.queue.enqueue(&ticket.id) {
                    Ok(_) => requeued += 1,
                    Err(e) => warn!(ticket_id = %ticket.id, error = %e, "Failed to re-enqueue ticket"),
                },
                Err(e) => warn!(ticket_id = %ticket.id, error = %e, "Failed to check open jobs"),
            }
        }

        if !processing.is_empty() || requeued > 0 {
            info!(
                rolled_back = processing.len(),
                requeued, "Recovered tickets from previous run"
            );
        }
    }

    fn fail_interrupted(&self, job: &TriageJob) {
        match self.tickets.conditional_update_status(
            &job.ticket_id,
            TicketStatus::Processing,
            TicketStatus::Failed,
        ) {
            Ok(1) => warn!(
                ticket_id = %job.ticket_id,
                job_id = %job.id,
                attempts = job.attempts_made,
                "Triage failed, interrupted on final attempt"
            ),
            Ok(_) => {}
            Err(e) => error!(ticket_id = %job.ticket_id, error = %e, "Failed to fail interrupted ticket"),
        }
    }

    fn all_with_status(&self, status: TicketStatus) -> Vec<Ticket> {
        let mut tickets = Vec::new();
        let mut offset = 0;
        loop {
            let filter = TicketFilter::new()
                .with_status(status)
                .with_limit(RECOVERY_PAGE_SIZE)
                .with_offset(offset);
            match self.tickets.list(&filter) {
                Ok(page) => {
                    let len = page.len() as i64;
                    tickets.extend(page);
                    if len < RECOVERY_PAGE_SIZE {
                        break;
                    }
                    offset += len;
                }
                Err(e) => {
                    warn!(status = %status, error = %e, "Failed to list tickets for recovery");
                    break;
                }
            }
        }
        tickets
    }

    /// Spawn the dispatcher task.
    fn spawn_dispatch_loop(&self) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let queue = Arc::clone(&self.queue);
        let processor = Arc::clone(&self.processor);
        let permits = Arc::clone(&self.permits);
        let limiter = Arc::clone(&self.limiter);
        let in_flight = Arc::clone(&self.in_flight);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Dispatch loop started");
            loop {
                let permit = tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    permit = Arc::clone(&permits).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = limiter.acquire() => {}
                }

                let job = tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    job = queue.next() => job,
                };

                if !running.load(Ordering::Relaxed) {
                    break;
                }

                let job = match job {
                    Ok(job) => job,
                    Err(e) => {
                        error!(error = %e, "Failed to claim triage job");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };

                debug!(
                    job_id = %job.id,
                    ticket_id = %job.ticket_id,
                    attempt = job.attempts_made,
                    "Dispatching triage job"
                );

                in_flight.fetch_add(1, Ordering::SeqCst);
                let processor = Arc::clone(&processor);
                let in_flight = Arc::clone(&in_flight);
                tokio::spawn(async move {
                    processor.handle(job).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    drop(permit);
                });
            }
            info!("Dispatch loop stopped");
        })
    }
}
