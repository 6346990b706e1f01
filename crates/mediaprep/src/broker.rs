//! The broker: the only component that touches the job store.
//!
//! It serves two independent channels — a request/response channel where
//! idle workers ask for work, and a push channel where workers submit
//! finished results. The asymmetry is deliberate: a worker can submit a
//! result without depending on the liveness of the next work request,
//! and slow result application never blocks work distribution.

use std::time::Duration;

use crossbeam_channel::{never, select, Receiver, Sender};
use log::{debug, error, warn};

use crate::apply::ResultApplier;
use crate::db::{job_repo, media_repo, Database};
use crate::protocol::{self, ResultPayload, WorkAssignment, WorkReply};

/// A worker's "give me work" request; the encoded reply goes back on the
/// embedded sender.
pub struct WorkRequest {
    pub reply: Sender<Vec<u8>>,
}

/// Transient store errors are retried this many times with doubling
/// backoff before the broker gives up on the operation.
const DEQUEUE_ATTEMPTS: u32 = 3;
const APPLY_ATTEMPTS: u32 = 5;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

pub struct Broker {
    db: Database,
    applier: ResultApplier,
    requests: Receiver<WorkRequest>,
    results: Receiver<Vec<u8>>,
}

impl Broker {
    pub fn new(
        db: Database,
        applier: ResultApplier,
        requests: Receiver<WorkRequest>,
        results: Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            db,
            applier,
            requests,
            results,
        }
    }

    /// Serves both channels until every sender is gone. Runs on its own
    /// thread for the life of the pipeline.
    pub fn run(self) {
        debug!("Broker started");

        // A closed channel is swapped for `never()` so the select stops
        // spinning on it while the other side drains.
        let never_requests: Receiver<WorkRequest> = never();
        let never_results: Receiver<Vec<u8>> = never();
        let mut requests_open = true;
        let mut results_open = true;

        while requests_open || results_open {
            let requests = if requests_open { &self.requests } else { &never_requests };
            let results = if results_open { &self.results } else { &never_results };

            select! {
                recv(requests) -> msg => match msg {
                    Ok(request) => self.handle_request(request),
                    Err(_) => requests_open = false,
                },
                recv(results) -> msg => match msg {
                    Ok(bytes) => self.handle_result(&bytes),
                    Err(_) => results_open = false,
                },
            }
        }

        debug!("Broker stopped");
    }

    fn handle_request(&self, request: WorkRequest) {
        let reply = self.next_work();
        match protocol::encode(&reply) {
            Ok(bytes) => {
                // A worker that died between request and reply is its
                // own problem; the job stays claimed until requeued.
                let _ = request.reply.send(bytes);
            }
            Err(e) => error!("Failed to encode work reply: {}", e),
        }
    }

    /// Dequeues one job and resolves its descriptor, retrying transient
    /// store errors with backoff. Persistent store failure becomes
    /// `Fatal` — the one reply that stops a worker.
    fn next_work(&self) -> WorkReply {
        for attempt in 0..DEQUEUE_ATTEMPTS {
            if attempt > 0 {
                std::thread::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1));
            }

            let job = match job_repo::dequeue_one(&self.db) {
                Ok(None) => return WorkReply::NoWork,
                Ok(Some(job)) => job,
                Err(e) => {
                    warn!("Dequeue failed (attempt {}): {}", attempt + 1, e);
                    continue;
                }
            };

            match media_repo::find_descriptor(&self.db, job.media_id) {
                Ok(Some(descriptor)) => {
                    debug!("Dispatching job {} for media {}", job.id, job.media_id);
                    return WorkReply::Job(WorkAssignment {
                        job_id: job.id,
                        media_id: job.media_id,
                        descriptor,
                    });
                }
                Ok(None) => {
                    // A dangling job would loop forever if requeued, so
                    // it ends errored; the requester just waits for the
                    // next eligible job.
                    warn!(
                        "Job {} references missing media {}; marking it errored",
                        job.id, job.media_id
                    );
                    if let Err(e) = job_repo::apply_result(
                        &self.db,
                        job.id,
                        false,
                        "media record missing",
                        job.media_id,
                        None,
                    ) {
                        error!("Failed to error out dangling job {}: {}", job.id, e);
                    }
                    return WorkReply::NoWork;
                }
                Err(e) => {
                    warn!(
                        "Descriptor lookup failed for job {} (attempt {}): {}",
                        job.id,
                        attempt + 1,
                        e
                    );
                    continue;
                }
            }
        }

        error!("Store unavailable after {} attempts; replying fatal", DEQUEUE_ATTEMPTS);
        WorkReply::Fatal
    }

    /// Decodes and applies one submitted result. Malformed payloads are
    /// logged and discarded; store errors are retried with backoff and,
    /// if they persist, logged loudly — the job stays in flight for an
    /// operator requeue rather than being silently dropped.
    fn handle_result(&self, bytes: &[u8]) {
        let payload: ResultPayload = match protocol::decode(bytes) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Discarding malformed result payload: {}", e);
                return;
            }
        };

        for attempt in 0..APPLY_ATTEMPTS {
            if attempt > 0 {
                std::thread::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1));
            }
            match self.applier.apply(&payload) {
                Ok(()) => {
                    debug!(
                        "Applied result for job {} (success: {})",
                        payload.job_id, payload.success
                    );
                    return;
                }
                Err(e) => warn!(
                    "Applying result for job {} failed (attempt {}): {}",
                    payload.job_id,
                    attempt + 1,
                    e
                ),
            }
        }
        error!(
            "Giving up on result for job {} after {} attempts; requeue it to recover",
            payload.job_id, APPLY_ATTEMPTS
        );
    }
}
