//! The long-lived analysis coordinator.
//!
//! One task owns the result cache and the table of in-flight requests; the
//! rest of the process talks to it through a [`CoordinatorHandle`]. Network
//! calls run in their own tasks and report back over a settlement channel,
//! so requests for different content never wait on each other while two
//! requests for the same content share one call.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, ResultCache};
use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::{Failure, FailureKind};
use crate::protocol::{AnalysisRequest, CoordinatorRequest, CoordinatorResponse, Outcome};

const MAILBOX_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub request_timeout: Duration,
    pub min_text_chars: usize,
    pub max_text_chars: usize,
    pub cache_key_prefix_chars: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(7),
            min_text_chars: 10,
            max_text_chars: 8000,
            cache_key_prefix_chars: 1000,
        }
    }
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            request_timeout: config.request_timeout,
            min_text_chars: config.min_text_chars,
            max_text_chars: config.max_text_chars,
            cache_key_prefix_chars: config.cache_key_prefix_chars,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    /// Verdicts currently cached.
    pub cached: usize,
    /// Keys with a network call in flight.
    pub in_flight: usize,
    /// Network calls started since launch.
    pub network_calls: u64,
    pub cache_hits: u64,
    /// Submissions that joined an existing call instead of starting one.
    pub deduplicated: u64,
}

enum Command {
    Analyze {
        request: AnalysisRequest,
        reply: oneshot::Sender<Outcome>,
    },
    ClearCache {
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<CoordinatorStats>,
    },
}

struct Settled {
    key: CacheKey,
    flight: u64,
    outcome: Outcome,
}

/// One network call and everyone waiting on it.
struct PendingRequest {
    subscribers: Vec<oneshot::Sender<Outcome>>,
}

pub struct Coordinator {
    classifier: Arc<dyn Classifier>,
    settings: CoordinatorSettings,
    cache: ResultCache,
    pending: HashMap<CacheKey, PendingRequest>,
    settled_tx: mpsc::UnboundedSender<Settled>,
    next_flight: u64,
    stats: CoordinatorStats,
}

impl Coordinator {
    /// Starts the coordinator task and returns the only way to reach it.
    pub fn spawn(classifier: Arc<dyn Classifier>, settings: CoordinatorSettings) -> CoordinatorHandle {
        let (command_tx, command_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();

        let coordinator = Self {
            classifier,
            settings,
            cache: ResultCache::new(),
            pending: HashMap::new(),
            settled_tx,
            next_flight: 0,
            stats: CoordinatorStats::default(),
        };

        tokio::spawn(coordinator.run(command_rx, settled_rx));

        CoordinatorHandle { command_tx }
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<Command>,
        mut settled_rx: mpsc::UnboundedReceiver<Settled>,
    ) {
        info!(
            timeout = ?self.settings.request_timeout,
            min_chars = self.settings.min_text_chars,
            "analysis coordinator started"
        );

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(settled) = settled_rx.recv() => self.settle(settled),
            }
        }

        info!(
            abandoned = self.pending.len(),
            "analysis coordinator stopped"
        );
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Analyze { request, reply } => self.analyze(request, reply),
            Command::ClearCache { reply } => {
                let evicted = self.cache.clear();
                info!(evicted, "cache cleared");
                let _ = reply.send(evicted);
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn analyze(&mut self, request: AnalysisRequest, reply: oneshot::Sender<Outcome>) {
        if request.is_too_short(self.settings.min_text_chars) {
            debug!(url = %request.source_url, "rejecting request with too little text");
            let _ = reply.send(Err(Failure::empty_input(self.settings.min_text_chars)));
            return;
        }

        let key = CacheKey::derive(&request, self.settings.cache_key_prefix_chars);

        if let Some(entry) = self.cache.get(&key) {
            debug!(%key, url = %request.source_url, stored_at = %entry.stored_at, "cache hit");
            self.stats.cache_hits += 1;
            let _ = reply.send(Ok(entry.result.clone()));
            return;
        }

        if let Some(pending) = self.pending.get_mut(&key) {
            debug!(%key, waiters = pending.subscribers.len() + 1, "joining in-flight request");
            self.stats.deduplicated += 1;
            pending.subscribers.push(reply);
            return;
        }

        let flight = self.next_flight;
        self.next_flight += 1;
        self.stats.network_calls += 1;

        self.pending.insert(
            key.clone(),
            PendingRequest {
                subscribers: vec![reply],
            },
        );

        info!(%key, flight, url = %request.source_url, "requesting analysis");

        let outbound = request.capped(self.settings.max_text_chars);
        let classifier = Arc::clone(&self.classifier);
        let settled_tx = self.settled_tx.clone();
        let timeout = self.settings.request_timeout;

        tokio::spawn(async move {
            // Elapsing drops the classify future, which abandons the HTTP call.
            let outcome = match tokio::time::timeout(timeout, classifier.classify(&outbound)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Failure::timeout(timeout)),
            };
            let _ = settled_tx.send(Settled {
                key,
                flight,
                outcome,
            });
        });
    }

    fn settle(&mut self, settled: Settled) {
        let Settled {
            key,
            flight,
            outcome,
        } = settled;

        // A key has at most one call in flight and only its settlement
        // removes the record.
        let Some(pending) = self.pending.remove(&key) else {
            return;
        };

        match &outcome {
            Ok(result) => {
                info!(%key, flight, rating = %result.rating, waiters = pending.subscribers.len(), "analysis complete");
                self.cache.store(key, result.clone());
            }
            Err(failure) => {
                warn!(
                    %key,
                    flight,
                    kind = %failure.kind,
                    error = %failure.message,
                    waiters = pending.subscribers.len(),
                    "analysis failed"
                );
            }
        }

        for subscriber in pending.subscribers {
            let _ = subscriber.send(outcome.clone());
        }
    }

    fn snapshot(&self) -> CoordinatorStats {
        CoordinatorStats {
            cached: self.cache.len(),
            in_flight: self.pending.len(),
            ..self.stats.clone()
        }
    }
}

/// Cloneable mailbox address of the coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    command_tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    /// Asks for a verdict on `request`. Resolves exactly once.
    pub async fn submit(&self, request: AnalysisRequest) -> Outcome {
        let (reply, response_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Analyze { request, reply })
            .await
            .map_err(|_| coordinator_gone())?;

        response_rx.await.map_err(|_| coordinator_gone())?
    }

    /// Protocol entry point: routes an inbound message to the matching operation.
    pub async fn dispatch(&self, message: CoordinatorRequest) -> CoordinatorResponse {
        match message {
            CoordinatorRequest::Analyze { text, source_url } => {
                self.submit(AnalysisRequest::new(text, source_url)).await.into()
            }
        }
    }

    /// Evicts every cached verdict. In-flight requests are untouched.
    pub async fn clear_cache(&self) -> Result<usize, Failure> {
        let (reply, response_rx) = oneshot::channel();
        self.command_tx
            .send(Command::ClearCache { reply })
            .await
            .map_err(|_| coordinator_gone())?;
        response_rx.await.map_err(|_| coordinator_gone())
    }

    pub async fn stats(&self) -> Result<CoordinatorStats, Failure> {
        let (reply, response_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Stats { reply })
            .await
            .map_err(|_| coordinator_gone())?;
        response_rx.await.map_err(|_| coordinator_gone())
    }
}

fn coordinator_gone() -> Failure {
    Failure::new(FailureKind::NetworkError, "analysis coordinator is not running")
}
