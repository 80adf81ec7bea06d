//! # Signal Propagator
//!
//! TTL-bounded gossip over the peers the transport reports as connected.
//!
//! ## Deduplication
//!
//! Every signal id this node has originated or accepted is remembered in a
//! seen cache together with the time it was first seen. A signal whose id is
//! already cached is dropped silently, so replays and gossip loops cost one
//! map lookup. The cache is swept periodically: expired entries go first,
//! then the oldest entries until it is back under `max_cache_size`.
//!
//! ## Fan-out passes
//!
//! Outgoing signals (local broadcasts and relays alike) are sent in passes.
//! With batching enabled they accumulate in a pending buffer that is flushed
//! on a fixed interval, and each flush is one pass. Without batching every
//! signal is its own pass. A pass costs one token from the rate limiter;
//! when the bucket is empty the whole pass is dropped, never queued.
//!
//! Within a pass all sends run concurrently. A failed send is logged and
//! counted and does not affect the other peers.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::events::{EventBus, MeshEvent};
use crate::transport::PeerTransport;
use crate::types::NodeId;

use super::rate_limit::TokenBucket;
use super::types::{Signal, SignalType};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the gossip layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Hop budget given to locally originated signals.
    pub default_ttl: u32,
    /// Upper bound on remembered signal ids.
    pub max_cache_size: usize,
    /// Age after which a remembered id is forgotten, in milliseconds.
    pub cache_expiry_ms: u64,
    /// Fan-out passes allowed per second (also the burst size).
    pub rate_limit: u32,
    /// Coalesce outgoing signals into periodic passes.
    pub batching: bool,
    /// Flush interval of the pending buffer, in milliseconds.
    pub batch_interval_ms: u64,
    /// Interval of the seen-cache sweep, in milliseconds.
    pub cache_sweep_interval_ms: u64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            default_ttl: crate::config::DEFAULT_SIGNAL_TTL,
            max_cache_size: crate::config::DEFAULT_SEEN_CACHE_SIZE,
            cache_expiry_ms: crate::config::DEFAULT_SEEN_CACHE_EXPIRY_MS,
            rate_limit: crate::config::DEFAULT_RATE_LIMIT,
            batching: true,
            batch_interval_ms: crate::config::DEFAULT_BATCH_INTERVAL_MS,
            cache_sweep_interval_ms: crate::config::DEFAULT_CACHE_SWEEP_INTERVAL_MS,
        }
    }
}

/// Callback invoked for every accepted signal of the type it was
/// registered for. An `Err` (or a panic) is logged and otherwise ignored.
pub type SignalHandler = Arc<dyn Fn(&Signal) -> anyhow::Result<()> + Send + Sync>;

/// Running counters, all monotonically increasing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagatorStats {
    /// Signals originated locally.
    pub broadcasts: u64,
    /// Incoming signals accepted (first sighting).
    pub received: u64,
    /// Incoming signals dropped as already seen.
    pub duplicates: u64,
    /// Accepted signals scheduled for relay.
    pub forwarded: u64,
    /// Fan-out passes that went out.
    pub passes: u64,
    /// Signals dropped because the rate limiter was empty.
    pub rate_limited: u64,
    /// Handler invocations that failed or panicked.
    pub handler_failures: u64,
    /// Individual peer sends that failed.
    pub send_failures: u64,
}

// ---------------------------------------------------------------------------
// Propagator
// ---------------------------------------------------------------------------

/// Gossip engine for one local node.
pub struct SignalPropagator {
    local_id: NodeId,
    config: SignalConfig,
    transport: Arc<dyn PeerTransport>,
    seen: DashMap<String, DateTime<Utc>>,
    /// Seen ids in arrival order; may hold ids already swept from `seen`.
    seen_order: Mutex<VecDeque<String>>,
    handlers: RwLock<HashMap<SignalType, Vec<SignalHandler>>>,
    pending: Mutex<Vec<Signal>>,
    bucket: Mutex<TokenBucket>,
    stats: Mutex<PropagatorStats>,
    events: EventBus,
}

impl SignalPropagator {
    pub fn new(
        local_id: impl Into<NodeId>,
        config: SignalConfig,
        transport: Arc<dyn PeerTransport>,
        events: EventBus,
    ) -> Self {
        let bucket = TokenBucket::new(config.rate_limit);
        Self {
            local_id: local_id.into(),
            config,
            transport,
            seen: DashMap::new(),
            seen_order: Mutex::new(VecDeque::new()),
            handlers: RwLock::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            bucket: Mutex::new(bucket),
            stats: Mutex::new(PropagatorStats::default()),
            events,
        }
    }

    /// Originates a signal and schedules it for propagation.
    ///
    /// `ttl` defaults to the configured `default_ttl`. The returned signal
    /// is already marked as seen, so echoes of it are ignored.
    pub async fn broadcast(
        &self,
        signal_type: SignalType,
        payload: Vec<u8>,
        ttl: Option<u32>,
    ) -> Signal {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let signal = Signal::new(signal_type, self.local_id.clone(), payload, ttl);

        self.mark_seen(&signal.id, signal.timestamp);
        self.stats.lock().broadcasts += 1;
        debug!(signal_id = %signal.id, signal_type = %signal.signal_type, ttl, "broadcasting signal");

        self.schedule(signal.clone()).await;
        signal
    }

    /// Processes a signal delivered by a peer.
    ///
    /// Returns `false` if the signal was a duplicate and was dropped.
    pub async fn handle_incoming(&self, signal: Signal) -> bool {
        if !self.mark_seen(&signal.id, Utc::now()) {
            self.stats.lock().duplicates += 1;
            trace!(signal_id = %signal.id, "dropping duplicate signal");
            return false;
        }
        self.stats.lock().received += 1;

        self.events.emit(MeshEvent::SignalReceived {
            signal_id: signal.id.clone(),
            signal_type: signal.signal_type.clone(),
            origin: signal.origin.clone(),
            ttl: signal.ttl,
        });

        self.dispatch(&signal);

        if let Some(next) = signal.forwarded() {
            self.stats.lock().forwarded += 1;
            self.schedule(next).await;
        } else {
            trace!(signal_id = %signal.id, "hop budget spent, not relaying");
        }

        true
    }

    /// Registers a handler for one signal type.
    pub fn on<F>(&self, signal_type: SignalType, handler: F)
    where
        F: Fn(&Signal) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(signal_type)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Drops every handler registered for `signal_type`.
    pub fn clear_handlers(&self, signal_type: &SignalType) {
        self.handlers.write().remove(signal_type);
    }

    pub fn handler_count(&self, signal_type: &SignalType) -> usize {
        self.handlers.read().get(signal_type).map_or(0, Vec::len)
    }

    /// Sends everything in the pending buffer as one pass.
    pub async fn flush(&self) {
        let batch = std::mem::take(&mut *self.pending.lock());
        if !batch.is_empty() {
            self.propagate(batch).await;
        }
    }

    /// Sweeps the seen cache using the current time.
    pub fn sweep_seen_cache(&self) -> usize {
        self.sweep_seen_cache_at(Utc::now())
    }

    /// Forgets ids older than `cache_expiry_ms` as of `now`, then trims the
    /// cache to `max_cache_size`. Returns how many ids were forgotten.
    pub fn sweep_seen_cache_at(&self, now: DateTime<Utc>) -> usize {
        let expiry = chrono::Duration::milliseconds(self.config.cache_expiry_ms as i64);
        let before = self.seen.len();

        self.seen.retain(|_, seen_at| now - *seen_at <= expiry);
        self.seen_order.lock().retain(|id| self.seen.contains_key(id));
        self.evict_oldest(self.config.max_cache_size);

        let removed = before.saturating_sub(self.seen.len());
        if removed > 0 {
            debug!(removed, remaining = self.seen.len(), "seen cache swept");
        }
        removed
    }

    /// Drives batch flushing and cache sweeping until shutdown.
    ///
    /// Pending signals are flushed one last time before returning.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut flush_tick = tokio::time::interval(std::time::Duration::from_millis(
            self.config.batch_interval_ms.max(1),
        ));
        let mut sweep_tick = tokio::time::interval(std::time::Duration::from_millis(
            self.config.cache_sweep_interval_ms.max(1),
        ));
        flush_tick.tick().await;
        sweep_tick.tick().await;

        info!(local_id = %self.local_id, batching = self.config.batching, "signal propagator starting");
        loop {
            tokio::select! {
                _ = flush_tick.tick(), if self.config.batching => {
                    self.flush().await;
                }
                _ = sweep_tick.tick() => {
                    self.sweep_seen_cache();
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.flush().await;
        info!(local_id = %self.local_id, "signal propagator stopped");
    }

    pub fn stats(&self) -> PropagatorStats {
        *self.stats.lock()
    }

    pub fn is_seen(&self, signal_id: &str) -> bool {
        self.seen.contains_key(signal_id)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Records a first sighting. Returns `false` if the id was already known.
    fn mark_seen(&self, signal_id: &str, at: DateTime<Utc>) -> bool {
        let inserted = match self.seen.entry(signal_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(at);
                true
            }
        };
        if inserted {
            self.seen_order.lock().push_back(signal_id.to_string());
            self.evict_oldest(self.config.max_cache_size);
        }
        inserted
    }

    /// Drops the earliest arrivals until at most `cap` ids remain.
    fn evict_oldest(&self, cap: usize) {
        let mut order = self.seen_order.lock();
        while self.seen.len() > cap {
            let Some(id) = order.pop_front() else {
                break;
            };
            self.seen.remove(&id);
        }
    }

    /// Runs every handler for the signal's type, isolating failures.
    fn dispatch(&self, signal: &Signal) {
        let handlers: Vec<SignalHandler> = self
            .handlers
            .read()
            .get(&signal.signal_type)
            .cloned()
            .unwrap_or_default();

        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(signal))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.stats.lock().handler_failures += 1;
                    warn!(signal_id = %signal.id, signal_type = %signal.signal_type, error = %e, "signal handler failed");
                }
                Err(_) => {
                    self.stats.lock().handler_failures += 1;
                    warn!(signal_id = %signal.id, signal_type = %signal.signal_type, "signal handler panicked");
                }
            }
        }
    }

    async fn schedule(&self, signal: Signal) {
        if self.config.batching {
            self.pending.lock().push(signal);
        } else {
            self.propagate(vec![signal]).await;
        }
    }

    /// One fan-out pass: every signal goes to every connected peer except
    /// its origin and ourselves.
    async fn propagate(&self, signals: Vec<Signal>) {
        let admitted = self.bucket.lock().try_acquire();
        if !admitted {
            self.stats.lock().rate_limited += signals.len() as u64;
            debug!(dropped = signals.len(), "rate limit reached, dropping fan-out pass");
            return;
        }

        let peers = match self.transport.list_peers().await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(error = %e, "could not list peers for fan-out");
                return;
            }
        };
        self.stats.lock().passes += 1;

        for signal in &signals {
            let targets: Vec<&NodeId> = peers
                .iter()
                .filter(|p| **p != signal.origin && **p != self.local_id)
                .collect();

            let results = join_all(
                targets
                    .iter()
                    .map(|peer| self.transport.send_to_peer(peer, signal)),
            )
            .await;

            let mut delivered = 0;
            let mut failures = 0;
            for (peer, result) in targets.iter().zip(results) {
                match result {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        failures += 1;
                        warn!(peer = %peer, signal_id = %signal.id, error = %e, "signal send failed");
                    }
                }
            }
            self.stats.lock().send_failures += failures as u64;

            trace!(signal_id = %signal.id, delivered, failures, "signal propagated");
            self.events.emit(MeshEvent::SignalPropagated {
                signal_id: signal.id.clone(),
                signal_type: signal.signal_type.clone(),
                peers: delivered,
                failures,
            });
        }
    }
}
