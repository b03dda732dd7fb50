use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const LATENCY_BUCKET_COUNT: usize = 12;
const LATENCY_BUCKETS_MS: [u64; LATENCY_BUCKET_COUNT] =
    [1, 2, 5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];

#[derive(Clone, Debug, Serialize)]
pub struct LatencySnapshot {
    pub buckets_ms: Vec<u64>,
    pub counts: Vec<u64>,
    pub overflow: u64,
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Default)]
struct LatencyMetrics {
    buckets: [AtomicU64; LATENCY_BUCKET_COUNT],
    overflow: AtomicU64,
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyMetrics {
    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);

        match LATENCY_BUCKETS_MS.iter().position(|bucket| ms <= *bucket) {
            Some(idx) => self.buckets[idx].fetch_add(1, Ordering::Relaxed),
            None => self.overflow.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        let avg_ms = if count > 0 {
            total_ms as f64 / count as f64
        } else {
            0.0
        };
        let counts = self
            .buckets
            .iter()
            .map(|bucket| bucket.load(Ordering::Relaxed))
            .collect::<Vec<_>>();

        LatencySnapshot {
            buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            counts,
            overflow: self.overflow.load(Ordering::Relaxed),
            count,
            avg_ms,
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

/// Engine operations timed by the HTTP layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    RegisterUser,
    GetUser,
    DeleteUser,
    Take,
    Fund,
    CreateTournament,
    GetTournament,
    Join,
    Finish,
    DeleteTournament,
}

#[derive(Clone, Debug, Serialize)]
pub struct HttpMetricsSnapshot {
    pub register_user: LatencySnapshot,
    pub get_user: LatencySnapshot,
    pub delete_user: LatencySnapshot,
    pub take: LatencySnapshot,
    pub fund: LatencySnapshot,
    pub create_tournament: LatencySnapshot,
    pub get_tournament: LatencySnapshot,
    pub join: LatencySnapshot,
    pub finish: LatencySnapshot,
    pub delete_tournament: LatencySnapshot,
    pub rejected: u64,
    pub reject_body_limit: u64,
}

#[derive(Default)]
pub struct HttpMetrics {
    register_user: LatencyMetrics,
    get_user: LatencyMetrics,
    delete_user: LatencyMetrics,
    take: LatencyMetrics,
    fund: LatencyMetrics,
    create_tournament: LatencyMetrics,
    get_tournament: LatencyMetrics,
    join: LatencyMetrics,
    finish: LatencyMetrics,
    delete_tournament: LatencyMetrics,
    rejected: AtomicU64,
    reject_body_limit: AtomicU64,
}

impl HttpMetrics {
    pub fn record(&self, operation: Operation, duration: Duration) {
        let metrics = match operation {
            Operation::RegisterUser => &self.register_user,
            Operation::GetUser => &self.get_user,
            Operation::DeleteUser => &self.delete_user,
            Operation::Take => &self.take,
            Operation::Fund => &self.fund,
            Operation::CreateTournament => &self.create_tournament,
            Operation::GetTournament => &self.get_tournament,
            Operation::Join => &self.join,
            Operation::Finish => &self.finish,
            Operation::DeleteTournament => &self.delete_tournament,
        };
        metrics.record(duration);
    }

    /// Count a request the engine turned down.
    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_body_limit(&self) {
        self.reject_body_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HttpMetricsSnapshot {
        HttpMetricsSnapshot {
            register_user: self.register_user.snapshot(),
            get_user: self.get_user.snapshot(),
            delete_user: self.delete_user.snapshot(),
            take: self.take.snapshot(),
            fund: self.fund.snapshot(),
            create_tournament: self.create_tournament.snapshot(),
            get_tournament: self.get_tournament.snapshot(),
            join: self.join.snapshot(),
            finish: self.finish.snapshot(),
            delete_tournament: self.delete_tournament.snapshot(),
            rejected: self.rejected.load(Ordering::Relaxed),
            reject_body_limit: self.reject_body_limit.load(Ordering::Relaxed),
        }
    }
}
