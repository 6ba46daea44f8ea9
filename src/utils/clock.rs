use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of time for upload measurements.
pub trait Clock: Send + Sync {
    /// Monotonic instant.
    fn now(&self) -> Instant;

    /// Wall-clock time as Unix epoch milliseconds.
    fn epoch_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to. Both readings advance together.
pub struct ManualClock {
    origin: Instant,
    epoch_origin_ms: i64,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(epoch_origin_ms: i64) -> Self {
        Self {
            origin: Instant::now(),
            epoch_origin_ms,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset()
    }

    fn epoch_millis(&self) -> i64 {
        self.epoch_origin_ms + self.offset().as_millis() as i64
    }
}

/// Where an upload measurement starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingBasis {
    /// Client reported when it started sending, in epoch milliseconds.
    Client { started_at_ms: i64 },
    /// Server started reading the request.
    Server { started_at: Instant },
}

/// Measures one upload from its chosen start point.
#[derive(Clone)]
pub struct UploadTimer {
    clock: Arc<dyn Clock>,
    basis: TimingBasis,
}

impl UploadTimer {
    /// A client timestamp wins over the server receive instant; with neither,
    /// the measurement starts now.
    pub fn start(
        clock: Arc<dyn Clock>,
        client_started_at_ms: Option<i64>,
        received_at: Option<Instant>,
    ) -> Self {
        let basis = match (client_started_at_ms, received_at) {
            (Some(started_at_ms), _) if started_at_ms > 0 => TimingBasis::Client { started_at_ms },
            (_, Some(started_at)) => TimingBasis::Server { started_at },
            _ => TimingBasis::Server {
                started_at: clock.now(),
            },
        };
        Self { clock, basis }
    }

    pub fn basis(&self) -> TimingBasis {
        self.basis
    }

    /// Never negative, even when the client clock runs ahead of ours.
    pub fn elapsed_ms(&self) -> i64 {
        match self.basis {
            TimingBasis::Client { started_at_ms } => {
                (self.clock.epoch_millis() - started_at_ms).max(0)
            }
            TimingBasis::Server { started_at } => {
                let elapsed = self.clock.now().saturating_duration_since(started_at);
                i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
            }
        }
    }
}
