use shipwright_core::{format_rfc3339, new_operation_id};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use time::OffsetDateTime;

/// Source of wall-clock time. Injected so tests are deterministic.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    fn now_rfc3339(&self) -> String {
        format_rfc3339(self.now())
    }

    fn unix_millis(&self) -> u64 {
        let ms = self.now().unix_timestamp_nanos() / 1_000_000;
        u64::try_from(ms).unwrap_or(0)
    }
}

/// Milliseconds elapsed since `start`, clamped at zero.
pub fn elapsed_ms(clock: &dyn Clock, start: OffsetDateTime) -> u64 {
    let ms = (clock.now() - start).whole_milliseconds();
    u64::try_from(ms).unwrap_or(0)
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock frozen at a given instant; `advance` moves it forward.
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// 2026-01-01T00:00:00Z
    pub fn at_epoch_2026() -> Self {
        Self::new(OffsetDateTime::from_unix_timestamp(1_767_225_600).unwrap_or(OffsetDateTime::UNIX_EPOCH))
    }

    pub fn advance(&self, by: time::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap()
    }
}

/// Generator for operation identifiers.
pub trait IdGenerator: Send + Sync {
    fn operation_id(&self) -> String;
}

/// `op_<ulid>` identifiers.
pub struct UlidIds;

impl IdGenerator for UlidIds {
    fn operation_id(&self) -> String {
        new_operation_id()
    }
}

/// `op_1`, `op_2`, ... for tests.
pub struct SequentialIds {
    next: AtomicU64,
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl SequentialIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn operation_id(&self) -> String {
        format!("op_{}", self.next.fetch_add(1, Ordering::SeqCst))
    }
}
