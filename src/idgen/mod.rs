//! Monotonic unique-id issuance for assembled records.
//!
//! Snowflake layout: 41-bit millisecond timestamp | 10-bit worker | 12-bit
//! sequence. Ids are unique and strictly increasing for a given worker as
//! long as the wall clock does not move backwards; if it does, issuance
//! fails rather than risking a duplicate.

use chrono::Utc;
use thiserror::Error;

/// Custom epoch (2020-01-01T00:00:00Z), keeps the timestamp bits small.
const TWEPOCH_MS: i64 = 1_577_836_800_000;

const WORKER_ID_BITS: u8 = 10;
const SEQUENCE_BITS: u8 = 12;
const MAX_WORKER_ID: i64 = (1 << WORKER_ID_BITS) - 1;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug, Error, PartialEq)]
pub enum IdSourceError {
    #[error("clock moved backwards: refusing to issue ids for {0} ms")]
    ClockMovedBackwards(i64),
    #[error("worker id {0} out of range (0..={MAX_WORKER_ID})")]
    WorkerIdOutOfRange(i64),
}

/// External id boundary: unique, monotonically non-decreasing issuance.
/// Issuance is an exclusive-access operation; wrap the worker in a mutex
/// before sharing it across threads.
pub trait IdSource {
    fn next_id(&mut self) -> Result<i64, IdSourceError>;
}

// ── Snowflake worker ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct IdWorker {
    worker_id: i64,
    last_timestamp: i64,
    sequence: i64,
}

impl IdWorker {
    pub fn new(worker_id: i64) -> Result<Self, IdSourceError> {
        if !(0..=MAX_WORKER_ID).contains(&worker_id) {
            return Err(IdSourceError::WorkerIdOutOfRange(worker_id));
        }
        Ok(Self {
            worker_id,
            last_timestamp: -1,
            sequence: 0,
        })
    }

    fn current_millis() -> i64 {
        Utc::now().timestamp_millis() - TWEPOCH_MS
    }
}

impl IdSource for IdWorker {
    fn next_id(&mut self) -> Result<i64, IdSourceError> {
        let mut now = Self::current_millis();

        if now < self.last_timestamp {
            return Err(IdSourceError::ClockMovedBackwards(self.last_timestamp - now));
        }

        if now == self.last_timestamp {
            self.sequence = (self.sequence + 1) & SEQUENCE_MASK;
            if self.sequence == 0 {
                // Sequence exhausted within this millisecond; spin to the next.
                while now <= self.last_timestamp {
                    now = Self::current_millis();
                }
            }
        } else {
            self.sequence = 0;
        }

        self.last_timestamp = now;
        Ok((now << (WORKER_ID_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | self.sequence)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_strictly_increasing() {
        let mut worker = IdWorker::new(1).unwrap();
        let mut prev = 0i64;
        for _ in 0..10_000 {
            let id = worker.next_id().unwrap();
            assert!(id > prev);
            prev = id;
        }
    }

    #[test]
    fn worker_id_is_bounded() {
        assert!(IdWorker::new(MAX_WORKER_ID).is_ok());
        assert_eq!(
            IdWorker::new(MAX_WORKER_ID + 1).unwrap_err(),
            IdSourceError::WorkerIdOutOfRange(MAX_WORKER_ID + 1)
        );
        assert!(IdWorker::new(-1).is_err());
    }
}
