//! Time source and per-run identifiers.
//!
//! Every processing call captures one [`ProcessingRun`] from an injected
//! [`Clock`], so record ids and document ids are reproducible in tests.

use chrono::{DateTime, Utc};
use std::fmt::Display;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Identity of one workbook processing call.
///
/// `stamp` is second-resolution, so two uploads in the same second share it.
/// The `nonce` keeps their document ids apart. Clones share the flight
/// sequence, so record ids stay unique across every sheet of the run.
#[derive(Debug, Clone)]
pub struct ProcessingRun {
    started_at: DateTime<Utc>,
    nonce: String,
    next_seq: Arc<AtomicUsize>,
}

impl ProcessingRun {
    pub fn start(clock: &dyn Clock) -> Self {
        let nonce = Uuid::new_v4().simple().to_string();
        Self::with_nonce(clock.now(), &nonce[..8])
    }

    pub fn with_nonce(started_at: DateTime<Utc>, nonce: impl Into<String>) -> Self {
        Self {
            started_at,
            nonce: nonce.into(),
            next_seq: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn stamp(&self) -> String {
        self.started_at.format("%Y%m%d%H%M%S").to_string()
    }

    /// Take the next run-wide record sequence number.
    pub fn next_seq(&self) -> usize {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn flight_id(&self, seq: usize) -> String {
        format!("FLIGHT_{}_{}", seq, self.stamp())
    }

    pub fn doc_id(&self, file_type: impl Display, sheet: &str) -> String {
        format!("analysis_{}_{}_{}_{}", file_type, sheet, self.stamp(), self.nonce)
    }
}
