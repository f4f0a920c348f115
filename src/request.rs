//! Block I/O request representation shared by the queue, schedulers, and pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Transfer direction of a request.
///
/// Informational only: the sweep scheduler orders requests by sector and never
/// branches on the direction tag. It is carried for diagnostics and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoDir {
    Read,
    Write,
}

impl fmt::Display for IoDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            IoDir::Read => "R",
            IoDir::Write => "W",
        };
        write!(f, "{tag}")
    }
}

/// A block I/O request travelling through the pipeline.
///
/// The start sector is the sort key the sweep scheduler orders by and is
/// immutable for the lifetime of the request. The transfer length grows when
/// the host's merge pass folds an adjacent request into this one.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: u64,
    pub dir: IoDir,
    sector: u64,
    sectors: u32,
}

impl Request {
    /// Create a request with a process-wide unique id.
    pub fn new(dir: IoDir, sector: u64, sectors: u32) -> Request {
        Request {
            id: REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            dir,
            sector,
            sectors,
        }
    }

    /// Start sector of the transfer (the scheduler's sort key).
    pub fn sector(&self) -> u64 {
        self.sector
    }

    /// Transfer length in sectors.
    pub fn sectors(&self) -> u32 {
        self.sectors
    }

    /// First sector past the end of the transfer.
    ///
    /// A pending request whose start equals another's `end_sector` is a
    /// back-merge candidate.
    pub fn end_sector(&self) -> u64 {
        self.sector + u64::from(self.sectors)
    }

    /// Grow the transfer after absorbing an adjacent request.
    ///
    /// The start sector is untouched, so the scheduler's sort order is
    /// preserved without relinking.
    pub fn extend(&mut self, extra_sectors: u32) {
        self.sectors += extra_sectors;
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}+{}", self.dir, self.sector, self.sectors)
    }
}
