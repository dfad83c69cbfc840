use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::model::{FreeRoomsSummary, QuarterlyReport};

const MAX_CACHED_REPORTS: usize = 64;

#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    free_rooms: Option<FreeRoomsSummary>,
    reports: HashMap<(u8, i32), QuarterlyReport>,
}

/// Derived aggregates, valid for one mutation generation.
///
/// Writers call `invalidate` before releasing their lock. Readers note the
/// generation before computing and only publish if it is unchanged, so a
/// value computed from pre-mutation state is never stored after the bump.
#[derive(Debug, Default)]
pub struct ReportCache {
    state: Mutex<CacheState>,
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // The guarded state is plain data; a panic mid-update cannot leave it torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.free_rooms = None;
        state.reports.clear();
    }

    pub fn free_rooms(&self) -> Option<FreeRoomsSummary> {
        self.lock().free_rooms.clone()
    }

    pub fn store_free_rooms(&self, generation: u64, summary: FreeRoomsSummary) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.free_rooms = Some(summary);
        true
    }

    pub fn report(&self, quarter: u8, year: i32) -> Option<QuarterlyReport> {
        self.lock().reports.get(&(quarter, year)).cloned()
    }

    pub fn store_report(&self, generation: u64, report: QuarterlyReport) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        if state.reports.len() >= MAX_CACHED_REPORTS {
            state.reports.clear();
        }
        state
            .reports
            .insert((report.period.quarter, report.period.year), report);
        true
    }
}
