use chrono::NaiveDate;

use crate::limits::MAX_QUERY_WINDOW_DAYS;
use crate::model::*;

use super::EngineError;

/// One stay's footprint on a room. Active stays have an open-ended span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub stay: StayId,
    pub span: DateSpan,
}

impl IndexEntry {
    pub fn is_active(&self) -> bool {
        self.span.is_open()
    }
}

/// Per-room interval index over the stays arena.
///
/// Entries are kept sorted by `span.start`, so overlap queries binary-search
/// the right bound and only scan candidates that start before the window ends.
/// Derived state: replay re-applies each stay event to it in log order.
#[derive(Debug, Clone, Default)]
pub struct IntervalIndex {
    entries: Vec<IndexEntry>,
}

impl IntervalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, stay: StayId, span: DateSpan) {
        let pos = self.entries.partition_point(|e| e.span.start <= span.start);
        self.entries.insert(pos, IndexEntry { stay, span });
    }

    /// Replace a stay's span. The start date never changes, so order is kept.
    pub fn close(&mut self, stay: StayId, span: DateSpan) -> bool {
        match self.entries.iter_mut().find(|e| e.stay == stay) {
            Some(entry) => {
                debug_assert_eq!(entry.span.start, span.start);
                entry.span = span;
                true
            }
            None => false,
        }
    }

    /// Entries whose span overlaps `query`.
    pub fn overlapping(&self, query: &DateSpan) -> impl Iterator<Item = &IndexEntry> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = match query.end {
            Some(end) => self.entries.partition_point(|e| e.span.start < end),
            None => self.entries.len(),
        };
        let query = *query;
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.span.overlaps(&query))
    }

    /// True iff no active stay overlaps `query`.
    pub fn is_free(&self, query: &DateSpan) -> bool {
        !self.overlapping(query).any(IndexEntry::is_active)
    }

    /// Every stay (active or completed) overlapping `query`.
    pub fn occupants_overlapping(&self, query: &DateSpan) -> Vec<StayId> {
        self.overlapping(query).map(|e| e.stay).collect()
    }

    pub fn active_stays(&self) -> impl Iterator<Item = StayId> + '_ {
        self.entries.iter().filter(|e| e.is_active()).map(|e| e.stay)
    }

    pub fn active_stay(&self) -> Option<StayId> {
        self.active_stays().next()
    }

    pub fn active_count(&self) -> usize {
        self.active_stays().count()
    }
}

/// Reject a booking whose span collides with an active stay in the room.
pub(crate) fn check_room_free(
    room: RoomId,
    index: &IntervalIndex,
    span: &DateSpan,
) -> Result<(), EngineError> {
    match index.overlapping(span).find(|e| e.is_active()) {
        Some(entry) => Err(EngineError::RoomOccupied { room, stay: entry.stay }),
        None => Ok(()),
    }
}

/// Query windows must be non-empty and bounded.
pub(crate) fn validate_window(start: NaiveDate, end: NaiveDate) -> Result<DateSpan, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidDate {
            date: end,
            reason: "window end must be after its start",
        });
    }
    if (end - start).num_days() > MAX_QUERY_WINDOW_DAYS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(DateSpan::new(start, end))
}

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
