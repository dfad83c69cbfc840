use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::limits::{MAX_YEAR, MIN_YEAR};
use crate::model::*;

use super::EngineError;

/// A room and the stays recorded against it, read under the room's lock.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room: Room,
    pub stays: Vec<Stay>,
}

impl RoomSnapshot {
    pub fn active_count(&self) -> usize {
        self.stays.iter().filter(|s| s.is_active()).count()
    }
}

/// Calendar quarter as `(start, next_quarter_start)`.
pub fn quarter_bounds(quarter: u8, year: i32) -> Result<(NaiveDate, NaiveDate), EngineError> {
    if !(1..=4).contains(&quarter) {
        return Err(EngineError::Validation(format!("quarter must be 1..=4, got {quarter}")));
    }
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(EngineError::Validation(format!(
            "year must be {MIN_YEAR}..={MAX_YEAR}, got {year}"
        )));
    }
    let start_month = u32::from(quarter - 1) * 3 + 1;
    let start = NaiveDate::from_ymd_opt(year, start_month, 1);
    let end = if quarter == 4 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, start_month + 3, 1)
    };
    match (start, end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(EngineError::Validation(format!("no such quarter: Q{quarter} {year}"))),
    }
}

/// Free active rooms, counted per type. A room is free iff it has no active stay.
pub fn free_rooms_summary(rooms: &[RoomSnapshot]) -> FreeRoomsSummary {
    let mut counts = [0usize; 3];
    for snap in rooms.iter().filter(|s| s.room.is_active) {
        if snap.active_count() == 0 {
            let slot = RoomType::ALL
                .iter()
                .position(|t| *t == snap.room.room_type)
                .unwrap_or_default();
            counts[slot] += 1;
        }
    }
    let by_type: Vec<FreeByType> = RoomType::ALL
        .iter()
        .zip(counts)
        .map(|(room_type, count)| FreeByType {
            room_type: *room_type,
            label: room_type.label(),
            count,
        })
        .collect();
    FreeRoomsSummary {
        total_free_rooms: counts.iter().sum(),
        by_type,
    }
}

/// Check-out day inside `[start, next_start)`; the stay's income belongs to that quarter.
fn checked_out_within(stay: &Stay, start: NaiveDate, next_start: NaiveDate) -> bool {
    stay.check_out.is_some_and(|out| out >= start && out < next_start)
}

pub fn quarterly_report(quarter: u8, year: i32, rooms: &[RoomSnapshot]) -> Result<QuarterlyReport, EngineError> {
    let (start, next_start) = quarter_bounds(quarter, year)?;
    let window = DateSpan::new(start, next_start);

    let mut by_number: Vec<&RoomSnapshot> = rooms.iter().collect();
    by_number.sort_by_key(|s| s.room.number);

    let mut clients_per_room = Vec::new();
    let mut income_per_room = Vec::new();
    let mut total_income = Decimal::ZERO;
    let mut floors: BTreeMap<u16, usize> = BTreeMap::new();

    for snap in by_number {
        *floors.entry(snap.room.floor).or_default() += 1;

        let clients: HashSet<ClientId> = snap
            .stays
            .iter()
            .filter(|s| s.occupancy_span().overlaps(&window) || checked_out_within(s, start, next_start))
            .map(|s| s.client_id)
            .collect();
        if !clients.is_empty() {
            clients_per_room.push(RoomClients {
                room_id: snap.room.id,
                room_number: snap.room.number,
                client_count: clients.len(),
            });
        }

        let mut earned = None;
        for stay in &snap.stays {
            if stay.status != StayStatus::Completed {
                continue;
            }
            if checked_out_within(stay, start, next_start) {
                *earned.get_or_insert(Decimal::ZERO) += stay.total_cost;
            }
        }
        if let Some(total) = earned {
            total_income += total;
            income_per_room.push(RoomIncome {
                room_id: snap.room.id,
                room_number: snap.room.number,
                total_income: total,
            });
        }
    }

    Ok(QuarterlyReport {
        period: ReportPeriod {
            quarter,
            year,
            start,
            end: next_start.pred_opt().unwrap_or(next_start),
        },
        clients_per_room,
        rooms_per_floor: floors
            .into_iter()
            .map(|(floor, room_count)| FloorRooms { floor, room_count })
            .collect(),
        income_per_room,
        total_income,
    })
}
