use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::debug;

use crate::limits::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::model::*;
use crate::observability;

use super::interval::validate_window;
use super::reports;
use super::{Engine, EngineError, RoomState};

fn view(rs: &RoomState) -> RoomView {
    RoomView {
        room: rs.room.clone(),
        occupied_places: rs.index.active_count() as u32,
    }
}

fn summary(client: &Client) -> ClientSummary {
    ClientSummary {
        id: client.id,
        full_name: client.full_name(),
        city: client.city.clone(),
    }
}

impl Engine {
    // ── Rooms ────────────────────────────────────────────────

    pub async fn get_room(&self, id: RoomId) -> Result<RoomView, EngineError> {
        let guard = self.lock_room_read(id).await?;
        Ok(view(&guard))
    }

    /// Rooms matching `filter`, ordered by room number.
    pub async fn list_rooms(&self, filter: &RoomFilter) -> Result<Vec<RoomView>, EngineError> {
        let guards = self.lock_all_rooms_read().await?;
        let mut rooms: Vec<RoomView> = guards
            .iter()
            .filter(|g| filter.room_type.is_none_or(|t| g.room.room_type == t))
            .filter(|g| filter.floor.is_none_or(|f| g.room.floor == f))
            .filter(|g| filter.is_active.is_none_or(|a| g.room.is_active == a))
            .map(|g| view(g))
            .collect();
        rooms.sort_by_key(|v| v.room.number);
        Ok(rooms)
    }

    pub fn room_by_number(&self, number: u32) -> Option<RoomId> {
        self.room_numbers.get(&number).map(|id| *id)
    }

    /// Occupancy history of a room within `[start, end)`, with the guest of each stay.
    pub async fn room_stays(&self, room: RoomId, start: NaiveDate, end: NaiveDate) -> Result<Vec<RoomStayView>, EngineError> {
        let window = validate_window(start, end)?;
        let guard = self.lock_room_read(room).await?;
        let views = guard
            .index
            .overlapping(&window)
            .filter_map(|e| self.stays.get(&e.stay).map(|s| s.clone()))
            .filter_map(|stay| {
                let client = self.clients.get(&stay.client_id).map(|c| summary(&c))?;
                Some(RoomStayView { stay, client })
            })
            .collect();
        Ok(views)
    }

    /// True iff no active stay in the room overlaps `[start, end)` (open-ended when `end` is absent).
    pub async fn is_room_free(&self, room: RoomId, start: NaiveDate, end: Option<NaiveDate>) -> Result<bool, EngineError> {
        let span = match end {
            Some(end) => validate_window(start, end)?,
            None => DateSpan::open(start),
        };
        let guard = self.lock_room_read(room).await?;
        Ok(guard.index.is_free(&span))
    }

    /// Every stay, active or completed, whose occupancy overlaps `[start, end)`.
    pub async fn occupants_overlapping(&self, room: RoomId, start: NaiveDate, end: NaiveDate) -> Result<Vec<Stay>, EngineError> {
        let window = validate_window(start, end)?;
        let guard = self.lock_room_read(room).await?;
        Ok(guard
            .index
            .occupants_overlapping(&window)
            .into_iter()
            .filter_map(|id| self.stays.get(&id).map(|s| s.clone()))
            .collect())
    }

    pub async fn active_stay_for(&self, room: RoomId) -> Result<Option<Stay>, EngineError> {
        let guard = self.lock_room_read(room).await?;
        Ok(guard
            .index
            .active_stay()
            .and_then(|id| self.stays.get(&id).map(|s| s.clone())))
    }

    // ── Clients ──────────────────────────────────────────────

    pub fn get_client(&self, id: ClientId) -> Result<Client, EngineError> {
        self.clients
            .get(&id)
            .map(|c| c.clone())
            .ok_or(EngineError::UnknownClient(id))
    }

    /// Clients ordered by id; `city` matches case-insensitively. Unpaged
    /// requests return everything as a single page.
    pub fn list_clients(&self, filter: &ClientFilter) -> Result<Page<Client>, EngineError> {
        let city = filter.city.as_deref().map(str::to_lowercase);
        let mut clients: Vec<Client> = self
            .clients
            .iter()
            .filter(|c| city.as_deref().is_none_or(|city| c.city.to_lowercase() == city))
            .map(|c| c.value().clone())
            .collect();
        clients.sort_by_key(|c| c.id);
        let total = clients.len();

        if filter.page.is_none() && filter.page_size.is_none() {
            return Ok(Page { total, page: 1, page_size: total, items: clients });
        }
        let page = filter.page.unwrap_or(1);
        let page_size = filter.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page == 0 {
            return Err(EngineError::Validation("page numbers start at 1".into()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(EngineError::Validation(format!("page_size must be 1..={MAX_PAGE_SIZE}")));
        }
        let items = clients
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();
        Ok(Page { total, page, page_size, items })
    }

    pub fn count_clients_by_city(&self, city: &str) -> usize {
        let city = city.trim().to_lowercase();
        self.clients
            .iter()
            .filter(|c| c.city.to_lowercase() == city)
            .count()
    }

    /// Every stay of the client, ordered by check-in date.
    pub fn client_stays(&self, client: ClientId) -> Result<Vec<Stay>, EngineError> {
        if !self.clients.contains_key(&client) {
            return Err(EngineError::UnknownClient(client));
        }
        let ids = self
            .stays_by_client
            .get(&client)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        let mut stays: Vec<Stay> = ids
            .iter()
            .filter_map(|id| self.stays.get(id).map(|s| s.clone()))
            .collect();
        stays.sort_by_key(|s| (s.check_in, s.id));
        Ok(stays)
    }

    /// Other clients whose stays, in any room, overlapped this client's stays
    /// within `[start, end)`. Ordered by (last name, first name, id).
    pub async fn overlapping_clients(&self, client: ClientId, start: NaiveDate, end: NaiveDate) -> Result<Vec<Client>, EngineError> {
        let window = validate_window(start, end)?;
        if !self.clients.contains_key(&client) {
            return Err(EngineError::UnknownClient(client));
        }
        let rooms = self.lock_all_rooms_read().await?;

        let own: Vec<DateSpan> = rooms
            .iter()
            .flat_map(|rs| rs.index.entries().iter())
            .filter(|e| self.stays.get(&e.stay).is_some_and(|s| s.client_id == client))
            .filter_map(|e| e.span.clip(&window))
            .collect();

        let mut others = HashSet::new();
        for span in &own {
            for rs in &rooms {
                for entry in rs.index.overlapping(span) {
                    if let Some(stay) = self.stays.get(&entry.stay)
                        && stay.client_id != client
                    {
                        others.insert(stay.client_id);
                    }
                }
            }
        }
        drop(rooms);

        let mut clients: Vec<Client> = others
            .into_iter()
            .filter_map(|id| self.clients.get(&id).map(|c| c.clone()))
            .collect();
        clients.sort_by(|a, b| {
            (a.last_name.as_str(), a.first_name.as_str(), a.id).cmp(&(b.last_name.as_str(), b.first_name.as_str(), b.id))
        });
        debug!(client = %client, windows = own.len(), found = clients.len(), "co-residents");
        Ok(clients)
    }

    // ── Stays ────────────────────────────────────────────────

    pub fn get_stay(&self, id: StayId) -> Result<Stay, EngineError> {
        self.stays
            .get(&id)
            .map(|s| s.clone())
            .ok_or(EngineError::StayNotFound(id))
    }

    /// Stays matching `filter`, ordered by id.
    pub fn list_stays(&self, filter: &StayFilter) -> Vec<Stay> {
        let by_number = match filter.room_number {
            Some(number) => match self.room_by_number(number) {
                Some(id) => Some(id),
                None => return Vec::new(),
            },
            None => None,
        };
        let mut stays: Vec<Stay> = self
            .stays
            .iter()
            .filter(|s| filter.status.is_none_or(|st| s.status == st))
            .filter(|s| filter.client_id.is_none_or(|c| s.client_id == c))
            .filter(|s| filter.room_id.is_none_or(|r| s.room_id == r))
            .filter(|s| by_number.is_none_or(|r| s.room_id == r))
            .map(|s| s.value().clone())
            .collect();
        stays.sort_by_key(|s| s.id);
        stays
    }

    // ── Employees & duty ─────────────────────────────────────

    pub async fn list_employees(&self) -> Result<Vec<Employee>, EngineError> {
        let roster = self.acquire_bounded("roster", || self.roster.read()).await?;
        Ok(roster.employees().cloned().collect())
    }

    pub async fn get_employee(&self, id: EmployeeId) -> Result<Employee, EngineError> {
        let roster = self.acquire_bounded("roster", || self.roster.read()).await?;
        roster.get(id).cloned().ok_or(EngineError::UnknownEmployee(id))
    }

    /// Held duty slots, optionally for one employee, ordered by (floor, weekday).
    pub async fn schedule(&self, employee: Option<EmployeeId>) -> Result<Vec<(DutySlot, EmployeeId)>, EngineError> {
        let roster = self.acquire_bounded("roster", || self.roster.read()).await?;
        if let Some(id) = employee
            && roster.get(id).is_none()
        {
            return Err(EngineError::UnknownEmployee(id));
        }
        Ok(roster
            .assignments()
            .into_iter()
            .filter(|(_, holder)| employee.is_none_or(|id| *holder == id))
            .collect())
    }

    /// Client → active stay. A reserved but not yet committed stay counts as none.
    fn current_stay(&self, client: ClientId) -> Result<Stay, EngineError> {
        if !self.clients.contains_key(&client) {
            return Err(EngineError::UnknownClient(client));
        }
        let stay_id = self
            .active_by_client
            .get(&client)
            .map(|id| *id)
            .ok_or(EngineError::NoActiveStay(client))?;
        self.stays
            .get(&stay_id)
            .map(|s| s.clone())
            .filter(Stay::is_active)
            .ok_or(EngineError::NoActiveStay(client))
    }

    /// Who cleans the client's current room on `weekday`: the active holder of
    /// (floor of the room, weekday), or none if the slot is unassigned.
    pub async fn who_cleans(&self, client: ClientId, weekday: Weekday) -> Result<Option<Employee>, EngineError> {
        let stay = self.current_stay(client)?;
        self.holder_for(stay.room_id, weekday).await
    }

    /// As `who_cleans`, for the weekday of `date`. The stay must have begun by then.
    pub async fn who_cleans_on(&self, client: ClientId, date: NaiveDate) -> Result<Option<Employee>, EngineError> {
        let stay = self.current_stay(client)?;
        if stay.check_in > date {
            return Err(EngineError::NoActiveStay(client));
        }
        self.holder_for(stay.room_id, Weekday::of(date)).await
    }

    async fn holder_for(&self, room: RoomId, weekday: Weekday) -> Result<Option<Employee>, EngineError> {
        let floor = self.lock_room_read(room).await?.room.floor;
        let roster = self.acquire_bounded("roster", || self.roster.read()).await?;
        Ok(roster.holder(DutySlot::new(floor, weekday)).cloned())
    }

    // ── Reports ──────────────────────────────────────────────

    pub async fn free_rooms_summary(&self) -> Result<FreeRoomsSummary, EngineError> {
        if let Some(hit) = self.cache.free_rooms() {
            metrics::counter!(observability::REPORT_CACHE_HITS_TOTAL, "report" => "free_rooms").increment(1);
            return Ok(hit);
        }
        metrics::counter!(observability::REPORT_CACHE_MISSES_TOTAL, "report" => "free_rooms").increment(1);
        let generation = self.cache.generation();
        let rooms = self.snapshot_rooms().await?;
        let summary = reports::free_rooms_summary(&rooms);
        self.cache.store_free_rooms(generation, summary.clone());
        Ok(summary)
    }

    pub async fn quarterly_report(&self, quarter: u8, year: i32) -> Result<QuarterlyReport, EngineError> {
        reports::quarter_bounds(quarter, year)?;
        if let Some(hit) = self.cache.report(quarter, year) {
            metrics::counter!(observability::REPORT_CACHE_HITS_TOTAL, "report" => "quarterly").increment(1);
            return Ok(hit);
        }
        metrics::counter!(observability::REPORT_CACHE_MISSES_TOTAL, "report" => "quarterly").increment(1);
        let generation = self.cache.generation();
        let rooms = self.snapshot_rooms().await?;
        let report = reports::quarterly_report(quarter, year, &rooms)?;
        self.cache.store_report(generation, report.clone());
        debug!(quarter, year, total = %report.total_income, "quarterly report computed");
        Ok(report)
    }
}
