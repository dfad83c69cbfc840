use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use tokio::sync::{RwLock, oneshot};
use tracing::info;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::duty::normalize_slots;
use super::interval::{check_room_free, today};
use super::{Engine, EngineError, RoomState, WalCommand};

fn check_len(value: &str, max: usize, what: &'static str) -> Result<(), EngineError> {
    if value.chars().count() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

/// Trimmed, non-empty and bounded.
fn required(value: &str, max: usize, field: &str, too_long: &'static str) -> Result<String, EngineError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::Validation(format!("{field} is required")));
    }
    check_len(value, max, too_long)?;
    Ok(value.to_string())
}

/// Blank optional text is stored as absent.
fn optional(value: Option<&str>, max: usize, too_long: &'static str) -> Result<Option<String>, EngineError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => {
            check_len(v, max, too_long)?;
            Ok(Some(v.to_string()))
        }
        None => Ok(None),
    }
}

fn check_floor(floor: u16) -> Result<(), EngineError> {
    if floor == 0 || floor > MAX_FLOOR {
        return Err(EngineError::Validation(format!("floor must be 1..={MAX_FLOOR}, got {floor}")));
    }
    Ok(())
}

fn check_date(date: NaiveDate) -> Result<NaiveDate, EngineError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&date.year()) {
        return Err(EngineError::InvalidDate { date, reason: "year out of range" });
    }
    Ok(date)
}

fn check_rate(rate: Decimal) -> Result<(), EngineError> {
    if rate <= Decimal::ZERO {
        return Err(EngineError::Validation(format!("daily rate must be positive, got {rate}")));
    }
    Ok(())
}

impl Engine {
    // ── Rooms ────────────────────────────────────────────────

    pub async fn create_room(&self, new: NewRoom) -> Result<Room, EngineError> {
        if new.number == 0 {
            return Err(EngineError::Validation("room number must be positive".into()));
        }
        check_floor(new.floor)?;
        check_rate(new.daily_rate)?;
        let capacity = new.capacity.unwrap_or_else(|| new.room_type.default_capacity());
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(EngineError::Validation(format!("capacity must be 1..={MAX_CAPACITY}")));
        }
        check_len(&new.phone_number, MAX_PHONE_NUMBER_LEN, "phone number too long")?;
        check_len(&new.description, MAX_DESCRIPTION_LEN, "description too long")?;
        if self.rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        let _gate = self.enter_commit().await?;
        let id = RoomId(Self::next_id(&self.next_room));
        match self.room_numbers.entry(new.number) {
            Entry::Occupied(_) => return Err(EngineError::DuplicateRoomNumber(new.number)),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let room = Room {
            id,
            number: new.number,
            floor: new.floor,
            room_type: new.room_type,
            capacity,
            daily_rate: new.daily_rate,
            phone_number: new.phone_number.trim().to_string(),
            description: new.description.trim().to_string(),
            is_active: true,
        };
        let event = Event::RoomCreated { room: room.clone() };
        if let Err(e) = self.wal_append(&event).await {
            self.room_numbers.remove_if(&new.number, |_, owner| *owner == id);
            return Err(e);
        }
        self.rooms.insert(id, Arc::new(RwLock::new(RoomState::new(room.clone()))));
        self.cache.invalidate();
        info!(room = %id, number = room.number, floor = room.floor, "room created");
        Ok(room)
    }

    pub async fn update_room(&self, id: RoomId, patch: RoomPatch) -> Result<Room, EngineError> {
        let _gate = self.enter_commit().await?;
        let mut guard = self.lock_room_write(id).await?;

        let current = &guard.room;
        let floor = patch.floor.unwrap_or(current.floor);
        if floor != current.floor {
            check_floor(floor)?;
            if !guard.index.is_empty() {
                return Err(EngineError::RoomInUse {
                    room: id,
                    reason: "floor cannot change once stays reference the room",
                });
            }
        }
        let daily_rate = patch.daily_rate.unwrap_or(current.daily_rate);
        check_rate(daily_rate)?;
        let phone_number = patch
            .phone_number
            .map(|p| p.trim().to_string())
            .unwrap_or_else(|| current.phone_number.clone());
        check_len(&phone_number, MAX_PHONE_NUMBER_LEN, "phone number too long")?;
        let description = patch
            .description
            .map(|d| d.trim().to_string())
            .unwrap_or_else(|| current.description.clone());
        check_len(&description, MAX_DESCRIPTION_LEN, "description too long")?;

        let event = Event::RoomUpdated { id, floor, daily_rate, phone_number, description };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(room = %id, "room updated");
        Ok(guard.room.clone())
    }

    /// Soft (de)activation. Inactive rooms accept no check-ins.
    pub async fn set_room_active(&self, id: RoomId, is_active: bool) -> Result<Room, EngineError> {
        let _gate = self.enter_commit().await?;
        let mut guard = self.lock_room_write(id).await?;
        if guard.room.is_active == is_active {
            return Ok(guard.room.clone());
        }
        if !is_active && guard.index.active_stay().is_some() {
            return Err(EngineError::RoomInUse { room: id, reason: "room has an active stay" });
        }
        let event = Event::RoomActivity { id, is_active };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(room = %id, is_active, "room activity changed");
        Ok(guard.room.clone())
    }

    // ── Clients ──────────────────────────────────────────────

    pub async fn register_client(&self, new: NewClient) -> Result<Client, EngineError> {
        let passport_number = required(&new.passport_number, MAX_PASSPORT_LEN, "passport_number", "passport number too long")?;
        let last_name = required(&new.last_name, MAX_NAME_LEN, "last_name", "name too long")?;
        let first_name = required(&new.first_name, MAX_NAME_LEN, "first_name", "name too long")?;
        let middle_name = optional(new.middle_name.as_deref(), MAX_NAME_LEN, "name too long")?;
        let city = required(&new.city, MAX_CITY_LEN, "city", "city too long")?;
        let phone = optional(new.phone.as_deref(), MAX_CONTACT_LEN, "phone too long")?;
        let email = optional(new.email.as_deref(), MAX_CONTACT_LEN, "email too long")?;
        let notes = optional(new.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;
        if self.clients.len() >= MAX_CLIENTS {
            return Err(EngineError::LimitExceeded("too many clients"));
        }

        let _gate = self.enter_commit().await?;
        let id = ClientId(Self::next_id(&self.next_client));
        match self.passports.entry(passport_number.clone()) {
            Entry::Occupied(owner) => return Err(EngineError::DuplicatePassport(*owner.get())),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let client = Client {
            id,
            passport_number: passport_number.clone(),
            last_name,
            first_name,
            middle_name,
            city,
            phone,
            email,
            notes,
        };
        let event = Event::ClientRegistered { client: client.clone() };
        if let Err(e) = self.persist_and_apply_client(&event).await {
            self.passports.remove_if(&passport_number, |_, owner| *owner == id);
            return Err(e);
        }
        info!(client = %id, "client registered");
        Ok(client)
    }

    /// Update contact fields. The passport number is immutable.
    pub async fn update_client(&self, id: ClientId, patch: ClientPatch) -> Result<Client, EngineError> {
        let _gate = self.enter_commit().await?;
        let _writes = self.acquire_bounded("clients", || self.client_writes.lock()).await?;
        let current = self
            .clients
            .get(&id)
            .map(|c| c.clone())
            .ok_or(EngineError::UnknownClient(id))?;

        let city = match patch.city {
            Some(city) => required(&city, MAX_CITY_LEN, "city", "city too long")?,
            None => current.city.clone(),
        };
        let phone = match patch.phone {
            Some(p) => optional(Some(p.as_str()), MAX_CONTACT_LEN, "phone too long")?,
            None => current.phone.clone(),
        };
        let email = match patch.email {
            Some(e) => optional(Some(e.as_str()), MAX_CONTACT_LEN, "email too long")?,
            None => current.email.clone(),
        };
        let notes = match patch.notes {
            Some(n) => optional(Some(n.as_str()), MAX_NOTES_LEN, "notes too long")?,
            None => current.notes.clone(),
        };

        let event = Event::ClientUpdated { id, city, phone, email, notes };
        self.persist_and_apply_client(&event).await?;
        self.clients
            .get(&id)
            .map(|c| c.clone())
            .ok_or(EngineError::UnknownClient(id))
    }

    // ── Stays ────────────────────────────────────────────────

    /// Open a stay. Holds the room's write lock across check-and-commit, so
    /// two concurrent check-ins into one room cannot both pass the overlap check.
    pub async fn check_in(&self, client_id: ClientId, room_id: RoomId, check_in: NaiveDate) -> Result<Stay, EngineError> {
        check_date(check_in)?;
        if !self.clients.contains_key(&client_id) {
            return Err(EngineError::UnknownClient(client_id));
        }
        let _gate = self.enter_commit().await?;
        let mut guard = self.lock_room_write(room_id).await?;
        if !guard.room.is_active {
            return Err(EngineError::InactiveRoom(room_id));
        }
        check_room_free(room_id, &guard.index, &DateSpan::open(check_in))?;

        let id = StayId(Self::next_id(&self.next_stay));
        // Reserve the client's single active slot; readers that find a stay
        // id missing from the arena treat the client as not staying.
        match self.active_by_client.entry(client_id) {
            Entry::Occupied(existing) => {
                return Err(EngineError::ClientAlreadyStaying { client: client_id, stay: *existing.get() });
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let event = Event::StayCheckedIn {
            id,
            client_id,
            room_id,
            check_in,
            daily_rate: guard.room.daily_rate,
        };
        if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
            self.active_by_client.remove_if(&client_id, |_, stay| *stay == id);
            return Err(e);
        }
        metrics::gauge!(observability::ACTIVE_STAYS).increment(1.0);
        info!(stay = %id, client = %client_id, room = %room_id, %check_in, "checked in");
        self.stays.get(&id).map(|s| s.clone()).ok_or(EngineError::StayNotFound(id))
    }

    /// Close a stay: nights = whole days (minimum one), cost frozen at nights × captured rate.
    pub async fn check_out(&self, stay_id: StayId, check_out: NaiveDate) -> Result<Stay, EngineError> {
        check_date(check_out)?;
        let room_id = self
            .stays
            .get(&stay_id)
            .map(|s| s.room_id)
            .ok_or(EngineError::StayNotFound(stay_id))?;
        let _gate = self.enter_commit().await?;
        let mut guard = self.lock_room_write(room_id).await?;

        let stay = self
            .stays
            .get(&stay_id)
            .map(|s| s.clone())
            .ok_or(EngineError::StayNotFound(stay_id))?;
        if stay.status == StayStatus::Completed {
            return Err(EngineError::AlreadyCompleted(stay_id));
        }
        if check_out < stay.check_in {
            return Err(EngineError::InvalidDate {
                date: check_out,
                reason: "check-out precedes check-in",
            });
        }

        let nights = billable_nights(stay.check_in, check_out);
        let total_cost = stay.daily_rate * Decimal::from(nights);
        let event = Event::StayCheckedOut { id: stay_id, room_id, check_out, total_cost };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::gauge!(observability::ACTIVE_STAYS).decrement(1.0);
        info!(stay = %stay_id, room = %room_id, nights, %total_cost, "checked out");
        self.stays
            .get(&stay_id)
            .map(|s| s.clone())
            .ok_or(EngineError::StayNotFound(stay_id))
    }

    // ── Employees & schedule ─────────────────────────────────

    pub async fn hire_employee(&self, new: NewEmployee) -> Result<Employee, EngineError> {
        let last_name = required(&new.last_name, MAX_NAME_LEN, "last_name", "name too long")?;
        let first_name = required(&new.first_name, MAX_NAME_LEN, "first_name", "name too long")?;
        let middle_name = optional(new.middle_name.as_deref(), MAX_NAME_LEN, "name too long")?;
        let hire_date = check_date(new.hire_date.unwrap_or_else(today))?;

        let _gate = self.enter_commit().await?;
        let mut roster = self.acquire_bounded("roster", || self.roster.write()).await?;
        if roster.len() >= MAX_EMPLOYEES {
            return Err(EngineError::LimitExceeded("too many employees"));
        }
        let id = EmployeeId(Self::next_id(&self.next_employee));
        let event = Event::EmployeeHired { id, last_name, first_name, middle_name, hire_date };
        self.persist_and_apply_roster(&mut roster, &event).await?;
        info!(employee = %id, "employee hired");
        roster.get(id).cloned().ok_or(EngineError::UnknownEmployee(id))
    }

    /// Mark an employee fired and vacate every slot they held.
    pub async fn fire_employee(&self, id: EmployeeId, termination_date: Option<NaiveDate>) -> Result<Employee, EngineError> {
        let termination_date = check_date(termination_date.unwrap_or_else(today))?;
        let _gate = self.enter_commit().await?;
        let mut roster = self.acquire_bounded("roster", || self.roster.write()).await?;
        let vacated = roster.check_fireable(id, termination_date)?.assignments.len();

        let event = Event::EmployeeFired { id, termination_date };
        self.persist_and_apply_roster(&mut roster, &event).await?;
        info!(employee = %id, %termination_date, vacated, "employee fired");
        roster.get(id).cloned().ok_or(EngineError::UnknownEmployee(id))
    }

    /// Replace the employee's whole slot set. Slots held by others move to this employee.
    pub async fn update_schedule(&self, id: EmployeeId, slots: Vec<DutySlot>) -> Result<Employee, EngineError> {
        let slots = normalize_slots(&slots)?;
        let _gate = self.enter_commit().await?;
        let mut roster = self.acquire_bounded("roster", || self.roster.write()).await?;
        roster.check_schedulable(id)?;
        let taken: Vec<(DutySlot, EmployeeId)> = slots
            .iter()
            .filter_map(|slot| roster.holder(*slot).filter(|h| h.id != id).map(|h| (*slot, h.id)))
            .collect();

        let event = Event::ScheduleReplaced { employee_id: id, slots };
        self.persist_and_apply_roster(&mut roster, &event).await?;
        for (slot, previous) in &taken {
            info!(
                floor = slot.floor,
                weekday = slot.weekday.as_str(),
                from = %previous,
                to = %id,
                "duty slot reassigned"
            );
        }
        roster.get(id).cloned().ok_or(EngineError::UnknownEmployee(id))
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL as the minimal event sequence recreating current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Exclusive gate: no mutation is between validation and apply.
        let _gate = self.acquire_bounded("commit gate", || self.commit_gate.write()).await?;
        let mut events = Vec::new();

        let rooms = self.lock_all_rooms_read().await?;
        for rs in &rooms {
            events.push(Event::RoomCreated { room: rs.room.clone() });
        }

        let mut clients: Vec<Client> = self.clients.iter().map(|c| c.value().clone()).collect();
        clients.sort_by_key(|c| c.id);
        events.extend(clients.into_iter().map(|client| Event::ClientRegistered { client }));

        let roster = self.acquire_bounded("roster", || self.roster.read()).await?;
        for employee in roster.employees() {
            events.push(Event::EmployeeHired {
                id: employee.id,
                last_name: employee.last_name.clone(),
                first_name: employee.first_name.clone(),
                middle_name: employee.middle_name.clone(),
                hire_date: employee.hire_date,
            });
            if let Some(termination_date) = employee.termination_date {
                events.push(Event::EmployeeFired { id: employee.id, termination_date });
            }
            if !employee.assignments.is_empty() {
                events.push(Event::ScheduleReplaced {
                    employee_id: employee.id,
                    slots: employee.assignments.clone(),
                });
            }
        }
        drop(roster);

        let mut stays: Vec<Stay> = self.stays.iter().map(|s| s.value().clone()).collect();
        stays.sort_by_key(|s| s.id);
        for stay in stays {
            events.push(Event::StayCheckedIn {
                id: stay.id,
                client_id: stay.client_id,
                room_id: stay.room_id,
                check_in: stay.check_in,
                daily_rate: stay.daily_rate,
            });
            if let Some(check_out) = stay.check_out {
                events.push(Event::StayCheckedOut {
                    id: stay.id,
                    room_id: stay.room_id,
                    check_out,
                    total_cost: stay.total_cost,
                });
            }
        }
        drop(rooms);

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
