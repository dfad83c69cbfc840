mod cache;
mod duty;
mod error;
mod interval;
mod mutations;
mod queries;
mod reports;

pub use cache::ReportCache;
pub use duty::DutyRoster;
pub use error::{EngineError, ErrorKind};
pub use interval::{IndexEntry, IntervalIndex};
pub use reports::{RoomSnapshot, free_rooms_summary, quarter_bounds, quarterly_report};

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, RwLockReadGuard, mpsc, oneshot};
use tracing::warn;

use crate::model::*;
use crate::observability;
use crate::wal::Wal;

/// A room and the interval index of the stays that reference it.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    pub index: IntervalIndex,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self { room, index: IntervalIndex::new() }
    }
}

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Longest single wait for a lock before a retry.
    pub lock_timeout: Duration,
    /// Retries after the first timed-out attempt before `Contention`.
    pub lock_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(250),
            lock_retries: 3,
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append_buffered(&event).and_then(|()| wal.flush_sync());
            let _ = response.send(result);
        }
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct Engine {
    pub(super) rooms: DashMap<RoomId, SharedRoomState>,
    pub(super) room_numbers: DashMap<u32, RoomId>,
    /// Stays arena. Entries change only under the owning room's write lock.
    pub(super) stays: DashMap<StayId, Stay>,
    pub(super) stays_by_client: DashMap<ClientId, Vec<StayId>>,
    /// Client → active stay. Reserved before the WAL append; see `check_in`.
    pub(super) active_by_client: DashMap<ClientId, StayId>,
    pub(super) clients: DashMap<ClientId, Client>,
    pub(super) passports: DashMap<String, ClientId>,
    pub(super) client_writes: Mutex<()>,
    pub(super) roster: RwLock<DutyRoster>,
    pub(super) cache: ReportCache,
    /// Mutations hold it shared from validation to apply; compaction holds it exclusively.
    pub(super) commit_gate: RwLock<()>,
    pub(super) next_room: AtomicU64,
    pub(super) next_client: AtomicU64,
    pub(super) next_stay: AtomicU64,
    pub(super) next_employee: AtomicU64,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) config: EngineConfig,
}

/// Apply a room-scoped event (no locking; caller holds the room's write lock).
fn apply_to_room(
    rs: &mut RoomState,
    event: &Event,
    stays: &DashMap<StayId, Stay>,
    stays_by_client: &DashMap<ClientId, Vec<StayId>>,
    active_by_client: &DashMap<ClientId, StayId>,
) {
    match event {
        Event::RoomUpdated { floor, daily_rate, phone_number, description, .. } => {
            rs.room.floor = *floor;
            rs.room.daily_rate = *daily_rate;
            rs.room.phone_number = phone_number.clone();
            rs.room.description = description.clone();
        }
        Event::RoomActivity { is_active, .. } => {
            rs.room.is_active = *is_active;
        }
        Event::StayCheckedIn { id, client_id, room_id, check_in, daily_rate } => {
            let stay = Stay {
                id: *id,
                client_id: *client_id,
                room_id: *room_id,
                check_in: *check_in,
                check_out: None,
                status: StayStatus::Active,
                daily_rate: *daily_rate,
                total_cost: rust_decimal::Decimal::ZERO,
            };
            rs.index.insert(*id, stay.occupancy_span());
            stays.insert(*id, stay);
            stays_by_client.entry(*client_id).or_default().push(*id);
            active_by_client.insert(*client_id, *id);
        }
        Event::StayCheckedOut { id, check_out, total_cost, .. } => {
            if let Some(mut stay) = stays.get_mut(id) {
                stay.check_out = Some(*check_out);
                stay.total_cost = *total_cost;
                stay.status = StayStatus::Completed;
                rs.index.close(*id, stay.occupancy_span());
                active_by_client.remove_if(&stay.client_id, |_, active| active == id);
            }
        }
        _ => {}
    }
}

fn apply_to_clients(clients: &DashMap<ClientId, Client>, passports: &DashMap<String, ClientId>, event: &Event) {
    match event {
        Event::ClientRegistered { client } => {
            passports.insert(client.passport_number.clone(), client.id);
            clients.insert(client.id, client.clone());
        }
        Event::ClientUpdated { id, city, phone, email, notes } => {
            if let Some(mut client) = clients.get_mut(id) {
                client.city = city.clone();
                client.phone = phone.clone();
                client.email = email.clone();
                client.notes = notes.clone();
            }
        }
        _ => {}
    }
}

fn apply_to_roster(roster: &mut DutyRoster, event: &Event) {
    match event {
        Event::EmployeeHired { id, last_name, first_name, middle_name, hire_date } => {
            roster.apply_hired(Employee {
                id: *id,
                last_name: last_name.clone(),
                first_name: first_name.clone(),
                middle_name: middle_name.clone(),
                status: EmployeeStatus::Active,
                hire_date: *hire_date,
                termination_date: None,
                assignments: Vec::new(),
            });
        }
        Event::EmployeeFired { id, termination_date } => roster.apply_fired(*id, *termination_date),
        Event::ScheduleReplaced { employee_id, slots } => {
            roster.apply_schedule(*employee_id, slots);
        }
        _ => {}
    }
}

/// Room touched by a room-scoped event.
fn event_room_id(event: &Event) -> Option<RoomId> {
    match event {
        Event::RoomUpdated { id, .. } | Event::RoomActivity { id, .. } => Some(*id),
        Event::StayCheckedIn { room_id, .. } | Event::StayCheckedOut { room_id, .. } => Some(*room_id),
        _ => None,
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, config: EngineConfig) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        // Replay into plain owned state; nothing is shared yet.
        let mut rooms: HashMap<RoomId, RoomState> = HashMap::new();
        let room_numbers = DashMap::new();
        let stays = DashMap::new();
        let stays_by_client = DashMap::new();
        let active_by_client = DashMap::new();
        let clients = DashMap::new();
        let passports = DashMap::new();
        let mut roster = DutyRoster::new();
        let (mut max_room, mut max_client, mut max_stay, mut max_employee) = (0, 0, 0, 0);

        for event in &events {
            match event {
                Event::RoomCreated { room } => {
                    max_room = max_room.max(room.id.0);
                    room_numbers.insert(room.number, room.id);
                    rooms.insert(room.id, RoomState::new(room.clone()));
                }
                Event::ClientRegistered { client } => {
                    max_client = max_client.max(client.id.0);
                    apply_to_clients(&clients, &passports, event);
                }
                Event::ClientUpdated { .. } => apply_to_clients(&clients, &passports, event),
                Event::EmployeeHired { id, .. } => {
                    max_employee = max_employee.max(id.0);
                    apply_to_roster(&mut roster, event);
                }
                Event::EmployeeFired { .. } | Event::ScheduleReplaced { .. } => {
                    apply_to_roster(&mut roster, event)
                }
                other => {
                    if let Event::StayCheckedIn { id, .. } = other {
                        max_stay = max_stay.max(id.0);
                    }
                    if let Some(room_id) = event_room_id(other)
                        && let Some(rs) = rooms.get_mut(&room_id)
                    {
                        apply_to_room(rs, other, &stays, &stays_by_client, &active_by_client);
                    }
                }
            }
        }

        metrics::gauge!(observability::ACTIVE_STAYS).set(active_by_client.len() as f64);
        if !events.is_empty() {
            tracing::info!(
                events = events.len(),
                rooms = rooms.len(),
                clients = clients.len(),
                stays = stays.len(),
                "replayed WAL"
            );
        }

        Ok(Self {
            rooms: rooms
                .into_iter()
                .map(|(id, rs)| (id, Arc::new(RwLock::new(rs))))
                .collect(),
            room_numbers,
            stays,
            stays_by_client,
            active_by_client,
            clients,
            passports,
            client_writes: Mutex::new(()),
            roster: RwLock::new(roster),
            cache: ReportCache::new(),
            commit_gate: RwLock::new(()),
            next_room: AtomicU64::new(max_room + 1),
            next_client: AtomicU64::new(max_client + 1),
            next_stay: AtomicU64::new(max_stay + 1),
            next_employee: AtomicU64::new(max_employee + 1),
            wal_tx,
            config,
        })
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) fn get_room_state(&self, id: RoomId) -> Option<SharedRoomState> {
        self.rooms.get(&id).map(|e| e.value().clone())
    }

    /// WAL-append + apply + cache invalidation for a room-scoped event.
    pub(super) async fn persist_and_apply(&self, rs: &mut RoomState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(rs, event, &self.stays, &self.stays_by_client, &self.active_by_client);
        self.cache.invalidate();
        Ok(())
    }

    pub(super) async fn persist_and_apply_client(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_clients(&self.clients, &self.passports, event);
        Ok(())
    }

    pub(super) async fn persist_and_apply_roster(
        &self,
        roster: &mut DutyRoster,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_roster(roster, event);
        Ok(())
    }

    /// Wait for a lock at most `lock_timeout` per attempt, `1 + lock_retries` attempts.
    pub(super) async fn acquire_bounded<T, F, Fut>(&self, what: &str, mut acquire: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = T>,
    {
        let attempts = self.config.lock_retries + 1;
        for attempt in 1..=attempts {
            match tokio::time::timeout(self.config.lock_timeout, acquire()).await {
                Ok(guard) => return Ok(guard),
                Err(_) => {
                    metrics::counter!(observability::LOCK_CONTENTION_TOTAL).increment(1);
                    warn!(lock = what, attempt, "lock wait timed out");
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(5 * u64::from(attempt))).await;
                    }
                }
            }
        }
        Err(EngineError::Contention(what.to_string()))
    }

    /// Shared side of the commit gate, for every mutation.
    pub(super) async fn enter_commit(&self) -> Result<RwLockReadGuard<'_, ()>, EngineError> {
        self.acquire_bounded("commit gate", || self.commit_gate.read()).await
    }

    pub(super) async fn lock_room_write(&self, id: RoomId) -> Result<OwnedRwLockWriteGuard<RoomState>, EngineError> {
        let rs = self.get_room_state(id).ok_or(EngineError::UnknownRoom(id))?;
        self.acquire_bounded(&format!("room {id}"), || rs.clone().write_owned())
            .await
    }

    pub(super) async fn lock_room_read(&self, id: RoomId) -> Result<OwnedRwLockReadGuard<RoomState>, EngineError> {
        let rs = self.get_room_state(id).ok_or(EngineError::UnknownRoom(id))?;
        self.acquire_bounded(&format!("room {id}"), || rs.clone().read_owned())
            .await
    }

    /// Read-lock every room in ascending id order. Writers hold at most one
    /// room lock, so the ordering cannot deadlock.
    pub(super) async fn lock_all_rooms_read(&self) -> Result<Vec<OwnedRwLockReadGuard<RoomState>>, EngineError> {
        let mut ids: Vec<RoomId> = self.rooms.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.lock_room_read(id).await?);
        }
        Ok(guards)
    }

    /// Consistent copy of every room with its stays.
    pub(super) async fn snapshot_rooms(&self) -> Result<Vec<RoomSnapshot>, EngineError> {
        let guards = self.lock_all_rooms_read().await?;
        Ok(guards
            .iter()
            .map(|g| RoomSnapshot {
                room: g.room.clone(),
                stays: self.stays_of(&g.index),
            })
            .collect())
    }

    pub(super) fn stays_of(&self, index: &IntervalIndex) -> Vec<Stay> {
        index
            .entries()
            .iter()
            .filter_map(|e| self.stays.get(&e.stay).map(|s| s.clone()))
            .collect()
    }

    pub(super) fn next_id(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed)
    }
}
