use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{AuthSource, DefaultServerParameterProvider, LoginInfo, Password, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo, QueryResponse, Response,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use tokio::net::TcpStream;
use tracing::debug;

use crate::engine::{Engine, EngineError, ErrorKind};
use crate::model::*;
use crate::observability;
use crate::sql::{self, CleaningDay, Command, ReportSection, SqlError};

pub struct HotelHandler {
    engine: Arc<Engine>,
    query_parser: Arc<HotelQueryParser>,
}

impl HotelHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine, query_parser: Arc::new(HotelQueryParser) }
    }

    /// Parse, execute and record metrics for one statement.
    async fn run(&self, query: &str) -> PgWireResult<Response> {
        let cmd = match sql::parse_sql(query) {
            Ok(cmd) => cmd,
            Err(e) => {
                metrics::counter!(observability::QUERIES_TOTAL, "command" => "unparsed", "status" => "error")
                    .increment(1);
                return Err(sql_err(e));
            }
        };
        let label = observability::command_label(&cmd);
        debug!(command = label, "executing");
        let started = Instant::now();
        let result = self.execute_command(cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            // ── Rooms ────────────────────────────────────────────
            Command::InsertRoom(new) => {
                let room = engine.create_room(new).await.map_err(engine_err)?;
                let view = engine.get_room(room.id).await.map_err(engine_err)?;
                room_rows(&[view])
            }
            Command::UpdateRoom { id, patch } => {
                engine.update_room(id, patch).await.map_err(engine_err)?;
                let view = engine.get_room(id).await.map_err(engine_err)?;
                room_rows(&[view])
            }
            Command::SetRoomActive { id, is_active } => {
                engine.set_room_active(id, is_active).await.map_err(engine_err)?;
                let view = engine.get_room(id).await.map_err(engine_err)?;
                room_rows(&[view])
            }
            Command::SelectRooms(filter) => {
                let rooms = engine.list_rooms(&filter).await.map_err(engine_err)?;
                room_rows(&rooms)
            }
            Command::SelectFreeRooms => {
                let summary = engine.free_rooms_summary().await.map_err(engine_err)?;
                encode_rows(free_rooms_schema(), &summary.by_type, |enc, by_type| {
                    enc.encode_field(&by_type.room_type.as_str())?;
                    enc.encode_field(&by_type.label)?;
                    enc.encode_field(&count(by_type.count))?;
                    enc.encode_field(&count(summary.total_free_rooms))
                })
            }
            Command::SelectRoomStays { room_id, start, end } => {
                let stays = engine.room_stays(room_id, start, end).await.map_err(engine_err)?;
                encode_rows(room_stay_schema(), &stays, |enc, view| {
                    encode_stay(enc, &view.stay)?;
                    enc.encode_field(&view.client.full_name)?;
                    enc.encode_field(&view.client.city)
                })
            }

            // ── Clients ──────────────────────────────────────────
            Command::InsertClient(new) => {
                let client = engine.register_client(new).await.map_err(engine_err)?;
                client_rows(&[client])
            }
            Command::UpdateClient { id, patch } => {
                let client = engine.update_client(id, patch).await.map_err(engine_err)?;
                client_rows(&[client])
            }
            Command::SelectClients(filter) => {
                let page = engine.list_clients(&filter).map_err(engine_err)?;
                client_rows(&page.items)
            }
            Command::SelectClientCount { city } => {
                let n = engine.count_clients_by_city(&city);
                encode_rows(client_count_schema(), &[(city, n)], |enc, (city, n)| {
                    enc.encode_field(city)?;
                    enc.encode_field(&count(*n))
                })
            }
            Command::SelectClientStays { client_id } => {
                let stays = engine.client_stays(client_id).map_err(engine_err)?;
                stay_rows(&stays)
            }
            Command::SelectCoResidents { client_id, start, end } => {
                let clients = engine.overlapping_clients(client_id, start, end).await.map_err(engine_err)?;
                client_rows(&clients)
            }

            // ── Stays ────────────────────────────────────────────
            Command::CheckIn { client_id, room_id, check_in } => {
                let stay = engine.check_in(client_id, room_id, check_in).await.map_err(engine_err)?;
                stay_rows(&[stay])
            }
            Command::CheckOut { stay_id, check_out } => {
                let stay = engine.check_out(stay_id, check_out).await.map_err(engine_err)?;
                stay_rows(&[stay])
            }
            Command::SelectStays(filter) => stay_rows(&engine.list_stays(&filter)),

            // ── Staff ────────────────────────────────────────────
            Command::HireEmployee(new) => {
                let employee = engine.hire_employee(new).await.map_err(engine_err)?;
                employee_rows(&[employee])
            }
            Command::FireEmployee { id, termination_date } => {
                let employee = engine.fire_employee(id, termination_date).await.map_err(engine_err)?;
                employee_rows(&[employee])
            }
            Command::SelectEmployees => {
                let employees = engine.list_employees().await.map_err(engine_err)?;
                employee_rows(&employees)
            }
            Command::ReplaceSchedule { employee_id, slots } => {
                let employee = engine.update_schedule(employee_id, slots).await.map_err(engine_err)?;
                let assignments: Vec<_> = employee.assignments.iter().map(|slot| (*slot, employee.id)).collect();
                schedule_rows(&assignments)
            }
            Command::SelectSchedules { employee_id } => {
                let assignments = engine.schedule(employee_id).await.map_err(engine_err)?;
                schedule_rows(&assignments)
            }
            Command::SelectWhoCleans { client_id, day } => {
                let cleaner = match day {
                    CleaningDay::Weekday(weekday) => engine.who_cleans(client_id, weekday).await,
                    CleaningDay::Date(date) => engine.who_cleans_on(client_id, date).await,
                }
                .map_err(engine_err)?;
                employee_rows(cleaner.as_slice())
            }

            // ── Reports ──────────────────────────────────────────
            Command::SelectReport { section, quarter, year } => {
                let report = engine.quarterly_report(quarter, year).await.map_err(engine_err)?;
                match section {
                    ReportSection::Full => {
                        let json = serde_json::to_string(&report).map_err(|e| PgWireError::ApiError(Box::new(e)))?;
                        encode_rows(report_schema(), &[json], |enc, json| enc.encode_field(json))
                    }
                    ReportSection::Income => encode_rows(report_income_schema(), &report.income_per_room, |enc, row| {
                        enc.encode_field(&id(row.room_id.0))?;
                        enc.encode_field(&i64::from(row.room_number))?;
                        enc.encode_field(&row.total_income.to_string())
                    }),
                    ReportSection::Clients => {
                        encode_rows(report_clients_schema(), &report.clients_per_room, |enc, row| {
                            enc.encode_field(&id(row.room_id.0))?;
                            enc.encode_field(&i64::from(row.room_number))?;
                            enc.encode_field(&count(row.client_count))
                        })
                    }
                    ReportSection::Floors => encode_rows(report_floors_schema(), &report.rooms_per_floor, |enc, row| {
                        enc.encode_field(&i64::from(row.floor))?;
                        enc.encode_field(&count(row.room_count))
                    }),
                }
            }
        }
    }
}

// ── Row encoding ─────────────────────────────────────────────────

fn encode_rows<T>(
    schema: Vec<FieldInfo>,
    items: &[T],
    mut encode: impl FnMut(&mut DataRowEncoder, &T) -> PgWireResult<()>,
) -> PgWireResult<Response> {
    let schema = Arc::new(schema);
    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let mut encoder = DataRowEncoder::new(schema.clone());
        encode(&mut encoder, item)?;
        rows.push(Ok(encoder.take_row()));
    }
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn room_rows(rooms: &[RoomView]) -> PgWireResult<Response> {
    encode_rows(room_schema(), rooms, |enc, view| {
        let room = &view.room;
        enc.encode_field(&id(room.id.0))?;
        enc.encode_field(&i64::from(room.number))?;
        enc.encode_field(&i64::from(room.floor))?;
        enc.encode_field(&room.room_type.as_str())?;
        enc.encode_field(&i64::from(room.capacity))?;
        enc.encode_field(&room.daily_rate.to_string())?;
        enc.encode_field(&room.phone_number)?;
        enc.encode_field(&room.description)?;
        enc.encode_field(&room.is_active)?;
        enc.encode_field(&i64::from(view.occupied_places))
    })
}

fn client_rows(clients: &[Client]) -> PgWireResult<Response> {
    encode_rows(client_schema(), clients, |enc, client| {
        enc.encode_field(&id(client.id.0))?;
        enc.encode_field(&client.passport_number)?;
        enc.encode_field(&client.last_name)?;
        enc.encode_field(&client.first_name)?;
        enc.encode_field(&client.middle_name)?;
        enc.encode_field(&client.city)?;
        enc.encode_field(&client.phone)?;
        enc.encode_field(&client.email)?;
        enc.encode_field(&client.notes)
    })
}

fn encode_stay(enc: &mut DataRowEncoder, stay: &Stay) -> PgWireResult<()> {
    enc.encode_field(&id(stay.id.0))?;
    enc.encode_field(&id(stay.client_id.0))?;
    enc.encode_field(&id(stay.room_id.0))?;
    enc.encode_field(&stay.check_in.to_string())?;
    enc.encode_field(&stay.check_out.map(|d| d.to_string()))?;
    enc.encode_field(&stay.status.as_str())?;
    enc.encode_field(&stay.nights())?;
    enc.encode_field(&stay.daily_rate.to_string())?;
    enc.encode_field(&stay.total_cost.to_string())
}

fn stay_rows(stays: &[Stay]) -> PgWireResult<Response> {
    encode_rows(stay_schema(), stays, encode_stay)
}

fn employee_rows(employees: &[Employee]) -> PgWireResult<Response> {
    encode_rows(employee_schema(), employees, |enc, employee| {
        let assignments = employee
            .assignments
            .iter()
            .map(|slot| format!("{}:{}", slot.floor, slot.weekday.as_str()))
            .collect::<Vec<_>>()
            .join(",");
        enc.encode_field(&id(employee.id.0))?;
        enc.encode_field(&employee.last_name)?;
        enc.encode_field(&employee.first_name)?;
        enc.encode_field(&employee.middle_name)?;
        enc.encode_field(&employee.status.as_str())?;
        enc.encode_field(&employee.hire_date.to_string())?;
        enc.encode_field(&employee.termination_date.map(|d| d.to_string()))?;
        enc.encode_field(&assignments)
    })
}

fn schedule_rows(assignments: &[(DutySlot, EmployeeId)]) -> PgWireResult<Response> {
    encode_rows(schedule_schema(), assignments, |enc, (slot, employee)| {
        enc.encode_field(&id(employee.0))?;
        enc.encode_field(&i64::from(slot.floor))?;
        enc.encode_field(&slot.weekday.as_str())
    })
}

fn id(raw: u64) -> i64 {
    i64::try_from(raw).unwrap_or(i64::MAX)
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

// ── Schemas ──────────────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn room_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("number", Type::INT8),
        field("floor", Type::INT8),
        field("room_type", Type::VARCHAR),
        field("capacity", Type::INT8),
        field("daily_rate", Type::VARCHAR),
        field("phone_number", Type::VARCHAR),
        field("description", Type::VARCHAR),
        field("is_active", Type::BOOL),
        field("occupied_places", Type::INT8),
    ]
}

fn free_rooms_schema() -> Vec<FieldInfo> {
    vec![
        field("room_type", Type::VARCHAR),
        field("label", Type::VARCHAR),
        field("free_count", Type::INT8),
        field("total_free_rooms", Type::INT8),
    ]
}

fn client_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("passport_number", Type::VARCHAR),
        field("last_name", Type::VARCHAR),
        field("first_name", Type::VARCHAR),
        field("middle_name", Type::VARCHAR),
        field("city", Type::VARCHAR),
        field("phone", Type::VARCHAR),
        field("email", Type::VARCHAR),
        field("notes", Type::VARCHAR),
    ]
}

fn client_count_schema() -> Vec<FieldInfo> {
    vec![field("city", Type::VARCHAR), field("client_count", Type::INT8)]
}

fn stay_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("client_id", Type::INT8),
        field("room_id", Type::INT8),
        field("check_in", Type::VARCHAR),
        field("check_out", Type::VARCHAR),
        field("status", Type::VARCHAR),
        field("nights", Type::INT8),
        field("daily_rate", Type::VARCHAR),
        field("total_cost", Type::VARCHAR),
    ]
}

fn room_stay_schema() -> Vec<FieldInfo> {
    let mut schema = stay_schema();
    schema.push(field("client_name", Type::VARCHAR));
    schema.push(field("client_city", Type::VARCHAR));
    schema
}

fn employee_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("last_name", Type::VARCHAR),
        field("first_name", Type::VARCHAR),
        field("middle_name", Type::VARCHAR),
        field("status", Type::VARCHAR),
        field("hire_date", Type::VARCHAR),
        field("termination_date", Type::VARCHAR),
        field("assignments", Type::VARCHAR),
    ]
}

fn schedule_schema() -> Vec<FieldInfo> {
    vec![
        field("employee_id", Type::INT8),
        field("floor", Type::INT8),
        field("weekday", Type::VARCHAR),
    ]
}

fn report_schema() -> Vec<FieldInfo> {
    vec![field("report", Type::VARCHAR)]
}

fn report_income_schema() -> Vec<FieldInfo> {
    vec![
        field("room_id", Type::INT8),
        field("room_number", Type::INT8),
        field("total_income", Type::VARCHAR),
    ]
}

fn report_clients_schema() -> Vec<FieldInfo> {
    vec![
        field("room_id", Type::INT8),
        field("room_number", Type::INT8),
        field("client_count", Type::INT8),
    ]
}

fn report_floors_schema() -> Vec<FieldInfo> {
    vec![field("floor", Type::INT8), field("room_count", Type::INT8)]
}

/// Result columns for a statement, keyed by the table it targets.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    match sql::target_table(sql).as_deref() {
        Some("rooms") => room_schema(),
        Some("free_rooms") => free_rooms_schema(),
        Some("room_stays") => room_stay_schema(),
        Some("clients") | Some("co_residents") => client_schema(),
        Some("client_count") => client_count_schema(),
        Some("stays") | Some("client_stays") => stay_schema(),
        Some("employees") | Some("who_cleans") => employee_schema(),
        Some("schedules") => schedule_schema(),
        Some("quarterly_report") => report_schema(),
        Some("report_income") => report_income_schema(),
        Some("report_clients") => report_clients_schema(),
        Some("report_floors") => report_floors_schema(),
        _ => Vec::new(),
    }
}

// ── Simple Query Protocol ────────────────────────────────────────

#[async_trait]
impl SimpleQueryHandler for HotelHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct HotelQueryParser;

#[async_trait]
impl QueryParser for HotelQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, _column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for HotelHandler {
    type Statement = String;
    type QueryParser = HotelQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(&self, _client: &mut C, portal: &Portal<Self::Statement>, _max_rows: usize) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.run(&substitute_params(portal)).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(param_types, result_schema(&target.statement)))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(&target.statement.statement)))
    }
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    let mut max = 0;
    let mut rest = sql;
    while let Some(pos) = rest.find('$') {
        rest = &rest[pos + 1..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if let Ok(n) = rest[..digits].parse::<usize>() {
            max = max.max(n);
        }
        rest = &rest[digits..];
    }
    max
}

/// Inline bound text parameters as quoted literals. Highest index first so
/// `$1` never clobbers the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut sql = portal.statement.statement.clone();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let value = match param {
            Some(bytes) => format!("'{}'", String::from_utf8_lossy(bytes).replace('\'', "''")),
            None => "NULL".to_string(),
        };
        sql = sql.replace(&format!("${}", i + 1), &value);
    }
    sql
}

// ── Auth & factory ───────────────────────────────────────────────

/// Single shared password for every user.
#[derive(Debug)]
pub struct PasswordAuthSource {
    password: String,
}

#[async_trait]
impl AuthSource for PasswordAuthSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

pub struct HotelFactory {
    handler: Arc<HotelHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<PasswordAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl HotelFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        Self {
            handler: Arc::new(HotelHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                PasswordAuthSource { password },
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for HotelFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(socket: TcpStream, engine: Arc<Engine>, password: String) -> std::io::Result<()> {
    let factory = Arc::new(HotelFactory::new(engine, password));
    pgwire::tokio::process_socket(socket, None, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn sqlstate(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotFound => "P0002",
        ErrorKind::Conflict => "23505",
        ErrorKind::InvalidState => "55000",
        ErrorKind::Validation => "22023",
        ErrorKind::Contention => "40001",
        ErrorKind::Storage => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), sqlstate(e.kind()).into(), e.to_string())))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), "42601".into(), e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_highest_placeholder() {
        assert_eq!(count_params("SELECT * FROM rooms"), 0);
        assert_eq!(count_params("UPDATE rooms SET daily_rate = $2 WHERE id = $1"), 2);
        assert_eq!(count_params("SELECT * FROM stays WHERE client_id = $10 AND room_id = $3"), 10);
        assert_eq!(count_params("SELECT '$' FROM rooms"), 0);
    }

    #[test]
    fn sqlstate_per_kind() {
        assert_eq!(sqlstate(EngineError::UnknownRoom(RoomId(1)).kind()), "P0002");
        assert_eq!(
            sqlstate(EngineError::RoomOccupied { room: RoomId(1), stay: StayId(1) }.kind()),
            "23505"
        );
        assert_eq!(sqlstate(EngineError::AlreadyCompleted(StayId(1)).kind()), "55000");
        assert_eq!(sqlstate(EngineError::Validation("x".into()).kind()), "22023");
        assert_eq!(sqlstate(EngineError::Contention("room 1".into()).kind()), "40001");
        assert_eq!(sqlstate(EngineError::WalError("disk".into()).kind()), "58030");
    }

    #[test]
    fn result_schema_follows_target_table() {
        let names = |sql: &str| result_schema(sql).into_iter().map(|f| f.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names("SELECT * FROM client_count WHERE city = $1"), vec!["city", "client_count"]);
        assert_eq!(names("INSERT INTO stays (client_id, room_id, check_in) VALUES ($1, $2, $3)")[0], "id");
        assert_eq!(names("DELETE FROM schedules WHERE employee_id = $1")[0], "employee_id");
        assert!(names("SELECT 1").is_empty());
    }
}
