use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

use crate::model::*;

/// Day selector for the cleaning lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleaningDay {
    Weekday(Weekday),
    Date(NaiveDate),
}

/// Which slice of the quarterly report a SELECT asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportSection {
    /// Whole report as a single JSON cell.
    Full,
    Income,
    Clients,
    Floors,
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertRoom(NewRoom),
    UpdateRoom {
        id: RoomId,
        patch: RoomPatch,
    },
    SetRoomActive {
        id: RoomId,
        is_active: bool,
    },
    SelectRooms(RoomFilter),
    SelectFreeRooms,
    SelectRoomStays {
        room_id: RoomId,
        start: NaiveDate,
        end: NaiveDate,
    },
    InsertClient(NewClient),
    UpdateClient {
        id: ClientId,
        patch: ClientPatch,
    },
    SelectClients(ClientFilter),
    SelectClientCount {
        city: String,
    },
    SelectClientStays {
        client_id: ClientId,
    },
    SelectCoResidents {
        client_id: ClientId,
        start: NaiveDate,
        end: NaiveDate,
    },
    CheckIn {
        client_id: ClientId,
        room_id: RoomId,
        check_in: NaiveDate,
    },
    CheckOut {
        stay_id: StayId,
        check_out: NaiveDate,
    },
    SelectStays(StayFilter),
    HireEmployee(NewEmployee),
    FireEmployee {
        id: EmployeeId,
        termination_date: Option<NaiveDate>,
    },
    SelectEmployees,
    /// Replaces the whole schedule; an empty list clears it.
    ReplaceSchedule {
        employee_id: EmployeeId,
        slots: Vec<DutySlot>,
    },
    SelectSchedules {
        employee_id: Option<EmployeeId>,
    },
    SelectWhoCleans {
        client_id: ClientId,
        day: CleaningDay,
    },
    SelectReport {
        section: ReportSection,
        quarter: u8,
        year: i32,
    },
}

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{table}: unknown column {column}")]
    UnknownColumn { table: &'static str, column: String },
    #[error("{table}: missing column {column}")]
    MissingColumn { table: &'static str, column: &'static str },
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
    #[error("{column}: {reason}")]
    BadValue { column: String, reason: String },
}

const ROOM_COLUMNS: &[&str] = &["number", "floor", "room_type", "daily_rate", "capacity", "phone_number", "description"];
const CLIENT_COLUMNS: &[&str] = &[
    "passport_number",
    "last_name",
    "first_name",
    "middle_name",
    "city",
    "phone",
    "email",
    "notes",
];
const STAY_COLUMNS: &[&str] = &["client_id", "room_id", "check_in"];
const EMPLOYEE_COLUMNS: &[&str] = &["last_name", "first_name", "middle_name", "hire_date"];
const SCHEDULE_COLUMNS: &[&str] = &["employee_id", "floor", "weekday"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };
    if stmts.len() > 1 {
        return Err(SqlError::Unsupported("multiple statements".into()));
    }

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update { table, assignments, selection, .. } => {
            let table = table_factor_name(&table.relation)?;
            parse_update(&table, assignments, selection.as_ref())
        }
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Table a statement reads or writes, without interpreting its values.
/// Works on statements that still carry `$N` placeholders.
pub fn target_table(sql: &str) -> Option<String> {
    let stmts = Parser::parse_sql(&PostgreSqlDialect {}, sql).ok()?;
    match stmts.first()? {
        Statement::Insert(insert) => insert_table_name(insert).ok(),
        Statement::Update { table, .. } => table_factor_name(&table.relation).ok(),
        Statement::Delete(delete) => delete_table_name(delete).ok(),
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(select) => table_factor_name(&select.from.first()?.relation).ok(),
            _ => None,
        },
        _ => None,
    }
}

// ── INSERT ────────────────────────────────────────────────────

/// One VALUES row keyed by column name.
struct Row<'a> {
    table: &'static str,
    values: Vec<(String, &'a Expr)>,
}

impl<'a> Row<'a> {
    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.values.iter().find(|(name, _)| name == column).map(|(_, expr)| *expr)
    }

    fn required(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(column).ok_or(SqlError::MissingColumn { table: self.table, column })
    }

    /// Absent and NULL both read as `None`.
    fn optional(&self, column: &str) -> Option<&'a Expr> {
        self.get(column).filter(|expr| !is_null(expr))
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let name = insert_table_name(insert)?;
    let (table, known): (&'static str, &[&str]) = match name.as_str() {
        "rooms" => ("rooms", ROOM_COLUMNS),
        "clients" => ("clients", CLIENT_COLUMNS),
        "stays" => ("stays", STAY_COLUMNS),
        "employees" => ("employees", EMPLOYEE_COLUMNS),
        "schedules" => ("schedules", SCHEDULE_COLUMNS),
        _ => return Err(SqlError::UnknownTable(name)),
    };

    let columns: Vec<String> = if insert.columns.is_empty() {
        known.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|ident| ident.value.to_lowercase()).collect()
    };
    if let Some(column) = columns.iter().find(|c| !known.contains(&c.as_str())) {
        return Err(SqlError::UnknownColumn { table, column: column.clone() });
    }

    let raw_rows = extract_insert_rows(insert)?;
    let mut rows = Vec::with_capacity(raw_rows.len());
    for (i, raw) in raw_rows.iter().enumerate() {
        if raw.len() > columns.len() || (!insert.columns.is_empty() && raw.len() != columns.len()) {
            return Err(SqlError::Parse(format!(
                "{table} row {i}: expected {} values, got {}",
                columns.len(),
                raw.len()
            )));
        }
        let values = columns.iter().cloned().zip(raw.iter()).collect();
        rows.push(Row { table, values });
    }

    if table == "schedules" {
        return parse_schedule_rows(&rows);
    }
    let [row] = rows.as_slice() else {
        return Err(SqlError::Unsupported(format!("multi-row INSERT into {table}")));
    };

    match table {
        "rooms" => {
            let room_type = parse_text(row.required("room_type")?, "room_type")?;
            Ok(Command::InsertRoom(NewRoom {
                number: parse_u32(row.required("number")?, "number")?,
                floor: parse_u16(row.required("floor")?, "floor")?,
                room_type: room_type
                    .parse::<RoomType>()
                    .map_err(|reason| SqlError::BadValue { column: "room_type".into(), reason })?,
                capacity: row.optional("capacity").map(|e| parse_u32(e, "capacity")).transpose()?,
                daily_rate: parse_decimal(row.required("daily_rate")?, "daily_rate")?,
                phone_number: optional_text(row, "phone_number")?.unwrap_or_default(),
                description: optional_text(row, "description")?.unwrap_or_default(),
            }))
        }
        "clients" => Ok(Command::InsertClient(NewClient {
            passport_number: parse_text(row.required("passport_number")?, "passport_number")?,
            last_name: parse_text(row.required("last_name")?, "last_name")?,
            first_name: parse_text(row.required("first_name")?, "first_name")?,
            middle_name: optional_text(row, "middle_name")?,
            city: parse_text(row.required("city")?, "city")?,
            phone: optional_text(row, "phone")?,
            email: optional_text(row, "email")?,
            notes: optional_text(row, "notes")?,
        })),
        "stays" => Ok(Command::CheckIn {
            client_id: ClientId(parse_id(row.required("client_id")?, "client_id")?),
            room_id: RoomId(parse_id(row.required("room_id")?, "room_id")?),
            check_in: parse_date(row.required("check_in")?, "check_in")?,
        }),
        "employees" => Ok(Command::HireEmployee(NewEmployee {
            last_name: parse_text(row.required("last_name")?, "last_name")?,
            first_name: parse_text(row.required("first_name")?, "first_name")?,
            middle_name: optional_text(row, "middle_name")?,
            hire_date: row.optional("hire_date").map(|e| parse_date(e, "hire_date")).transpose()?,
        })),
        _ => Err(SqlError::UnknownTable(table.to_string())),
    }
}

/// Every row must name the same employee; the rows become that employee's
/// full schedule.
fn parse_schedule_rows(rows: &[Row<'_>]) -> Result<Command, SqlError> {
    let mut employee_id = None;
    let mut slots = Vec::with_capacity(rows.len());
    for row in rows {
        let id = EmployeeId(parse_id(row.required("employee_id")?, "employee_id")?);
        if employee_id.is_some_and(|first| first != id) {
            return Err(SqlError::Unsupported("schedule rows for more than one employee".into()));
        }
        employee_id = Some(id);
        slots.push(DutySlot::new(
            parse_u16(row.required("floor")?, "floor")?,
            parse_weekday(row.required("weekday")?)?,
        ));
    }
    let employee_id = employee_id.ok_or(SqlError::Parse("empty VALUES".into()))?;
    Ok(Command::ReplaceSchedule { employee_id, slots })
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(table: &str, assignments: &[ast::Assignment], selection: Option<&Expr>) -> Result<Command, SqlError> {
    let mut set = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        set.push((column, &assignment.value));
    }
    let id = extract_where_id(selection)?;

    match table {
        "rooms" => {
            if let Some((_, value)) = set.iter().find(|(c, _)| c == "is_active") {
                if set.len() > 1 {
                    return Err(SqlError::Unsupported("is_active must be updated on its own".into()));
                }
                return Ok(Command::SetRoomActive { id: RoomId(id), is_active: parse_bool(value)? });
            }
            let mut patch = RoomPatch::default();
            for (column, value) in &set {
                match column.as_str() {
                    "floor" => patch.floor = Some(parse_u16(value, column)?),
                    "daily_rate" => patch.daily_rate = Some(parse_decimal(value, column)?),
                    "phone_number" => patch.phone_number = Some(parse_text_or_empty(value, column)?),
                    "description" => patch.description = Some(parse_text_or_empty(value, column)?),
                    _ => return Err(SqlError::UnknownColumn { table: "rooms", column: column.clone() }),
                }
            }
            Ok(Command::UpdateRoom { id: RoomId(id), patch })
        }
        "clients" => {
            let mut patch = ClientPatch::default();
            for (column, value) in &set {
                match column.as_str() {
                    "city" => patch.city = Some(parse_text(value, column)?),
                    "phone" => patch.phone = Some(parse_text_or_empty(value, column)?),
                    "email" => patch.email = Some(parse_text_or_empty(value, column)?),
                    "notes" => patch.notes = Some(parse_text_or_empty(value, column)?),
                    _ => return Err(SqlError::UnknownColumn { table: "clients", column: column.clone() }),
                }
            }
            Ok(Command::UpdateClient { id: ClientId(id), patch })
        }
        "stays" => {
            let mut check_out = None;
            for (column, value) in &set {
                match column.as_str() {
                    "check_out" => check_out = Some(parse_date(value, column)?),
                    // status follows from the checkout date
                    "status" => {
                        let status = parse_text(value, column)?;
                        if !status.eq_ignore_ascii_case("completed") {
                            return Err(SqlError::Unsupported(format!("stay status {status:?}")));
                        }
                    }
                    _ => return Err(SqlError::UnknownColumn { table: "stays", column: column.clone() }),
                }
            }
            Ok(Command::CheckOut {
                stay_id: StayId(id),
                check_out: check_out.ok_or(SqlError::MissingColumn { table: "stays", column: "check_out" })?,
            })
        }
        "employees" => {
            let mut fired = false;
            let mut termination_date = None;
            for (column, value) in &set {
                match column.as_str() {
                    "status" => {
                        let status = parse_text(value, column)?;
                        if !status.eq_ignore_ascii_case("fired") {
                            return Err(SqlError::Unsupported(format!("employee status {status:?}")));
                        }
                        fired = true;
                    }
                    "termination_date" if !is_null(value) => termination_date = Some(parse_date(value, column)?),
                    "termination_date" => {}
                    _ => return Err(SqlError::UnknownColumn { table: "employees", column: column.clone() }),
                }
            }
            if !fired {
                return Err(SqlError::MissingColumn { table: "employees", column: "status" });
            }
            Ok(Command::FireEmployee { id: EmployeeId(id), termination_date })
        }
        other => Err(SqlError::UnknownTable(other.to_string())),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "schedules" {
        return Err(SqlError::Unsupported(format!("DELETE FROM {table}")));
    }
    let filters = collect_filters(delete.selection.as_ref())?;
    let employee_id = required_filter(&filters, "employee_id", ast::BinaryOperator::Eq)?;
    Ok(Command::ReplaceSchedule {
        employee_id: EmployeeId(parse_id(employee_id, "employee_id")?),
        slots: Vec::new(),
    })
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;
    let filters = collect_filters(select.selection.as_ref())?;
    let eq = |column: &'static str| find_filter(&filters, column, ast::BinaryOperator::Eq);

    match table.as_str() {
        "rooms" => Ok(Command::SelectRooms(RoomFilter {
            room_type: eq("room_type")
                .map(|e| {
                    parse_text(e, "room_type")?
                        .parse::<RoomType>()
                        .map_err(|reason| SqlError::BadValue { column: "room_type".into(), reason })
                })
                .transpose()?,
            floor: eq("floor").map(|e| parse_u16(e, "floor")).transpose()?,
            is_active: eq("is_active").map(parse_bool).transpose()?,
        })),
        "free_rooms" => Ok(Command::SelectFreeRooms),
        "room_stays" => {
            let (start, end) = window_filters(&filters)?;
            Ok(Command::SelectRoomStays {
                room_id: RoomId(parse_id(required_filter(&filters, "room_id", ast::BinaryOperator::Eq)?, "room_id")?),
                start,
                end,
            })
        }
        "clients" => Ok(Command::SelectClients(ClientFilter {
            city: eq("city").map(|e| parse_text(e, "city")).transpose()?,
            page: eq("page").map(|e| parse_usize(e, "page")).transpose()?,
            page_size: eq("page_size").map(|e| parse_usize(e, "page_size")).transpose()?,
        })),
        "client_count" => Ok(Command::SelectClientCount {
            city: parse_text(required_filter(&filters, "city", ast::BinaryOperator::Eq)?, "city")?,
        }),
        "client_stays" => Ok(Command::SelectClientStays {
            client_id: ClientId(parse_id(required_filter(&filters, "client_id", ast::BinaryOperator::Eq)?, "client_id")?),
        }),
        "co_residents" => {
            let (start, end) = window_filters(&filters)?;
            Ok(Command::SelectCoResidents {
                client_id: ClientId(parse_id(required_filter(&filters, "client_id", ast::BinaryOperator::Eq)?, "client_id")?),
                start,
                end,
            })
        }
        "stays" => Ok(Command::SelectStays(StayFilter {
            status: eq("status")
                .map(|e| {
                    parse_text(e, "status")?
                        .parse::<StayStatus>()
                        .map_err(|reason| SqlError::BadValue { column: "status".into(), reason })
                })
                .transpose()?,
            client_id: eq("client_id").map(|e| parse_id(e, "client_id").map(ClientId)).transpose()?,
            room_id: eq("room_id").map(|e| parse_id(e, "room_id").map(RoomId)).transpose()?,
            room_number: eq("room_number").map(|e| parse_u32(e, "room_number")).transpose()?,
        })),
        "employees" => Ok(Command::SelectEmployees),
        "schedules" => Ok(Command::SelectSchedules {
            employee_id: eq("employee_id").map(|e| parse_id(e, "employee_id").map(EmployeeId)).transpose()?,
        }),
        "who_cleans" => {
            let client_id = ClientId(parse_id(required_filter(&filters, "client_id", ast::BinaryOperator::Eq)?, "client_id")?);
            let day = match (eq("weekday"), eq("date")) {
                (Some(weekday), None) => CleaningDay::Weekday(parse_weekday(weekday)?),
                (None, Some(date)) => CleaningDay::Date(parse_date(date, "date")?),
                (Some(_), Some(_)) => return Err(SqlError::Unsupported("both weekday and date".into())),
                (None, None) => return Err(SqlError::MissingFilter("weekday")),
            };
            Ok(Command::SelectWhoCleans { client_id, day })
        }
        "quarterly_report" | "report_income" | "report_clients" | "report_floors" => {
            let section = match table.as_str() {
                "report_income" => ReportSection::Income,
                "report_clients" => ReportSection::Clients,
                "report_floors" => ReportSection::Floors,
                _ => ReportSection::Full,
            };
            let quarter = parse_i64_expr(required_filter(&filters, "quarter", ast::BinaryOperator::Eq)?, "quarter")?;
            let quarter = u8::try_from(quarter).map_err(|_| SqlError::BadValue {
                column: "quarter".into(),
                reason: format!("{quarter} is not a quarter"),
            })?;
            let year = parse_i64_expr(required_filter(&filters, "year", ast::BinaryOperator::Eq)?, "year")?;
            let year = i32::try_from(year).map_err(|_| SqlError::BadValue {
                column: "year".into(),
                reason: format!("{year} out of range"),
            })?;
            Ok(Command::SelectReport { section, quarter, year })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `start >= 'd' AND "end" <= 'd'`, both required.
fn window_filters(filters: &[Filter<'_>]) -> Result<(NaiveDate, NaiveDate), SqlError> {
    let start = required_filter(filters, "start", ast::BinaryOperator::GtEq)?;
    let end = required_filter(filters, "end", ast::BinaryOperator::LtEq)?;
    Ok((parse_date(start, "start")?, parse_date(end, "end")?))
}

// ── WHERE ─────────────────────────────────────────────────────

/// A `column <op> value` conjunct of a WHERE clause.
struct Filter<'a> {
    column: String,
    op: ast::BinaryOperator,
    value: &'a Expr,
}

/// Flatten a conjunction of simple comparisons. Anything else (OR, subqueries,
/// functions) is rejected rather than silently ignored.
fn collect_filters(selection: Option<&Expr>) -> Result<Vec<Filter<'_>>, SqlError> {
    let mut filters = Vec::new();
    if let Some(expr) = selection {
        collect_conjuncts(expr, &mut filters)?;
    }
    Ok(filters)
}

fn collect_conjuncts<'a>(expr: &'a Expr, out: &mut Vec<Filter<'a>>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_conjuncts(inner, out),
        Expr::BinaryOp { left, op: ast::BinaryOperator::And, right } => {
            collect_conjuncts(left, out)?;
            collect_conjuncts(right, out)
        }
        Expr::BinaryOp { left, op, right } => {
            let column = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
            match op {
                ast::BinaryOperator::Eq | ast::BinaryOperator::GtEq | ast::BinaryOperator::LtEq => {
                    out.push(Filter { column, op: op.clone(), value: right });
                    Ok(())
                }
                other => Err(SqlError::Unsupported(format!("operator {other}"))),
            }
        }
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

fn find_filter<'a>(filters: &[Filter<'a>], column: &str, op: ast::BinaryOperator) -> Option<&'a Expr> {
    filters
        .iter()
        .find(|f| f.column == column && f.op == op)
        .map(|f| f.value)
}

fn required_filter<'a>(filters: &[Filter<'a>], column: &'static str, op: ast::BinaryOperator) -> Result<&'a Expr, SqlError> {
    find_filter(filters, column, op).ok_or(SqlError::MissingFilter(column))
}

fn extract_where_id(selection: Option<&Expr>) -> Result<u64, SqlError> {
    let filters = collect_filters(selection)?;
    let [filter] = filters.as_slice() else {
        return Err(SqlError::MissingFilter("id"));
    };
    if filter.column != "id" || filter.op != ast::BinaryOperator::Eq {
        return Err(SqlError::MissingFilter("id"));
    }
    parse_id(filter.value, "id")
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into())),
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into())),
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<&[Vec<Expr>], SqlError> {
    let body = insert.source.as_ref().ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) if values.rows.is_empty() => Err(SqlError::Parse("empty VALUES".into())),
        SetExpr::Values(values) => Ok(&values.rows),
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        Expr::Nested(inner) => extract_value(inner),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

fn bad(column: &str, reason: impl Into<String>) -> SqlError {
    SqlError::BadValue { column: column.to_string(), reason: reason.into() }
}

fn parse_i64_expr(expr: &Expr, column: &str) -> Result<i64, SqlError> {
    if let Expr::UnaryOp { op: ast::UnaryOperator::Minus, expr } = expr {
        return Ok(-parse_i64_expr(expr, column)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _)) | Some(Value::SingleQuotedString(s)) => {
            s.trim().parse().map_err(|e| bad(column, format!("bad integer {s:?}: {e}")))
        }
        Some(value) => Err(bad(column, format!("expected number, got {value}"))),
        None => Err(bad(column, format!("expected value, got {expr}"))),
    }
}

fn parse_id(expr: &Expr, column: &str) -> Result<u64, SqlError> {
    let v = parse_i64_expr(expr, column)?;
    u64::try_from(v).map_err(|_| bad(column, format!("{v} is not a valid id")))
}

fn parse_u16(expr: &Expr, column: &str) -> Result<u16, SqlError> {
    let v = parse_i64_expr(expr, column)?;
    u16::try_from(v).map_err(|_| bad(column, format!("{v} out of range")))
}

fn parse_u32(expr: &Expr, column: &str) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr, column)?;
    u32::try_from(v).map_err(|_| bad(column, format!("{v} out of range")))
}

fn parse_usize(expr: &Expr, column: &str) -> Result<usize, SqlError> {
    let v = parse_i64_expr(expr, column)?;
    usize::try_from(v).map_err(|_| bad(column, format!("{v} out of range")))
}

fn parse_decimal(expr: &Expr, column: &str) -> Result<Decimal, SqlError> {
    if let Expr::UnaryOp { op: ast::UnaryOperator::Minus, expr } = expr {
        return Ok(-parse_decimal(expr, column)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _)) | Some(Value::SingleQuotedString(s)) => {
            s.trim().parse().map_err(|e| bad(column, format!("bad decimal {s:?}: {e}")))
        }
        Some(value) => Err(bad(column, format!("expected decimal, got {value}"))),
        None => Err(bad(column, format!("expected value, got {expr}"))),
    }
}

fn parse_text(expr: &Expr, column: &str) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(bad(column, format!("expected string, got {value}"))),
        None => Err(bad(column, format!("expected value, got {expr}"))),
    }
}

/// NULL clears a text field.
fn parse_text_or_empty(expr: &Expr, column: &str) -> Result<String, SqlError> {
    if is_null(expr) {
        return Ok(String::new());
    }
    parse_text(expr, column)
}

fn optional_text(row: &Row<'_>, column: &str) -> Result<Option<String>, SqlError> {
    row.optional(column).map(|e| parse_text(e, column)).transpose()
}

fn parse_date(expr: &Expr, column: &str) -> Result<NaiveDate, SqlError> {
    let text = parse_text(expr, column)?;
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|e| bad(column, format!("bad date {text:?}: {e}")))
}

fn parse_weekday(expr: &Expr) -> Result<Weekday, SqlError> {
    parse_text(expr, "weekday")?.parse().map_err(|reason: String| bad("weekday", reason))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(bad("is_active", format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(value) => Err(bad("is_active", format!("expected bool, got {value}"))),
        None => Err(bad("is_active", format!("expected value, got {expr}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn parse_insert_room_with_columns() {
        let sql = "INSERT INTO rooms (number, floor, room_type, daily_rate, phone_number) \
                   VALUES (101, 1, 'double', 2000.00, '+7-101')";
        match parse_sql(sql).unwrap() {
            Command::InsertRoom(room) => {
                assert_eq!(room.number, 101);
                assert_eq!(room.floor, 1);
                assert_eq!(room.room_type, RoomType::Double);
                assert_eq!(room.capacity, None);
                assert_eq!(room.daily_rate, "2000.00".parse::<Decimal>().unwrap());
                assert_eq!(room.phone_number, "+7-101");
                assert_eq!(room.description, "");
            }
            other => panic!("expected InsertRoom, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_room_positional() {
        let sql = "INSERT INTO rooms VALUES (205, 2, 'triple', '3500.50', 4)";
        match parse_sql(sql).unwrap() {
            Command::InsertRoom(room) => {
                assert_eq!(room.number, 205);
                assert_eq!(room.capacity, Some(4));
                assert_eq!(room.daily_rate, "3500.50".parse::<Decimal>().unwrap());
            }
            other => panic!("expected InsertRoom, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_room_missing_rate() {
        let err = parse_sql("INSERT INTO rooms (number, floor, room_type) VALUES (1, 1, 'single')").unwrap_err();
        assert!(matches!(err, SqlError::MissingColumn { column: "daily_rate", .. }));
    }

    #[test]
    fn parse_insert_rejects_unknown_column() {
        let err = parse_sql("INSERT INTO rooms (number, color) VALUES (1, 'red')").unwrap_err();
        assert!(matches!(err, SqlError::UnknownColumn { table: "rooms", .. }));
    }

    #[test]
    fn parse_insert_client_with_nulls() {
        let sql = "INSERT INTO clients (passport_number, last_name, first_name, middle_name, city, email) \
                   VALUES ('4010 123456', 'Ivanov', 'Alexei', NULL, 'Moscow', 'a@example.com')";
        match parse_sql(sql).unwrap() {
            Command::InsertClient(client) => {
                assert_eq!(client.passport_number, "4010 123456");
                assert_eq!(client.middle_name, None);
                assert_eq!(client.city, "Moscow");
                assert_eq!(client.email.as_deref(), Some("a@example.com"));
                assert_eq!(client.phone, None);
            }
            other => panic!("expected InsertClient, got {other:?}"),
        }
    }

    #[test]
    fn parse_check_in_and_out() {
        let cmd = parse_sql("INSERT INTO stays (client_id, room_id, check_in) VALUES (3, 1, '2024-01-01')").unwrap();
        assert_eq!(
            cmd,
            Command::CheckIn { client_id: ClientId(3), room_id: RoomId(1), check_in: d("2024-01-01") }
        );

        let cmd = parse_sql("UPDATE stays SET check_out = '2024-01-04' WHERE id = 7").unwrap();
        assert_eq!(cmd, Command::CheckOut { stay_id: StayId(7), check_out: d("2024-01-04") });
    }

    #[test]
    fn parse_bad_date() {
        let err = parse_sql("INSERT INTO stays (client_id, room_id, check_in) VALUES (3, 1, '2024-02-30')").unwrap_err();
        assert!(matches!(err, SqlError::BadValue { ref column, .. } if column == "check_in"));
    }

    #[test]
    fn parse_update_room_patch() {
        let cmd = parse_sql("UPDATE rooms SET daily_rate = 2500, description = 'sea view' WHERE id = 4").unwrap();
        match cmd {
            Command::UpdateRoom { id, patch } => {
                assert_eq!(id, RoomId(4));
                assert_eq!(patch.daily_rate, Some(Decimal::from(2500)));
                assert_eq!(patch.description.as_deref(), Some("sea view"));
                assert_eq!(patch.floor, None);
            }
            other => panic!("expected UpdateRoom, got {other:?}"),
        }
    }

    #[test]
    fn parse_room_activity() {
        let cmd = parse_sql("UPDATE rooms SET is_active = false WHERE id = 2").unwrap();
        assert_eq!(cmd, Command::SetRoomActive { id: RoomId(2), is_active: false });
        assert!(parse_sql("UPDATE rooms SET is_active = true, daily_rate = 1 WHERE id = 2").is_err());
    }

    #[test]
    fn parse_update_requires_id_filter() {
        let err = parse_sql("UPDATE clients SET city = 'Kazan'").unwrap_err();
        assert!(matches!(err, SqlError::MissingFilter("id")));
        let err = parse_sql("UPDATE clients SET city = 'Kazan' WHERE city = 'Omsk'").unwrap_err();
        assert!(matches!(err, SqlError::MissingFilter("id")));
    }

    #[test]
    fn parse_update_client_clears_with_null() {
        let cmd = parse_sql("UPDATE clients SET phone = NULL, city = 'Kazan' WHERE id = 9").unwrap();
        match cmd {
            Command::UpdateClient { id, patch } => {
                assert_eq!(id, ClientId(9));
                assert_eq!(patch.phone.as_deref(), Some(""));
                assert_eq!(patch.city.as_deref(), Some("Kazan"));
            }
            other => panic!("expected UpdateClient, got {other:?}"),
        }
    }

    #[test]
    fn parse_employee_lifecycle() {
        let cmd = parse_sql("INSERT INTO employees (last_name, first_name, hire_date) VALUES ('Petrova', 'Anna', '2023-05-01')").unwrap();
        match cmd {
            Command::HireEmployee(new) => {
                assert_eq!(new.last_name, "Petrova");
                assert_eq!(new.hire_date, Some(d("2023-05-01")));
            }
            other => panic!("expected HireEmployee, got {other:?}"),
        }

        let cmd = parse_sql("UPDATE employees SET status = 'fired' WHERE id = 2").unwrap();
        assert_eq!(cmd, Command::FireEmployee { id: EmployeeId(2), termination_date: None });

        let cmd = parse_sql("UPDATE employees SET status = 'fired', termination_date = '2024-06-30' WHERE id = 2").unwrap();
        assert_eq!(cmd, Command::FireEmployee { id: EmployeeId(2), termination_date: Some(d("2024-06-30")) });

        assert!(parse_sql("UPDATE employees SET status = 'active' WHERE id = 2").is_err());
    }

    #[test]
    fn parse_schedule_replace_and_clear() {
        let sql = "INSERT INTO schedules (employee_id, floor, weekday) VALUES (1, 2, 'mon'), (1, 3, 'Friday')";
        let cmd = parse_sql(sql).unwrap();
        assert_eq!(
            cmd,
            Command::ReplaceSchedule {
                employee_id: EmployeeId(1),
                slots: vec![DutySlot::new(2, Weekday::Mon), DutySlot::new(3, Weekday::Fri)],
            }
        );

        let cmd = parse_sql("DELETE FROM schedules WHERE employee_id = 1").unwrap();
        assert_eq!(cmd, Command::ReplaceSchedule { employee_id: EmployeeId(1), slots: vec![] });
    }

    #[test]
    fn parse_schedule_rejects_mixed_employees() {
        let sql = "INSERT INTO schedules (employee_id, floor, weekday) VALUES (1, 2, 'mon'), (2, 3, 'tue')";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_select_rooms_filters() {
        let cmd = parse_sql("SELECT * FROM rooms WHERE room_type = 'single' AND is_active = true").unwrap();
        assert_eq!(
            cmd,
            Command::SelectRooms(RoomFilter { room_type: Some(RoomType::Single), floor: None, is_active: Some(true) })
        );
        assert_eq!(parse_sql("SELECT * FROM rooms").unwrap(), Command::SelectRooms(RoomFilter::default()));
        assert_eq!(parse_sql("SELECT * FROM free_rooms").unwrap(), Command::SelectFreeRooms);
    }

    #[test]
    fn parse_select_room_stays_window() {
        let sql = "SELECT * FROM room_stays WHERE room_id = 1 AND start >= '2024-01-01' AND \"end\" <= '2024-04-01'";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::SelectRoomStays { room_id: RoomId(1), start: d("2024-01-01"), end: d("2024-04-01") }
        );
        let missing = "SELECT * FROM room_stays WHERE room_id = 1 AND start >= '2024-01-01'";
        assert!(matches!(parse_sql(missing), Err(SqlError::MissingFilter("end"))));
    }

    #[test]
    fn parse_select_clients_paged() {
        let cmd = parse_sql("SELECT * FROM clients WHERE city = 'Moscow' AND page = 2 AND page_size = 10").unwrap();
        assert_eq!(
            cmd,
            Command::SelectClients(ClientFilter { city: Some("Moscow".into()), page: Some(2), page_size: Some(10) })
        );
        assert_eq!(
            parse_sql("SELECT * FROM client_count WHERE city = 'Omsk'").unwrap(),
            Command::SelectClientCount { city: "Omsk".into() }
        );
    }

    #[test]
    fn parse_select_stays_by_status() {
        let cmd = parse_sql("SELECT * FROM stays WHERE status = 'active' AND room_number = 101").unwrap();
        assert_eq!(
            cmd,
            Command::SelectStays(StayFilter {
                status: Some(StayStatus::Active),
                client_id: None,
                room_id: None,
                room_number: Some(101),
            })
        );
    }

    #[test]
    fn parse_who_cleans() {
        let cmd = parse_sql("SELECT * FROM who_cleans WHERE client_id = 5 AND weekday = 'tue'").unwrap();
        assert_eq!(cmd, Command::SelectWhoCleans { client_id: ClientId(5), day: CleaningDay::Weekday(Weekday::Tue) });

        let cmd = parse_sql("SELECT * FROM who_cleans WHERE client_id = 5 AND \"date\" = '2024-01-02'").unwrap();
        assert_eq!(cmd, Command::SelectWhoCleans { client_id: ClientId(5), day: CleaningDay::Date(d("2024-01-02")) });

        assert!(matches!(
            parse_sql("SELECT * FROM who_cleans WHERE client_id = 5"),
            Err(SqlError::MissingFilter("weekday"))
        ));
    }

    #[test]
    fn parse_reports() {
        let cmd = parse_sql("SELECT * FROM quarterly_report WHERE quarter = 1 AND year = 2024").unwrap();
        assert_eq!(cmd, Command::SelectReport { section: ReportSection::Full, quarter: 1, year: 2024 });
        let cmd = parse_sql("SELECT * FROM report_income WHERE quarter = 4 AND year = 2023").unwrap();
        assert_eq!(cmd, Command::SelectReport { section: ReportSection::Income, quarter: 4, year: 2023 });
        assert!(parse_sql("SELECT * FROM report_floors WHERE quarter = 300 AND year = 2023").is_err());
    }

    #[test]
    fn parse_rejects_or_filters() {
        let err = parse_sql("SELECT * FROM rooms WHERE \"floor\" = 1 OR \"floor\" = 2").unwrap_err();
        assert!(matches!(err, SqlError::Unsupported(_)));
    }

    #[test]
    fn parse_unknown_table_errors() {
        assert!(matches!(parse_sql("SELECT * FROM bookings"), Err(SqlError::UnknownTable(_))));
        assert!(matches!(parse_sql("DELETE FROM rooms WHERE id = 1"), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn target_table_ignores_placeholders() {
        assert_eq!(target_table("SELECT * FROM who_cleans WHERE client_id = $1 AND weekday = $2").as_deref(), Some("who_cleans"));
        assert_eq!(target_table("UPDATE stays SET check_out = $1 WHERE id = $2").as_deref(), Some("stays"));
        assert_eq!(target_table("not sql at all"), None);
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
