use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "innkeep_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "innkeep_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "innkeep_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "innkeep_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "innkeep_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "innkeep_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "innkeep_wal_flush_batch_size";

/// Counter: lock waits that hit the timeout (each retry counts).
pub const LOCK_CONTENTION_TOTAL: &str = "innkeep_lock_contention_total";

/// Counter: report cache hits. Labels: report.
pub const REPORT_CACHE_HITS_TOTAL: &str = "innkeep_report_cache_hits_total";

/// Counter: report cache misses. Labels: report.
pub const REPORT_CACHE_MISSES_TOTAL: &str = "innkeep_report_cache_misses_total";

// ── Domain gauges ───────────────────────────────────────────────

/// Gauge: stays currently checked in.
pub const ACTIVE_STAYS: &str = "innkeep_active_stays";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertRoom(_) => "insert_room",
        Command::UpdateRoom { .. } => "update_room",
        Command::SetRoomActive { .. } => "set_room_active",
        Command::SelectRooms(_) => "select_rooms",
        Command::SelectFreeRooms => "select_free_rooms",
        Command::SelectRoomStays { .. } => "select_room_stays",
        Command::InsertClient(_) => "insert_client",
        Command::UpdateClient { .. } => "update_client",
        Command::SelectClients(_) => "select_clients",
        Command::SelectClientCount { .. } => "select_client_count",
        Command::SelectClientStays { .. } => "select_client_stays",
        Command::SelectCoResidents { .. } => "select_co_residents",
        Command::CheckIn { .. } => "check_in",
        Command::CheckOut { .. } => "check_out",
        Command::SelectStays(_) => "select_stays",
        Command::HireEmployee(_) => "hire_employee",
        Command::FireEmployee { .. } => "fire_employee",
        Command::SelectEmployees => "select_employees",
        Command::ReplaceSchedule { .. } => "replace_schedule",
        Command::SelectSchedules { .. } => "select_schedules",
        Command::SelectWhoCleans { .. } => "select_who_cleans",
        Command::SelectReport { .. } => "select_report",
    }
}
