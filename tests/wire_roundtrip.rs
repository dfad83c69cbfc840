use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage, SimpleQueryRow};

use innkeep::engine::{Engine, EngineConfig};
use innkeep::wal::Wal;
use innkeep::wire;

static SERVER_SEQ: AtomicUsize = AtomicUsize::new(0);

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!(
        "innkeep_int_test_{}_{}",
        std::process::id(),
        SERVER_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Arc::new(Engine::new(Wal::path_in(&dir), EngineConfig::default()).unwrap());

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine, "innkeep".to_string()).await;
            });
        }
    });

    addr
}

async fn connect(addr: SocketAddr) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("hotel")
        .user("frontdesk")
        .password("innkeep");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn rows(client: &tokio_postgres::Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap_or_else(|e| panic!("{sql}: {e}"))
        .into_iter()
        .filter_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn one(client: &tokio_postgres::Client, sql: &str) -> SimpleQueryRow {
    let mut found = rows(client, sql).await;
    assert_eq!(found.len(), 1, "{sql}: expected one row");
    found.remove(0)
}

async fn sqlstate(client: &tokio_postgres::Client, sql: &str) -> String {
    match client.simple_query(sql).await {
        Ok(_) => panic!("{sql}: expected an error"),
        Err(err) => err.code().map(|c| c.code().to_string()).unwrap_or_default(),
    }
}

fn col<'a>(row: &'a SimpleQueryRow, name: &str) -> &'a str {
    row.get(name).unwrap_or_else(|| panic!("column {name} is NULL"))
}

async fn register(client: &tokio_postgres::Client, passport: &str, last: &str, city: &str) -> String {
    let row = one(
        client,
        &format!(
            "INSERT INTO clients (passport_number, last_name, first_name, city) \
             VALUES ('{passport}', '{last}', 'Test', '{city}')"
        ),
    )
    .await;
    col(&row, "id").to_string()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn room_occupancy_over_the_wire() {
    let addr = start_test_server().await;
    let client = connect(addr).await;

    let room = one(
        &client,
        "INSERT INTO rooms (number, floor, room_type, daily_rate, capacity) VALUES (101, 1, 'double', 2000, 2)",
    )
    .await;
    assert_eq!(col(&room, "number"), "101");
    assert_eq!(col(&room, "occupied_places"), "0");
    let room_id = col(&room, "id").to_string();

    let alice = register(&client, "P-1", "Ivanova", "Moscow").await;
    let boris = register(&client, "P-2", "Borisov", "Kazan").await;

    let stay = one(
        &client,
        &format!("INSERT INTO stays (client_id, room_id, check_in) VALUES ({alice}, {room_id}, '2024-01-01')"),
    )
    .await;
    assert_eq!(col(&stay, "status"), "active");
    assert_eq!(stay.get("check_out"), None);
    let stay_id = col(&stay, "id").to_string();

    let overlapping = format!("INSERT INTO stays (client_id, room_id, check_in) VALUES ({boris}, {room_id}, '2024-01-02')");
    assert_eq!(sqlstate(&client, &overlapping).await, "23505");

    let done = one(&client, &format!("UPDATE stays SET check_out = '2024-01-04' WHERE id = {stay_id}")).await;
    assert_eq!(col(&done, "status"), "completed");
    assert_eq!(col(&done, "nights"), "3");
    assert_eq!(col(&done, "total_cost"), "6000");

    let again = format!("UPDATE stays SET check_out = '2024-01-05' WHERE id = {stay_id}");
    assert_eq!(sqlstate(&client, &again).await, "55000");

    one(&client, &overlapping).await;
    let active = rows(&client, "SELECT * FROM stays WHERE status = 'active'").await;
    assert_eq!(active.len(), 1);
    assert_eq!(col(&active[0], "client_id"), boris);
}

#[tokio::test]
async fn errors_carry_sqlstate() {
    let addr = start_test_server().await;
    let client = connect(addr).await;

    assert_eq!(sqlstate(&client, "SELEC * FROM rooms").await, "42601");
    assert_eq!(sqlstate(&client, "SELECT * FROM bookings").await, "42601");
    assert_eq!(sqlstate(&client, "UPDATE rooms SET daily_rate = 10 WHERE id = 999").await, "P0002");
    assert_eq!(
        sqlstate(&client, "INSERT INTO rooms (number, floor, room_type, daily_rate) VALUES (1, 0, 'single', 10)").await,
        "22023"
    );

    one(&client, "INSERT INTO rooms (number, floor, room_type, daily_rate) VALUES (7, 1, 'single', 10)").await;
    assert_eq!(
        sqlstate(&client, "INSERT INTO rooms (number, floor, room_type, daily_rate) VALUES (7, 2, 'single', 10)").await,
        "23505"
    );
}

#[tokio::test]
async fn cleaning_schedule_and_free_rooms() {
    let addr = start_test_server().await;
    let client = connect(addr).await;

    let room = one(
        &client,
        "INSERT INTO rooms (number, floor, room_type, daily_rate) VALUES (201, 2, 'single', 1500)",
    )
    .await;
    let room_id = col(&room, "id").to_string();
    one(&client, "INSERT INTO rooms (number, floor, room_type, daily_rate) VALUES (301, 3, 'triple', 3000)").await;

    let guest = register(&client, "P-9", "Sidorov", "Omsk").await;
    one(
        &client,
        &format!("INSERT INTO stays (client_id, room_id, check_in) VALUES ({guest}, {room_id}, '2024-01-01')"),
    )
    .await;

    let anna = one(&client, "INSERT INTO employees (last_name, first_name, hire_date) VALUES ('Petrova', 'Anna', '2023-01-01')").await;
    let anna_id = col(&anna, "id").to_string();
    let olga = one(&client, "INSERT INTO employees (last_name, first_name, hire_date) VALUES ('Smirnova', 'Olga', '2023-01-01')").await;
    let olga_id = col(&olga, "id").to_string();

    let slots = rows(
        &client,
        &format!("INSERT INTO schedules (employee_id, floor, weekday) VALUES ({anna_id}, 2, 'mon'), ({anna_id}, 3, 'tue')"),
    )
    .await;
    assert_eq!(slots.len(), 2);

    let cleaner = one(&client, &format!("SELECT * FROM who_cleans WHERE client_id = {guest} AND weekday = 'mon'")).await;
    assert_eq!(col(&cleaner, "id"), anna_id);

    // Taking floor 2 on Monday moves the slot from Anna to Olga.
    rows(&client, &format!("INSERT INTO schedules (employee_id, floor, weekday) VALUES ({olga_id}, 2, 'mon')")).await;
    let cleaner = one(&client, &format!("SELECT * FROM who_cleans WHERE client_id = {guest} AND weekday = 'mon'")).await;
    assert_eq!(col(&cleaner, "id"), olga_id);
    let anna_slots = rows(&client, &format!("SELECT * FROM schedules WHERE employee_id = {anna_id}")).await;
    assert_eq!(anna_slots.len(), 1);
    assert_eq!(col(&anna_slots[0], "weekday"), "tue");

    let nobody = rows(&client, &format!("SELECT * FROM who_cleans WHERE client_id = {guest} AND weekday = 'sun'")).await;
    assert!(nobody.is_empty());

    let free = rows(&client, "SELECT * FROM free_rooms").await;
    assert_eq!(free.len(), 3);
    assert!(free.iter().all(|row| col(row, "total_free_rooms") == "1"));
    let triple = free.iter().find(|row| col(row, "room_type") == "triple").unwrap();
    assert_eq!(col(triple, "free_count"), "1");
}

#[tokio::test]
async fn quarterly_report_as_json() {
    let addr = start_test_server().await;
    let client = connect(addr).await;

    let room = one(&client, "INSERT INTO rooms (number, floor, room_type, daily_rate) VALUES (101, 1, 'single', 1000)").await;
    let room_id = col(&room, "id").to_string();
    let guest = register(&client, "P-5", "Orlov", "Tver").await;

    let stay = one(
        &client,
        &format!("INSERT INTO stays (client_id, room_id, check_in) VALUES ({guest}, {room_id}, '2023-12-20')"),
    )
    .await;
    one(&client, &format!("UPDATE stays SET check_out = '2024-01-05' WHERE id = {}", col(&stay, "id"))).await;

    let report = one(&client, "SELECT * FROM quarterly_report WHERE quarter = 1 AND year = 2024").await;
    let json: serde_json::Value = serde_json::from_str(col(&report, "report")).unwrap();
    assert_eq!(json["total_income"], "16000");
    assert_eq!(json["period"]["end"], "2024-03-31");

    let income = rows(&client, "SELECT * FROM report_income WHERE quarter = 1 AND year = 2024").await;
    assert_eq!(income.len(), 1);
    assert_eq!(col(&income[0], "room_number"), "101");
    assert_eq!(col(&income[0], "total_income"), "16000");

    assert_eq!(
        sqlstate(&client, "SELECT * FROM quarterly_report WHERE quarter = 5 AND year = 2024").await,
        "22023"
    );
}
