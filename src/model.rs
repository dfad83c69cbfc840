use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Engine-assigned room identifier.
    RoomId
);
id_type!(ClientId);
id_type!(StayId);
id_type!(EmployeeId);

/// Half-open date interval `[start, end)`. `end == None` means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl DateSpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end, "DateSpan start must not be after end");
        Self { start, end: Some(end) }
    }

    pub fn open(start: NaiveDate) -> Self {
        Self { start, end: None }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    pub fn overlaps(&self, other: &DateSpan) -> bool {
        let starts_before_other_ends = other.end.is_none_or(|end| self.start < end);
        let other_starts_before_end = self.end.is_none_or(|end| other.start < end);
        starts_before_other_ends && other_starts_before_end
    }

    /// Intersection with `other`, or `None` if they don't overlap.
    pub fn clip(&self, other: &DateSpan) -> Option<DateSpan> {
        if !self.overlaps(other) {
            return None;
        }
        let start = self.start.max(other.start);
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        };
        Some(DateSpan { start, end })
    }
}

impl fmt::Display for DateSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {})", self.start, end),
            None => write!(f, "[{}, ∞)", self.start),
        }
    }
}

/// Whole nights between check-in and check-out, never less than one.
pub fn billable_nights(check_in: NaiveDate, check_out: NaiveDate) -> i64 {
    (check_out - check_in).num_days().max(1)
}

// ── Rooms ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoomType {
    Single,
    Double,
    Triple,
}

impl RoomType {
    pub const ALL: [RoomType; 3] = [RoomType::Single, RoomType::Double, RoomType::Triple];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Single => "single",
            RoomType::Double => "double",
            RoomType::Triple => "triple",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RoomType::Single => "Single room",
            RoomType::Double => "Double room",
            RoomType::Triple => "Triple room",
        }
    }

    /// Seat count used when a room is created without an explicit capacity.
    pub fn default_capacity(&self) -> u32 {
        match self {
            RoomType::Single => 1,
            RoomType::Double => 2,
            RoomType::Triple => 3,
        }
    }
}

impl FromStr for RoomType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(RoomType::Single),
            "double" => Ok(RoomType::Double),
            "triple" => Ok(RoomType::Triple),
            other => Err(format!("unknown room type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub number: u32,
    pub floor: u16,
    pub room_type: RoomType,
    pub capacity: u32,
    pub daily_rate: Decimal,
    pub phone_number: String,
    pub description: String,
    pub is_active: bool,
}

// ── Clients ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub passport_number: String,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub city: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

impl Client {
    pub fn full_name(&self) -> String {
        [
            Some(self.last_name.as_str()),
            Some(self.first_name.as_str()),
            self.middle_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

// ── Stays ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StayStatus {
    Active,
    Completed,
}

impl StayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StayStatus::Active => "active",
            StayStatus::Completed => "completed",
        }
    }
}

impl FromStr for StayStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(StayStatus::Active),
            "completed" => Ok(StayStatus::Completed),
            other => Err(format!("unknown stay status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stay {
    pub id: StayId,
    pub client_id: ClientId,
    pub room_id: RoomId,
    pub check_in: NaiveDate,
    pub check_out: Option<NaiveDate>,
    pub status: StayStatus,
    /// Room rate captured at check-in.
    pub daily_rate: Decimal,
    /// Zero while active, frozen at checkout.
    pub total_cost: Decimal,
}

impl Stay {
    pub fn is_active(&self) -> bool {
        self.status == StayStatus::Active
    }

    pub fn nights(&self) -> Option<i64> {
        self.check_out.map(|out| billable_nights(self.check_in, out))
    }

    /// Days the stay holds its room: open-ended while active, the billed
    /// nights once completed (a same-day stay occupies its one billed night).
    pub fn occupancy_span(&self) -> DateSpan {
        match (self.status, self.nights()) {
            (StayStatus::Completed, Some(nights)) => {
                let end = self
                    .check_in
                    .checked_add_days(chrono::Days::new(nights.max(1) as u64))
                    .unwrap_or(NaiveDate::MAX);
                DateSpan::new(self.check_in, end)
            }
            _ => DateSpan::open(self.check_in),
        }
    }
}

// ── Employees ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmployeeStatus {
    Active,
    Fired,
}

impl EmployeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeStatus::Active => "active",
            EmployeeStatus::Fired => "fired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Mon => "mon",
            Weekday::Tue => "tue",
            Weekday::Wed => "wed",
            Weekday::Thu => "thu",
            Weekday::Fri => "fri",
            Weekday::Sat => "sat",
            Weekday::Sun => "sun",
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        match date.weekday() {
            chrono::Weekday::Mon => Weekday::Mon,
            chrono::Weekday::Tue => Weekday::Tue,
            chrono::Weekday::Wed => Weekday::Wed,
            chrono::Weekday::Thu => Weekday::Thu,
            chrono::Weekday::Fri => Weekday::Fri,
            chrono::Weekday::Sat => Weekday::Sat,
            chrono::Weekday::Sun => Weekday::Sun,
        }
    }
}

impl FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mon" | "monday" => Ok(Weekday::Mon),
            "tue" | "tuesday" => Ok(Weekday::Tue),
            "wed" | "wednesday" => Ok(Weekday::Wed),
            "thu" | "thursday" => Ok(Weekday::Thu),
            "fri" | "friday" => Ok(Weekday::Fri),
            "sat" | "saturday" => Ok(Weekday::Sat),
            "sun" | "sunday" => Ok(Weekday::Sun),
            other => Err(format!("unknown weekday: {other}")),
        }
    }
}

/// A cleaning assignment: one floor on one day of the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DutySlot {
    pub floor: u16,
    pub weekday: Weekday,
}

impl DutySlot {
    pub fn new(floor: u16, weekday: Weekday) -> Self {
        Self { floor, weekday }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub status: EmployeeStatus,
    pub hire_date: NaiveDate,
    pub termination_date: Option<NaiveDate>,
    /// Sorted by (floor, weekday).
    pub assignments: Vec<DutySlot>,
}

impl Employee {
    pub fn is_active(&self) -> bool {
        self.status == EmployeeStatus::Active
    }

    pub fn full_name(&self) -> String {
        [
            Some(self.last_name.as_str()),
            Some(self.first_name.as_str()),
            self.middle_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Flat event records; this is the WAL payload format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        room: Room,
    },
    RoomUpdated {
        id: RoomId,
        floor: u16,
        daily_rate: Decimal,
        phone_number: String,
        description: String,
    },
    RoomActivity {
        id: RoomId,
        is_active: bool,
    },
    ClientRegistered {
        client: Client,
    },
    ClientUpdated {
        id: ClientId,
        city: String,
        phone: Option<String>,
        email: Option<String>,
        notes: Option<String>,
    },
    StayCheckedIn {
        id: StayId,
        client_id: ClientId,
        room_id: RoomId,
        check_in: NaiveDate,
        daily_rate: Decimal,
    },
    StayCheckedOut {
        id: StayId,
        room_id: RoomId,
        check_out: NaiveDate,
        total_cost: Decimal,
    },
    EmployeeHired {
        id: EmployeeId,
        last_name: String,
        first_name: String,
        middle_name: Option<String>,
        hire_date: NaiveDate,
    },
    EmployeeFired {
        id: EmployeeId,
        termination_date: NaiveDate,
    },
    ScheduleReplaced {
        employee_id: EmployeeId,
        slots: Vec<DutySlot>,
    },
}

// ── Command inputs ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NewRoom {
    pub number: u32,
    pub floor: u16,
    pub room_type: RoomType,
    /// Defaults to the room type's seat count.
    pub capacity: Option<u32>,
    pub daily_rate: Decimal,
    pub phone_number: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomPatch {
    pub floor: Option<u16>,
    pub daily_rate: Option<Decimal>,
    pub phone_number: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewClient {
    pub passport_number: String,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub city: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientPatch {
    pub city: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEmployee {
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    /// Defaults to today.
    pub hire_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomFilter {
    pub room_type: Option<RoomType>,
    pub floor: Option<u16>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientFilter {
    /// Case-insensitive exact match.
    pub city: Option<String>,
    /// 1-based page; `None` returns the full list.
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StayFilter {
    pub status: Option<StayStatus>,
    pub client_id: Option<ClientId>,
    pub room_id: Option<RoomId>,
    pub room_number: Option<u32>,
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomView {
    #[serde(flatten)]
    pub room: Room,
    pub occupied_places: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSummary {
    pub id: ClientId,
    pub full_name: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomStayView {
    pub stay: Stay,
    pub client: ClientSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreeByType {
    pub room_type: RoomType,
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreeRoomsSummary {
    pub total_free_rooms: usize,
    pub by_type: Vec<FreeByType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportPeriod {
    pub quarter: u8,
    pub year: i32,
    pub start: NaiveDate,
    /// Last day of the quarter, inclusive.
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomClients {
    pub room_id: RoomId,
    pub room_number: u32,
    pub client_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FloorRooms {
    pub floor: u16,
    pub room_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomIncome {
    pub room_id: RoomId,
    pub room_number: u32,
    pub total_income: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarterlyReport {
    pub period: ReportPeriod,
    pub clients_per_room: Vec<RoomClients>,
    pub rooms_per_floor: Vec<FloorRooms>,
    pub income_per_room: Vec<RoomIncome>,
    pub total_income: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn span_overlap_half_open() {
        let a = DateSpan::new(d("2024-01-01"), d("2024-01-04"));
        let b = DateSpan::new(d("2024-01-03"), d("2024-01-06"));
        let c = DateSpan::new(d("2024-01-04"), d("2024-01-06"));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // checkout day is free
    }

    #[test]
    fn open_span_overlaps_everything_after_start() {
        let active = DateSpan::open(d("2024-01-10"));
        assert!(active.overlaps(&DateSpan::new(d("2030-01-01"), d("2030-01-02"))));
        assert!(active.overlaps(&DateSpan::open(d("2020-01-01"))));
        assert!(!active.overlaps(&DateSpan::new(d("2024-01-01"), d("2024-01-10"))));
    }

    #[test]
    fn zero_length_span_overlaps_nothing() {
        let empty = DateSpan::new(d("2024-01-05"), d("2024-01-05"));
        assert!(!empty.overlaps(&DateSpan::new(d("2024-01-01"), d("2024-01-10"))));
    }

    #[test]
    fn span_clip() {
        let stay = DateSpan::open(d("2024-01-10"));
        let window = DateSpan::new(d("2024-01-01"), d("2024-02-01"));
        assert_eq!(stay.clip(&window), Some(DateSpan::new(d("2024-01-10"), d("2024-02-01"))));
        let before = DateSpan::new(d("2023-01-01"), d("2023-02-01"));
        assert_eq!(stay.clip(&before), None);
    }

    #[test]
    fn nights_minimum_one() {
        assert_eq!(billable_nights(d("2024-01-01"), d("2024-01-04")), 3);
        assert_eq!(billable_nights(d("2024-01-01"), d("2024-01-01")), 1);
    }

    #[test]
    fn occupancy_span_saturates_at_calendar_end() {
        let stay = Stay {
            id: StayId(1),
            client_id: ClientId(1),
            room_id: RoomId(1),
            check_in: NaiveDate::MAX,
            check_out: Some(NaiveDate::MAX),
            status: StayStatus::Completed,
            daily_rate: Decimal::ONE,
            total_cost: Decimal::ONE,
        };
        assert_eq!(stay.occupancy_span(), DateSpan::new(NaiveDate::MAX, NaiveDate::MAX));

        let short = Stay { check_in: d("2024-01-01"), check_out: Some(d("2024-01-03")), ..stay };
        assert_eq!(short.occupancy_span(), DateSpan::new(d("2024-01-01"), d("2024-01-03")));
    }

    #[test]
    fn same_day_stay_occupies_one_night() {
        let stay = Stay {
            id: StayId(1),
            client_id: ClientId(1),
            room_id: RoomId(1),
            check_in: d("2024-03-05"),
            check_out: Some(d("2024-03-05")),
            status: StayStatus::Completed,
            daily_rate: Decimal::from(1000),
            total_cost: Decimal::from(1000),
        };
        assert_eq!(
            stay.occupancy_span(),
            DateSpan::new(d("2024-03-05"), d("2024-03-06"))
        );
    }

    #[test]
    fn weekday_parse_and_derive() {
        assert_eq!("MON".parse::<Weekday>().unwrap(), Weekday::Mon);
        assert_eq!("sunday".parse::<Weekday>().unwrap(), Weekday::Sun);
        assert!("funday".parse::<Weekday>().is_err());
        // 2024-01-01 was a Monday
        assert_eq!(Weekday::of(d("2024-01-01")), Weekday::Mon);
    }

    #[test]
    fn room_type_defaults() {
        assert_eq!("Double".parse::<RoomType>().unwrap(), RoomType::Double);
        assert_eq!(RoomType::Triple.default_capacity(), 3);
    }

    #[test]
    fn full_name_skips_empty_parts() {
        let client = Client {
            id: ClientId(1),
            passport_number: "4010 123456".into(),
            last_name: "Ivanov".into(),
            first_name: "Alexei".into(),
            middle_name: Some(String::new()),
            city: "Moscow".into(),
            phone: None,
            email: None,
            notes: None,
        };
        assert_eq!(client.full_name(), "Ivanov Alexei");
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::StayCheckedIn {
            id: StayId(7),
            client_id: ClientId(3),
            room_id: RoomId(2),
            check_in: d("2024-01-01"),
            daily_rate: "2000.50".parse().unwrap(),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
