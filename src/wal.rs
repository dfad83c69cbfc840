use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

pub const WAL_FILE_NAME: &str = "hotel.wal";

fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload = bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large for WAL entry"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// `Ok(false)` on a clean or torn end of file.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

enum Entry {
    Event(Event),
    End,
    Damaged(&'static str),
}

fn read_entry(reader: &mut impl Read) -> io::Result<Entry> {
    let mut len_buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut len_buf)? {
        return Ok(Entry::End);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    if !read_exact_or_eof(reader, &mut payload)? {
        return Ok(Entry::Damaged("truncated payload"));
    }
    let mut crc_buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut crc_buf)? {
        return Ok(Entry::Damaged("truncated checksum"));
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(Entry::Damaged("checksum mismatch"));
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Entry::Event(event)),
        Err(_) => Ok(Entry::Damaged("undecodable event")),
    }
}

/// Append-only event log for the hotel state.
///
/// Entry: `[u32 len][bincode Event][u32 crc32]`, little-endian; `len` counts
/// the payload only. A torn or corrupt tail ends replay at the last good entry.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Location of the log inside a data directory.
    pub fn path_in(data_dir: &Path) -> PathBuf {
        data_dir.join(WAL_FILE_NAME)
    }

    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append a single event and fsync. Test helper; the writer task
    /// batches with `append_buffered` + `flush_sync`.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one entry. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write compacted events to `<wal>.tmp` and fsync.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_path(path))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the temp file over the WAL and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Both compaction phases in one call.
    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Every intact event in the log, in append order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        loop {
            match read_entry(&mut reader)? {
                Entry::Event(event) => events.push(event),
                Entry::End => break,
                Entry::Damaged(reason) => {
                    warn!(path = %path.display(), kept = events.len(), reason, "discarding damaged WAL tail");
                    break;
                }
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    /// A log file under the temp dir, removed on drop.
    struct ScratchLog(PathBuf);

    impl ScratchLog {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("innkeep_wal_{}", std::process::id()));
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join(name);
            let _ = fs::remove_file(&path);
            Self(path)
        }

        fn write(&self, events: &[Event]) {
            let mut wal = Wal::open(&self.0).unwrap();
            for event in events {
                wal.append(event).unwrap();
            }
        }

        fn raw_tail(&self, bytes: &[u8]) {
            OpenOptions::new().append(true).open(&self.0).unwrap().write_all(bytes).unwrap();
        }

        fn replay(&self) -> Vec<Event> {
            Wal::replay(&self.0).unwrap()
        }

        fn size(&self) -> u64 {
            fs::metadata(&self.0).unwrap().len()
        }
    }

    impl Drop for ScratchLog {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
        }
    }

    fn room_created(id: u64, number: u32) -> Event {
        Event::RoomCreated {
            room: Room {
                id: RoomId(id),
                number,
                floor: 1,
                room_type: RoomType::Double,
                capacity: 2,
                daily_rate: Decimal::from(2000),
                phone_number: format!("1-{number}"),
                description: String::new(),
                is_active: true,
            },
        }
    }

    fn stay_opened(id: u64, room: u64) -> Event {
        Event::StayCheckedIn {
            id: StayId(id),
            client_id: ClientId(1),
            room_id: RoomId(room),
            check_in: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            daily_rate: "2000.50".parse().unwrap(),
        }
    }

    fn stay_closed(id: u64, room: u64) -> Event {
        Event::StayCheckedOut {
            id: StayId(id),
            room_id: RoomId(room),
            check_out: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            total_cost: "4001.00".parse().unwrap(),
        }
    }

    #[test]
    fn events_come_back_in_append_order() {
        let log = ScratchLog::new("order.wal");
        let events = vec![
            room_created(1, 101),
            stay_opened(1, 1),
            Event::ScheduleReplaced {
                employee_id: EmployeeId(3),
                slots: vec![DutySlot::new(1, Weekday::Mon), DutySlot::new(2, Weekday::Sun)],
            },
            stay_closed(1, 1),
        ];
        log.write(&events);
        assert_eq!(log.replay(), events);
    }

    #[test]
    fn money_survives_with_its_scale() {
        let log = ScratchLog::new("scale.wal");
        log.write(&[stay_closed(1, 1)]);
        let Some(Event::StayCheckedOut { total_cost, .. }) = log.replay().pop() else {
            panic!("expected a check-out event");
        };
        assert_eq!(total_cost.to_string(), "4001.00");
    }

    #[test]
    fn missing_log_is_empty() {
        let log = ScratchLog::new("never_written.wal");
        assert!(log.replay().is_empty());
    }

    #[test]
    fn torn_length_prefix_is_dropped() {
        let log = ScratchLog::new("torn.wal");
        log.write(&[room_created(1, 101)]);
        log.raw_tail(&[7, 0]);
        assert_eq!(log.replay(), vec![room_created(1, 101)]);
    }

    #[test]
    fn entry_with_bad_checksum_ends_replay() {
        let log = ScratchLog::new("bad_crc.wal");
        log.write(&[room_created(1, 101)]);

        let payload = bincode::serialize(&Event::RoomActivity { id: RoomId(1), is_active: false }).unwrap();
        let mut forged = (payload.len() as u32).to_le_bytes().to_vec();
        forged.extend_from_slice(&payload);
        forged.extend_from_slice(&crc32fast::hash(&payload).wrapping_add(1).to_le_bytes());
        log.raw_tail(&forged);
        log.write(&[room_created(2, 102)]);

        assert_eq!(log.replay(), vec![room_created(1, 101)]);
    }

    #[test]
    fn snapshot_replaces_history() {
        let log = ScratchLog::new("snapshot.wal");
        let mut history = vec![room_created(1, 101)];
        history.extend((0..12).map(|i| Event::RoomActivity { id: RoomId(1), is_active: i % 2 == 1 }));
        log.write(&history);
        let full_size = log.size();

        let snapshot = vec![room_created(1, 101)];
        let mut wal = Wal::open(&log.0).unwrap();
        wal.compact(&snapshot).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);
        assert!(!Wal::compact_path(&log.0).exists());

        assert!(log.size() < full_size);
        assert_eq!(log.replay(), snapshot);

        // Appends after the swap land behind the snapshot.
        wal.append(&stay_opened(1, 1)).unwrap();
        drop(wal);
        assert_eq!(log.replay(), vec![room_created(1, 101), stay_opened(1, 1)]);
    }

    #[test]
    fn buffered_entries_are_invisible_until_flushed() {
        let log = ScratchLog::new("buffered.wal");
        let rooms: Vec<Event> = (1..=4).map(|i| room_created(i, 200 + i as u32)).collect();

        let mut wal = Wal::open(&log.0).unwrap();
        for event in &rooms {
            wal.append_buffered(event).unwrap();
        }
        assert_eq!(wal.appends_since_compact(), 4);
        assert!(log.replay().is_empty());

        wal.flush_sync().unwrap();
        assert_eq!(log.replay(), rooms);
    }
}
