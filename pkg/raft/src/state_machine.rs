//! The deterministic state machine: show catalog, seat reservations, and read queries.
//!
//! `apply` is the single mutating entry point. It must be deterministic given a committed
//! command sequence, with one documented exception: `reserved_at` is read from wall-clock at
//! apply time, matching the reference behavior rather than being folded into the log-matching invariant.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::types::LogIndex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    AddShow { show_id: String, total_seats: u32, price_cents: u64 },
    Reserve { show_id: String, seat_id: u32, user_id: String, booking_id: String },
    Release { show_id: String, seat_id: u32 },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReservationRecord {
    pub reserved: bool,
    pub user_id: String,
    pub booking_id: String,
    pub reserved_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Show {
    pub total_seats: u32,
    pub price_cents: u64,
    pub seats: BTreeMap<u32, ReservationRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Catalog {
    shows: BTreeMap<String, Show>,
}

/// A seat's state as returned by `query`, including existence so callers can distinguish
/// "no such show/seat" from "exists but not reserved".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatQuery {
    pub exists: bool,
    pub reserved: bool,
    pub user_id: Option<String>,
    pub booking_id: Option<String>,
    pub price_cents: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatRecord {
    pub seat_id: u32,
    pub reserved: bool,
    pub user_id: Option<String>,
    pub booking_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowSummary {
    pub show_id: String,
    pub total_seats: u32,
    pub available_seats: u32,
    pub booked_seats: u32,
    pub price_cents: u64,
}

/// The replicated store. Every node runs its own instance and applies the same committed
/// command sequence to it, in order, producing byte-for-byte identical catalogs (apart from the
/// documented `reserved_at` exception).
pub struct StateMachine {
    catalog: Catalog,
    apply_index: LogIndex,
    snapshot_path: Option<PathBuf>,
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine { catalog: Catalog::default(), apply_index: 0, snapshot_path: None }
    }

    /// Opens a state machine backed by a snapshot file, loading existing state if present.
    pub fn open(snapshot_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let snapshot_path = snapshot_path.as_ref().to_path_buf();
        let mut sm = StateMachine { catalog: Catalog::default(), apply_index: 0, snapshot_path: Some(snapshot_path.clone()) };

        if snapshot_path.exists() {
            let content = fs::read_to_string(&snapshot_path)?;
            if !content.trim().is_empty() {
                #[derive(Deserialize)]
                struct Snapshot {
                    apply_index: LogIndex,
                    catalog: Catalog,
                }
                let snapshot: Snapshot = serde_json::from_str(&content)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                sm.catalog = snapshot.catalog;
                sm.apply_index = snapshot.apply_index;
            }
        }
        Ok(sm)
    }

    pub fn apply_index(&self) -> LogIndex {
        self.apply_index
    }

    /// Applies one committed command. `index` is the log index the command was committed at;
    /// it becomes the new `apply_index` and is persisted alongside the catalog so that a
    /// restarted node resumes applying strictly after the last entry it already folded in.
    pub fn apply(&mut self, command: &Command, index: LogIndex) {
        match command {
            Command::AddShow { show_id, total_seats, price_cents } => {
                self.add_show(show_id, *total_seats, *price_cents);
            }
            Command::Reserve { show_id, seat_id, user_id, booking_id } => {
                self.reserve(show_id, *seat_id, user_id, booking_id);
            }
            Command::Release { show_id, seat_id } => {
                self.release(show_id, *seat_id);
            }
        }
        self.apply_index = index;
        self.persist();
    }

    fn add_show(&mut self, show_id: &str, total_seats: u32, price_cents: u64) {
        match self.catalog.shows.get_mut(show_id) {
            Some(show) => {
                show.total_seats = total_seats;
                show.price_cents = price_cents;
            }
            None => {
                self.catalog.shows.insert(
                    show_id.to_string(),
                    Show { total_seats, price_cents, seats: BTreeMap::new() },
                );
            }
        }
    }

    fn reserve(&mut self, show_id: &str, seat_id: u32, user_id: &str, booking_id: &str) {
        let Some(show) = self.catalog.shows.get_mut(show_id) else {
            tracing::warn!(show_id, seat_id, "reserve applied against unknown show; no-op");
            return;
        };

        if seat_id == 0 || seat_id > show.total_seats {
            tracing::warn!(show_id, seat_id, "reserve applied for out-of-range seat; no-op");
            return;
        }

        if show.seats.get(&seat_id).map(|r| r.reserved).unwrap_or(false) {
            // Invariant 1: at most one committed reserve takes effect per (show, seat).
            return;
        }

        let reserved_at = now_millis();
        show.seats.insert(
            seat_id,
            ReservationRecord {
                reserved: true,
                user_id: user_id.to_string(),
                booking_id: booking_id.to_string(),
                reserved_at,
            },
        );
    }

    fn release(&mut self, show_id: &str, seat_id: u32) {
        if let Some(show) = self.catalog.shows.get_mut(show_id) {
            show.seats.remove(&seat_id);
        }
    }

    fn persist(&self) {
        let Some(path) = &self.snapshot_path else { return };
        #[derive(Serialize)]
        struct Snapshot<'a> {
            apply_index: LogIndex,
            catalog: &'a Catalog,
        }
        let snapshot = Snapshot { apply_index: self.apply_index, catalog: &self.catalog };
        match serde_json::to_string_pretty(&snapshot) {
            Ok(body) => {
                if let Some(parent) = path.parent() {
                    if let Err(e) = fs::create_dir_all(parent) {
                        tracing::error!(error = %e, "failed to create state machine snapshot directory");
                        return;
                    }
                }
                if let Err(e) = fs::write(path, body) {
                    tracing::error!(error = %e, "failed to write state machine snapshot");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize state machine snapshot"),
        }
    }

    pub fn query(&self, show_id: &str, seat_id: u32) -> SeatQuery {
        let Some(show) = self.catalog.shows.get(show_id) else {
            return SeatQuery { exists: false, reserved: false, user_id: None, booking_id: None, price_cents: 0 };
        };

        if seat_id == 0 || seat_id > show.total_seats {
            return SeatQuery {
                exists: false,
                reserved: false,
                user_id: None,
                booking_id: None,
                price_cents: show.price_cents,
            };
        }

        match show.seats.get(&seat_id) {
            Some(record) if record.reserved => SeatQuery {
                exists: true,
                reserved: true,
                user_id: Some(record.user_id.clone()),
                booking_id: Some(record.booking_id.clone()),
                price_cents: show.price_cents,
            },
            _ => SeatQuery {
                exists: true,
                reserved: false,
                user_id: None,
                booking_id: None,
                price_cents: show.price_cents,
            },
        }
    }

    pub fn price_cents(&self, show_id: &str) -> Option<u64> {
        self.catalog.shows.get(show_id).map(|s| s.price_cents)
    }

    /// Lists seats for `show_id` in stable seat-number order, paginated by `page_size` starting
    /// at `page_token` (a seat-number offset). Returns the page and the next page token, or 0
    /// when pagination is exhausted.
    pub fn list_seats(&self, show_id: &str, page_size: u32, page_token: u32) -> (Vec<SeatRecord>, u32) {
        let Some(show) = self.catalog.shows.get(show_id) else {
            return (Vec::new(), 0);
        };

        let page_size = page_size.max(1);
        let start = page_token.max(1);
        if start > show.total_seats {
            return (Vec::new(), 0);
        }
        let end = show.total_seats.min(start + page_size - 1);

        let seats: Vec<SeatRecord> = (start..=end)
            .map(|seat_id| {
                let record = show.seats.get(&seat_id);
                SeatRecord {
                    seat_id,
                    reserved: record.map(|r| r.reserved).unwrap_or(false),
                    user_id: record.map(|r| r.user_id.clone()),
                    booking_id: record.map(|r| r.booking_id.clone()),
                }
            })
            .collect();

        let next_token = if end < show.total_seats { end + 1 } else { 0 };
        (seats, next_token)
    }

    pub fn list_shows(&self) -> Vec<ShowSummary> {
        self.catalog
            .shows
            .iter()
            .map(|(show_id, show)| {
                let booked = show.seats.values().filter(|r| r.reserved).count() as u32;
                ShowSummary {
                    show_id: show_id.clone(),
                    total_seats: show.total_seats,
                    available_seats: show.total_seats.saturating_sub(booked),
                    booked_seats: booked,
                    price_cents: show.price_cents,
                }
            })
            .collect()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_show(sm: &mut StateMachine, show_id: &str, total_seats: u32, price_cents: u64) {
        sm.apply(&Command::AddShow { show_id: show_id.to_string(), total_seats, price_cents }, sm.apply_index + 1);
    }

    #[test]
    fn add_show_then_reserve() {
        let mut sm = StateMachine::new();
        add_show(&mut sm, "s1", 10, 100);
        sm.apply(
            &Command::Reserve {
                show_id: "s1".into(),
                seat_id: 3,
                user_id: "u1".into(),
                booking_id: "b1".into(),
            },
            2,
        );

        let q = sm.query("s1", 3);
        assert!(q.exists);
        assert!(q.reserved);
        assert_eq!(q.user_id.as_deref(), Some("u1"));
        assert_eq!(q.price_cents, 100);
    }

    #[test]
    fn reserve_against_unknown_show_is_noop() {
        let mut sm = StateMachine::new();
        sm.apply(
            &Command::Reserve { show_id: "nope".into(), seat_id: 1, user_id: "u1".into(), booking_id: "b1".into() },
            1,
        );
        assert!(!sm.query("nope", 1).exists);
    }

    #[test]
    fn reserve_out_of_range_seat_is_noop() {
        let mut sm = StateMachine::new();
        add_show(&mut sm, "s1", 5, 100);
        sm.apply(
            &Command::Reserve { show_id: "s1".into(), seat_id: 6, user_id: "u1".into(), booking_id: "b1".into() },
            2,
        );
        let q = sm.query("s1", 6);
        assert!(!q.exists);
    }

    #[test]
    fn duplicate_reserve_is_idempotent_noop() {
        let mut sm = StateMachine::new();
        add_show(&mut sm, "s1", 5, 100);
        sm.apply(
            &Command::Reserve { show_id: "s1".into(), seat_id: 1, user_id: "u1".into(), booking_id: "b1".into() },
            2,
        );
        sm.apply(
            &Command::Reserve { show_id: "s1".into(), seat_id: 1, user_id: "u2".into(), booking_id: "b2".into() },
            3,
        );

        let q = sm.query("s1", 1);
        assert_eq!(q.user_id.as_deref(), Some("u1"), "first committed reservation wins");
    }

    #[test]
    fn list_seats_paginates_in_seat_order() {
        let mut sm = StateMachine::new();
        add_show(&mut sm, "s1", 10, 100);

        let (page, next) = sm.list_seats("s1", 4, 1);
        assert_eq!(page.iter().map(|s| s.seat_id).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(next, 5);

        let (page, next) = sm.list_seats("s1", 4, 9);
        assert_eq!(page.iter().map(|s| s.seat_id).collect::<Vec<_>>(), vec![9, 10]);
        assert_eq!(next, 0);
    }

    #[test]
    fn list_shows_reports_booked_and_available() {
        let mut sm = StateMachine::new();
        add_show(&mut sm, "s1", 10, 100);
        sm.apply(
            &Command::Reserve { show_id: "s1".into(), seat_id: 1, user_id: "u1".into(), booking_id: "b1".into() },
            2,
        );

        let shows = sm.list_shows();
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].booked_seats, 1);
        assert_eq!(shows[0].available_seats, 9);
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("raft-sm-test-{}", now_millis()));
        let path = dir.join("snapshot.json");

        {
            let mut sm = StateMachine::open(&path).unwrap();
            add_show(&mut sm, "s1", 10, 250);
        }

        let sm = StateMachine::open(&path).unwrap();
        assert_eq!(sm.price_cents("s1"), Some(250));
        assert_eq!(sm.apply_index(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
