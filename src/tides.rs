//! Static tide schedules keyed by location.
//!
//! The built-in table is illustrative fixture data for the main Senegalese
//! landing sites, not an astronomical prediction. A TOML fixture can replace
//! it (`[tides] fixture`). Lookups never fail: an unknown location silently
//! resolves to the default location's schedule, and the caller is told that
//! a substitution happened.

use anyhow::{bail, Context, Result};
use chrono::{NaiveTime, Timelike};
use serde::Deserialize;
use std::path::Path;

use crate::models::TideKind::{High, Low};
use crate::models::{TideEvent, TideKind, TidePhase, TideSchedule};

/// Minutes either side of an extreme during which the tide is considered slack.
const SLACK_MINUTES: i64 = 30;

type BuiltinEvent = (TideKind, &'static str, f64);
type BuiltinEntry = (&'static str, &'static [BuiltinEvent], &'static [BuiltinEvent]);

const BUILTIN: &[BuiltinEntry] = &[
    (
        "Dakar",
        &[(High, "05:30", 1.2), (Low, "11:45", 0.3), (High, "17:50", 1.3), (Low, "23:55", 0.2)],
        &[(High, "06:15", 1.3), (Low, "12:30", 0.2), (High, "18:35", 1.4)],
    ),
    (
        "Saint-Louis",
        &[(High, "06:10", 1.0), (Low, "12:20", 0.2), (High, "18:30", 1.1)],
        &[(Low, "00:35", 0.3), (High, "06:55", 1.1), (Low, "13:05", 0.2), (High, "19:15", 1.2)],
    ),
    (
        "Mbour",
        &[(High, "05:15", 1.3), (Low, "11:30", 0.3), (High, "17:35", 1.4), (Low, "23:40", 0.2)],
        &[(High, "06:00", 1.4), (Low, "12:15", 0.2), (High, "18:20", 1.5)],
    ),
    (
        "Joal-Fadiouth",
        &[(High, "05:05", 1.4), (Low, "11:20", 0.3), (High, "17:25", 1.5), (Low, "23:30", 0.2)],
        &[(High, "05:50", 1.5), (Low, "12:05", 0.2), (High, "18:10", 1.6)],
    ),
    (
        "Kayar",
        &[(High, "05:40", 1.1), (Low, "11:55", 0.3), (High, "18:00", 1.2)],
        &[(Low, "00:05", 0.2), (High, "06:25", 1.2), (Low, "12:40", 0.2), (High, "18:45", 1.3)],
    ),
    (
        "Ziguinchor",
        &[(High, "07:20", 1.6), (Low, "13:40", 0.4), (High, "19:45", 1.7)],
        &[(Low, "01:50", 0.3), (High, "08:05", 1.7), (Low, "14:25", 0.3), (High, "20:30", 1.8)],
    ),
];

#[derive(Debug, Clone, PartialEq)]
struct LocationTides {
    name: String,
    today: Vec<TideEvent>,
    tomorrow: Vec<TideEvent>,
}

/// Result of a tide lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct TideLookup {
    pub schedule: TideSchedule,
    /// True when the requested location was unknown and the default was used.
    pub fell_back: bool,
}

#[derive(Debug, Clone)]
pub struct TideTable {
    entries: Vec<LocationTides>,
    default_location: String,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(rename = "location")]
    locations: Vec<FixtureLocation>,
}

#[derive(Debug, Deserialize)]
struct FixtureLocation {
    name: String,
    #[serde(default)]
    today: Vec<FixtureEvent>,
    #[serde(default)]
    tomorrow: Vec<FixtureEvent>,
}

#[derive(Debug, Deserialize)]
struct FixtureEvent {
    kind: TideKind,
    time: String,
    height: f64,
}

impl TideTable {
    pub fn builtin(default_location: &str) -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(name, today, tomorrow)| LocationTides {
                name: name.to_string(),
                today: today.iter().filter_map(builtin_event).collect(),
                tomorrow: tomorrow.iter().filter_map(builtin_event).collect(),
            })
            .collect();
        Self {
            entries,
            default_location: default_location.to_string(),
        }
    }

    pub fn from_path(path: &Path, default_location: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tide fixture: {}", path.display()))?;
        Self::from_toml(&content, default_location)
            .with_context(|| format!("Invalid tide fixture: {}", path.display()))
    }

    pub fn from_toml(content: &str, default_location: &str) -> Result<Self> {
        let fixture: Fixture = toml::from_str(content)?;
        if fixture.locations.is_empty() {
            bail!("tide fixture must define at least one [[location]]");
        }

        let mut entries = Vec::with_capacity(fixture.locations.len());
        for loc in fixture.locations {
            entries.push(LocationTides {
                today: parse_events(&loc.name, loc.today)?,
                tomorrow: parse_events(&loc.name, loc.tomorrow)?,
                name: loc.name,
            });
        }

        Ok(Self {
            entries,
            default_location: default_location.to_string(),
        })
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Looks up `location` by exact name, falling back to the default location.
    ///
    /// `now` is stamped on the schedule as its generation time.
    pub fn lookup(&self, location: &str, now: NaiveTime) -> TideLookup {
        let found = self.entries.iter().find(|e| e.name == location);
        let fell_back = found.is_none();
        let entry = found
            .or_else(|| self.entries.iter().find(|e| e.name == self.default_location))
            .or_else(|| self.entries.first());

        if fell_back {
            tracing::warn!(
                requested = location,
                used = entry.map(|e| e.name.as_str()).unwrap_or(""),
                "no tide schedule for location; using default"
            );
        }

        let schedule = match entry {
            Some(e) => TideSchedule {
                location: e.name.clone(),
                generated_at: truncate_to_minute(now),
                today: e.today.clone(),
                tomorrow: e.tomorrow.clone(),
            },
            None => TideSchedule {
                location: self.default_location.clone(),
                generated_at: truncate_to_minute(now),
                today: Vec::new(),
                tomorrow: Vec::new(),
            },
        };

        TideLookup {
            schedule,
            fell_back,
        }
    }
}

fn builtin_event(&(kind, time, height): &BuiltinEvent) -> Option<TideEvent> {
    NaiveTime::parse_from_str(time, "%H:%M")
        .ok()
        .map(|time| TideEvent { kind, time, height })
}

fn parse_events(location: &str, events: Vec<FixtureEvent>) -> Result<Vec<TideEvent>> {
    let mut out = events
        .into_iter()
        .map(|ev| {
            let time = NaiveTime::parse_from_str(&ev.time, "%H:%M").with_context(|| {
                format!("{}: invalid tide time '{}' (expected HH:MM)", location, ev.time)
            })?;
            Ok(TideEvent {
                kind: ev.kind,
                time,
                height: ev.height,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    out.sort_by_key(|e| e.time);
    Ok(out)
}

fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// Whether an event falls later today or tomorrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TideDay {
    Today,
    Tomorrow,
}

/// Tide phase at a moment plus the next extreme.
#[derive(Debug, Clone, PartialEq)]
pub struct TideStatus {
    pub phase: Option<TidePhase>,
    pub next: Option<(TideDay, TideEvent)>,
}

/// Computes the phase at `now` from today's events.
///
/// Within [`SLACK_MINUTES`] of an extreme the tide is stationary. Otherwise it
/// rises after a low and falls after a high. Before the first event of the
/// day, the direction is inferred from the kind of that first event.
pub fn tide_status(schedule: &TideSchedule, now: NaiveTime) -> TideStatus {
    let now_min = minutes_of_day(now);

    let slack = schedule
        .today
        .iter()
        .any(|e| (minutes_of_day(e.time) - now_min).abs() <= SLACK_MINUTES);

    let previous = schedule.today.iter().filter(|e| e.time <= now).last();
    let upcoming_today = schedule.today.iter().find(|e| e.time > now);

    let phase = if slack {
        Some(TidePhase::Stationary)
    } else {
        match (previous, upcoming_today) {
            (Some(prev), _) => Some(direction_after(prev.kind)),
            (None, Some(next)) => Some(direction_towards(next.kind)),
            (None, None) => None,
        }
    };

    let next = upcoming_today
        .map(|e| (TideDay::Today, e.clone()))
        .or_else(|| schedule.tomorrow.first().map(|e| (TideDay::Tomorrow, e.clone())));

    TideStatus { phase, next }
}

fn direction_after(kind: TideKind) -> TidePhase {
    match kind {
        TideKind::Low => TidePhase::Rising,
        TideKind::High => TidePhase::Falling,
    }
}

fn direction_towards(kind: TideKind) -> TidePhase {
    match kind {
        TideKind::High => TidePhase::Rising,
        TideKind::Low => TidePhase::Falling,
    }
}

fn minutes_of_day(t: NaiveTime) -> i64 {
    (t.hour() * 60 + t.minute()) as i64
}
