//! Journal entries.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::day::DayZone;

/// Opaque entry identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A journal entry for one logical day.
///
/// `day` is optional only because records arriving from sync may lack it; such
/// entries cannot be placed on a calendar day and are skipped by streaks and
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    #[serde(default)]
    pub day: Option<DateTime<Utc>>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, with = "photo_base64", skip_serializing_if = "Option::is_none")]
    pub photo: Option<Vec<u8>>,
    #[serde(default)]
    pub is_starred: bool,
    #[serde(default)]
    pub mood_score: Option<i16>,
    #[serde(default)]
    pub energy_score: Option<i16>,
    #[serde(default)]
    pub weather_score: Option<i16>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    /// Fresh, empty entry for `day`.
    pub fn new(day: NaiveDate, zone: &DayZone, now: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::new(),
            day: Some(zone.start_of(day)),
            text: None,
            photo: None,
            is_starred: false,
            mood_score: None,
            energy_score: None,
            weather_score: None,
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Calendar day this entry belongs to, or `None` for a malformed entry.
    pub fn day_key(&self, zone: &DayZone) -> Option<NaiveDate> {
        self.day.map(|d| zone.day_of(d))
    }

    /// Whitespace-only text counts as empty.
    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn has_photo(&self) -> bool {
        self.photo.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Stamp a local modification.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Photos travel as base64 in JSON so sync payloads stay text.
mod photo_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
