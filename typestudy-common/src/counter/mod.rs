//! Participant counter model
//!
//! The whole deployment shares one counter document (`counter.json`) that maps
//! device identifiers to participant records. Each participant owns up to
//! [`MAX_PERSONS`] person slots; slot 1 is open from the start and every
//! further slot is unlocked by the first completed submission of the slot
//! before it.
//!
//! All mutation happens in memory on a [`CounterRecord`]; persisting the
//! document is the caller's concern.

pub mod allocator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

pub use allocator::{first_missing_positive, format_participant_id, parse_participant_id};

/// Highest person slot a participant can unlock
pub const MAX_PERSONS: u8 = 5;

/// Top-level map written by older deployments, keyed `<deviceId>_U###`
const LEGACY_PARTICIPANTS_KEY: &str = "participants";

/// Person slot number, always within `1..=MAX_PERSONS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Person(u8);

impl Person {
    /// Slot that is unlocked when a participant is created
    pub const FIRST: Person = Person(1);

    pub fn new(number: u64) -> Result<Self> {
        if (1..=MAX_PERSONS as u64).contains(&number) {
            Ok(Person(number as u8))
        } else {
            Err(Error::InvalidInput(format!(
                "person must be between 1 and {}, got {}",
                MAX_PERSONS, number
            )))
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// The slot unlocked by this one, if any
    pub fn next(self) -> Option<Person> {
        (self.0 < MAX_PERSONS).then(|| Person(self.0 + 1))
    }

    /// Key used for this slot in the `persons` map
    pub fn key(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Person {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let number = s
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::InvalidInput(format!("person must be a number, got {:?}", s)))?;
        Person::new(number)
    }
}

impl Serialize for Person {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

// Browsers send the slot either as `2` or `"2"`
impl<'de> Deserialize<'de> for Person {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        let person = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Person::new(n),
            Raw::Text(s) => s.parse(),
        };
        person.map_err(serde::de::Error::custom)
    }
}

/// Per-slot counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonSlot {
    #[serde(default)]
    pub session_count: u32,
    #[serde(default)]
    pub completed_submissions: u32,
    #[serde(default)]
    pub last_access: Option<DateTime<Utc>>,
}

/// Everything known about the participant assigned to one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantData {
    pub participant_id: String,
    #[serde(default)]
    pub persons: BTreeMap<String, PersonSlot>,
    #[serde(default)]
    pub last_access: Option<DateTime<Utc>>,
    #[serde(default)]
    pub registered_at: Option<DateTime<Utc>>,
}

impl ParticipantData {
    fn new(participant_id: String, now: DateTime<Utc>) -> Self {
        let mut persons = BTreeMap::new();
        persons.insert(Person::FIRST.key(), PersonSlot::default());
        Self {
            participant_id,
            persons,
            last_access: Some(now),
            registered_at: Some(now),
        }
    }

    /// Slot 1 is always open; later slots only once they have an entry
    pub fn is_unlocked(&self, person: Person) -> bool {
        person == Person::FIRST || self.persons.contains_key(&person.key())
    }

    pub fn slot(&self, person: Person) -> Option<&PersonSlot> {
        self.persons.get(&person.key())
    }

    /// Unlocked slot numbers in ascending order
    pub fn unlocked_persons(&self) -> Vec<Person> {
        let mut unlocked: Vec<Person> = self
            .persons
            .keys()
            .filter_map(|k| k.parse().ok())
            .collect();
        if !unlocked.contains(&Person::FIRST) {
            unlocked.push(Person::FIRST);
        }
        unlocked.sort();
        unlocked
    }

    fn open_slot(&mut self, person: Person) -> Result<&mut PersonSlot> {
        if !self.is_unlocked(person) {
            return Err(Error::InvalidInput(format!(
                "person {} is locked for participant {}",
                person, self.participant_id
            )));
        }
        Ok(self.persons.entry(person.key()).or_default())
    }
}

/// Result of looking up or creating a participant
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub participant_id: String,
    pub registered_at: Option<DateTime<Utc>>,
    pub is_new: bool,
}

/// Result of opening a new session for a person slot
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStart {
    pub participant_id: String,
    pub person: Person,
    pub session_number: u32,
    pub is_new: bool,
    pub participant: ParticipantData,
}

/// Result of recording a completed submission
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub participant_id: String,
    pub person: Person,
    pub session_count: u32,
    pub completed_submissions: u32,
    /// Slot unlocked by this completion, if any
    pub unlocked: Option<Person>,
}

/// The shared counter document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterRecord {
    /// Highest participant number ever issued
    #[serde(default)]
    pub last_id: u32,
    #[serde(default)]
    pub device_participants: BTreeMap<String, ParticipantData>,
    /// Fields written by older deployments, kept verbatim on rewrite
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CounterRecord {
    /// Parse the stored document; an empty file is an empty counter
    pub fn from_json(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn participant(&self, device_id: &str) -> Option<&ParticipantData> {
        self.device_participants.get(device_id)
    }

    /// Numeric suffixes of every identifier recorded in this document
    ///
    /// Includes the keys of the legacy `participants` map, which are
    /// `<deviceId>_U###`.
    pub fn issued_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        let current = self
            .device_participants
            .values()
            .filter_map(|p| parse_participant_id(&p.participant_id));

        let legacy = self
            .extra
            .get(LEGACY_PARTICIPANTS_KEY)
            .and_then(serde_json::Value::as_object)
            .into_iter()
            .flat_map(|map| map.keys())
            .filter_map(|key| legacy_key_number(key));

        current.chain(legacy)
    }

    /// Look up the participant for `device_id`, creating it if needed
    ///
    /// `external` carries numbers already in use outside this document,
    /// typically participant folders found in storage. A new participant
    /// gets the lowest number free in both.
    pub fn register<I>(&mut self, device_id: &str, external: I, now: DateTime<Utc>) -> Result<Registration>
    where
        I: IntoIterator<Item = u32>,
    {
        let device_id = validate_device_id(device_id)?;

        if let Some(existing) = self.device_participants.get_mut(device_id) {
            existing.last_access = Some(now);
            return Ok(Registration {
                participant_id: existing.participant_id.clone(),
                registered_at: existing.registered_at,
                is_new: false,
            });
        }

        let number = first_missing_positive(self.issued_numbers().chain(external));
        let participant_id = format_participant_id(number);
        self.last_id = self.last_id.max(number);

        tracing::info!(
            device_id = %device_id,
            participant_id = %participant_id,
            "Assigned new participant"
        );

        self.device_participants.insert(
            device_id.to_string(),
            ParticipantData::new(participant_id.clone(), now),
        );

        Ok(Registration {
            participant_id,
            registered_at: Some(now),
            is_new: true,
        })
    }

    /// Start a session for `person` (slot 1 when absent)
    ///
    /// Registers the device first if it is unknown. Fails when the slot has
    /// not been unlocked yet.
    pub fn contact<I>(
        &mut self,
        device_id: &str,
        person: Option<Person>,
        external: I,
        now: DateTime<Utc>,
    ) -> Result<SessionStart>
    where
        I: IntoIterator<Item = u32>,
    {
        let person = person.unwrap_or(Person::FIRST);
        let registration = self.register(device_id, external, now)?;

        let participant = self
            .device_participants
            .get_mut(device_id.trim())
            .ok_or_else(|| Error::Internal(format!("participant vanished for {}", device_id)))?;

        let slot = participant.open_slot(person)?;
        slot.session_count += 1;
        slot.last_access = Some(now);
        let session_number = slot.session_count;
        participant.last_access = Some(now);

        Ok(SessionStart {
            participant_id: registration.participant_id,
            person,
            session_number,
            is_new: registration.is_new,
            participant: participant.clone(),
        })
    }

    /// Record a completed submission for `person`
    ///
    /// The first completion of a slot unlocks the next one. The device must
    /// already be known.
    pub fn complete(&mut self, device_id: &str, person: Person, now: DateTime<Utc>) -> Result<Completion> {
        let device_id = validate_device_id(device_id)?;

        let participant = self
            .device_participants
            .get_mut(device_id)
            .ok_or_else(|| Error::NotFound(format!("device {} not found in counter", device_id)))?;

        let slot = participant.open_slot(person)?;
        slot.completed_submissions += 1;
        slot.last_access = Some(now);
        let session_count = slot.session_count;
        let completed_submissions = slot.completed_submissions;
        participant.last_access = Some(now);

        let mut unlocked = None;
        if completed_submissions == 1 {
            if let Some(next) = person.next() {
                if !participant.persons.contains_key(&next.key()) {
                    participant.persons.insert(next.key(), PersonSlot::default());
                    tracing::info!(
                        participant_id = %participant.participant_id,
                        person = %next,
                        "Unlocked next person"
                    );
                    unlocked = Some(next);
                }
            }
        }

        Ok(Completion {
            participant_id: participant.participant_id.clone(),
            person,
            session_count,
            completed_submissions,
            unlocked,
        })
    }
}

/// `U###` suffix of a legacy `<deviceId>_U###` key
fn legacy_key_number(key: &str) -> Option<u32> {
    let (_, suffix) = key.rsplit_once('_')?;
    parse_participant_id(suffix)
}

fn validate_device_id(device_id: &str) -> Result<&str> {
    let trimmed = device_id.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("deviceId is required".to_string()));
    }
    Ok(trimmed)
}
