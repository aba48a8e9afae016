//! Typed in-memory store: strings with optional expiration, lists, and
//! append-only streams with monotonically increasing ids.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tokio::time::Instant;

use crate::clock;

/// A stream entry id, ordered by milliseconds first and sequence second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn new(ms: u64, seq: u64) -> Self {
        StreamId { ms, seq }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// One entry of a stream. Field order is the order the writer supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stream {
    entries: Vec<StreamEntry>,
    last_id: StreamId,
}

impl Stream {
    pub fn new() -> Self {
        Stream::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    pub fn first_entry(&self) -> Option<&StreamEntry> {
        self.entries.first()
    }

    pub fn last_entry(&self) -> Option<&StreamEntry> {
        self.entries.last()
    }

    /// Next sequence number an entry with timestamp `ms` may use.
    ///
    /// Timestamps at or below `last_id.ms` must continue that
    /// millisecond's sequence; newer timestamps start at 0.
    pub fn next_sequence_for(&self, ms: u64) -> Option<u64> {
        if self.entries.is_empty() && ms == 0 {
            // 0-0 is reserved, so the first entry of millisecond 0
            // starts at sequence 1.
            return Some(1);
        }

        if ms > self.last_id.ms {
            return Some(0);
        }

        if ms == self.last_id.ms {
            return self.last_id.seq.checked_add(1);
        }

        None
    }

    /// Appends an entry. Returns false (and leaves the stream untouched)
    /// when `id` does not exceed `last_id`.
    pub fn append(&mut self, id: StreamId, fields: Vec<(String, String)>) -> bool {
        if id <= self.last_id {
            return false;
        }

        self.entries.push(StreamEntry { id, fields });
        self.last_id = id;

        true
    }

    /// Entries with `start <= id <= end`.
    pub fn range(&self, start: StreamId, end: StreamId) -> &[StreamEntry] {
        let from = self.entries.partition_point(|entry| entry.id < start);
        let to = self.entries.partition_point(|entry| entry.id <= end);

        &self.entries[from..to]
    }

    /// Entries with `id > after`.
    pub fn entries_after(&self, after: StreamId) -> &[StreamEntry] {
        let from = self.entries.partition_point(|entry| entry.id <= after);

        &self.entries[from..]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    String(String),
    Array(VecDeque<String>),
    Stream(Stream),
}

impl DataType {
    pub fn type_name(&self) -> &'static str {
        match self {
            DataType::String(_) => "string",
            DataType::Array(_) => "list",
            DataType::Stream(_) => "stream",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub data: DataType,
    pub expiration: Option<Instant>,
}

impl Value {
    fn is_expired(&self, now: Instant) -> bool {
        self.expiration.is_some_and(|deadline| now > deadline)
    }
}

/// The key namespace. Expired keys are removed lazily whenever they are
/// looked up; there is no background sweeper.
#[derive(Debug, Default)]
pub struct KeyValueStore {
    entries: HashMap<String, Value>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        KeyValueStore {
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<&Value> {
        self.evict_if_expired(key);
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.evict_if_expired(key);
        self.entries.get_mut(key)
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Keys that are alive right now, expired entries dropped on the way.
    pub fn live_keys(&mut self) -> Vec<String> {
        let now = clock::now();

        self.entries.retain(|_, value| !value.is_expired(now));
        self.entries.keys().cloned().collect()
    }

    fn evict_if_expired(&mut self, key: &str) {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|value| value.is_expired(clock::now()));

        if expired {
            self.entries.remove(key);
        }
    }
}
