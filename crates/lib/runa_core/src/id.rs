// Time-sortable numeric identifiers.
//
// Layout (63 usable bits): 41 bits of milliseconds since `EPOCH_MS`, 10 bits of
// node id, 12 bits of per-millisecond sequence. Each entity kind draws from its
// own node so ids never collide across collections.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Custom epoch (2019-01-01T00:00:00Z) in unix milliseconds.
const EPOCH_MS: i64 = 1_546_300_800_000;

const NODE_BITS: u32 = 10;
const SEQ_BITS: u32 = 12;
const SEQ_MASK: i64 = (1 << SEQ_BITS) - 1;

/// Generator node per entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Users = 1,
    Pages = 2,
    RefreshTokens = 3,
}

/// Immutable, time-sortable identifier.
///
/// Serialized as a decimal string so JavaScript clients keep full precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snowflake(i64);

impl Snowflake {
    pub const fn from_i64(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    /// Generate the next id for `node`.
    pub fn generate(node: Node) -> Self {
        GENERATORS[node as usize - 1].next(node as i64)
    }

    /// Milliseconds since the unix epoch encoded in the id.
    pub fn timestamp_ms(self) -> i64 {
        (self.0 >> (NODE_BITS + SEQ_BITS)) + EPOCH_MS
    }
}

struct Generator {
    state: Mutex<(i64, i64)>,
}

impl Generator {
    const fn new() -> Self {
        Self {
            state: Mutex::new((0, 0)),
        }
    }

    fn next(&self, node: i64) -> Snowflake {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (last_ms, seq) = *state;
        let mut now = chrono::Utc::now().timestamp_millis() - EPOCH_MS;
        // Clock went backwards or sequence exhausted: stay on the last millisecond
        // and borrow from the future instead of handing out duplicates.
        if now < last_ms {
            now = last_ms;
        }
        let next_seq = if now == last_ms { (seq + 1) & SEQ_MASK } else { 0 };
        if now == last_ms && next_seq == 0 {
            now += 1;
        }
        *state = (now, next_seq);
        Snowflake((now << (NODE_BITS + SEQ_BITS)) | (node << SEQ_BITS) | next_seq)
    }
}

static GENERATORS: [Generator; 3] = [Generator::new(), Generator::new(), Generator::new()];

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Snowflake {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Snowflake)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnowflakeVisitor;

        impl Visitor<'_> for SnowflakeVisitor {
            type Value = Snowflake;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer id or its decimal string form")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Snowflake, E> {
                Ok(Snowflake(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Snowflake, E> {
                i64::try_from(v)
                    .map(Snowflake)
                    .map_err(|_| E::custom("id out of range"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Snowflake, E> {
                v.parse().map_err(|_| E::custom("invalid id"))
            }
        }

        deserializer.deserialize_any(SnowflakeVisitor)
    }
}
