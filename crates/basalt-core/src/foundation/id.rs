//! Strongly-typed platform identifiers.
//!
//! Every entity on the platform is addressed by a 64-bit snowflake. Wrapping
//! each kind in its own newtype keeps a `UserId` from ever being passed where a
//! `GuildId` is expected. On the wire (JSON, config files) identifiers are
//! accepted both as numbers and as decimal strings.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw snowflake value.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw snowflake value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(SnowflakeVisitor).map(Self)
            }
        }
    };
}

struct SnowflakeVisitor;

impl Visitor<'_> for SnowflakeVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a snowflake as an unsigned integer or decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        u64::try_from(v).map_err(|_| E::custom("snowflake must not be negative"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        v.trim().parse().map_err(E::custom)
    }
}

snowflake!(
    /// Identifies a user account.
    UserId
);
snowflake!(
    /// Identifies a guild (server).
    GuildId
);
snowflake!(
    /// Identifies a text channel.
    ChannelId
);
snowflake!(
    /// Identifies a message.
    MessageId
);
snowflake!(
    /// Identifies a single interaction.
    InteractionId
);
snowflake!(
    /// Identifies the bot's application.
    ApplicationId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_number_and_string() {
        let a: UserId = serde_json::from_str("42").unwrap();
        let b: UserId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get(), 42);
    }

    #[test]
    fn test_serialize_as_string() {
        let id = GuildId::new(1_234_567_890_123);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"1234567890123\"");
    }

    #[test]
    fn test_negative_rejected() {
        assert!(serde_json::from_str::<UserId>("-1").is_err());
    }
}
