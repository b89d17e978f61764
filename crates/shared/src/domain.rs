use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::UnknownMemberKind;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(GroupId);
id_newtype!(MemberId);

/// The kinds of entity a group can hold.
///
/// On the wire the authority names the kinds after the services that own them
/// (`users`, `things`, `channels`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum MemberKind {
    #[default]
    #[serde(rename = "users")]
    Account,
    #[serde(rename = "things")]
    Device,
    #[serde(rename = "channels")]
    Channel,
}

impl MemberKind {
    pub const ALL: [MemberKind; 3] = [MemberKind::Account, MemberKind::Device, MemberKind::Channel];

    /// Plural name used in URL paths, request bodies and response keys.
    pub fn wire_name(self) -> &'static str {
        match self {
            MemberKind::Account => "users",
            MemberKind::Device => "things",
            MemberKind::Channel => "channels",
        }
    }

    pub fn noun(self) -> &'static str {
        match self {
            MemberKind::Account => "account",
            MemberKind::Device => "device",
            MemberKind::Channel => "channel",
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun())
    }
}

impl FromStr for MemberKind {
    type Err = UnknownMemberKind;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "account" | "accounts" | "user" | "users" => Ok(MemberKind::Account),
            "device" | "devices" | "thing" | "things" => Ok(MemberKind::Device),
            "channel" | "channels" => Ok(MemberKind::Channel),
            _ => Err(UnknownMemberKind(raw.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nouns_and_wire_names() {
        assert_eq!("account".parse::<MemberKind>().unwrap(), MemberKind::Account);
        assert_eq!("things".parse::<MemberKind>().unwrap(), MemberKind::Device);
        assert_eq!(" Channels ".parse::<MemberKind>().unwrap(), MemberKind::Channel);
    }

    #[test]
    fn unknown_kind_fails_loudly() {
        let err = "gateways".parse::<MemberKind>().expect_err("should fail");
        assert_eq!(err.0, "gateways");
        assert!(err.to_string().contains("gateways"));
    }

    #[test]
    fn serializes_with_wire_names() {
        for kind in MemberKind::ALL {
            let encoded = serde_json::to_string(&kind).expect("encode");
            assert_eq!(encoded, format!("\"{}\"", kind.wire_name()));
        }
    }

    #[test]
    fn ids_are_transparent_strings() {
        let id = MemberId::from("u1");
        assert_eq!(serde_json::to_string(&id).expect("encode"), "\"u1\"");
    }
}
