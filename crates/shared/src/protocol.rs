use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{GroupId, MemberId, MemberKind};

pub const DEFAULT_PAGE_LIMIT: u64 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<GroupId>,
    #[serde(default)]
    pub level: u32,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub member_counts: BTreeMap<MemberKind, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupPage {
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
}

/// An account, device or channel. Only `id` takes part in membership
/// decisions; the remaining fields are for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub id: MemberId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl MemberRecord {
    pub fn new(id: impl Into<MemberId>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
            metadata: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Display label: the email for accounts, the name for devices and channels.
    pub fn label(&self, kind: MemberKind) -> &str {
        let preferred = match kind {
            MemberKind::Account => self.email.as_deref(),
            MemberKind::Device | MemberKind::Channel => self.name.as_deref(),
        };
        preferred.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberPage {
    pub rows: Vec<MemberRecord>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

/// Response body of both the group membership listing and the per-kind
/// directory listing. The rows live under a key named after the kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberPageBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<MemberRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub things: Option<Vec<MemberRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<MemberRecord>>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
}

impl MemberPageBody {
    pub fn from_page(kind: MemberKind, page: MemberPage) -> Self {
        let mut body = Self {
            total: page.total,
            offset: page.offset,
            limit: page.limit,
            ..Self::default()
        };
        match kind {
            MemberKind::Account => body.users = Some(page.rows),
            MemberKind::Device => body.things = Some(page.rows),
            MemberKind::Channel => body.channels = Some(page.rows),
        }
        body
    }

    pub fn into_page(self, kind: MemberKind) -> MemberPage {
        let rows = match kind {
            MemberKind::Account => self.users,
            MemberKind::Device => self.things,
            MemberKind::Channel => self.channels,
        };
        MemberPage {
            rows: rows.unwrap_or_default(),
            total: self.total,
            offset: self.offset,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    pub offset: u64,
    pub limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PageQuery {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit,
            name: None,
        }
    }
}

impl Default for PageQuery {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignMembersRequest {
    pub members: Vec<MemberId>,
    #[serde(rename = "type")]
    pub kind: MemberKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignMembersRequest {
    pub members: Vec<MemberId>,
}
