use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{GroupId, MemberId, MemberKind},
    error::{ApiError, ErrorCode},
    protocol::{
        AssignMembersRequest, Group, GroupPage, MemberPage, MemberPageBody, PageQuery,
        UnassignMembersRequest,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::error::GatewayError;

/// Depth requested when listing groups, so nested groups come back flattened.
const GROUP_LIST_LEVEL: u32 = 5;

#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn fetch_pool(&self, kind: MemberKind, query: &PageQuery)
        -> Result<MemberPage, GatewayError>;
}

#[async_trait]
pub trait GroupMembership: Send + Sync {
    async fn fetch_group(&self, group_id: &GroupId) -> Result<Group, GatewayError>;
    async fn fetch_members(
        &self,
        group_id: &GroupId,
        kind: MemberKind,
        query: &PageQuery,
    ) -> Result<MemberPage, GatewayError>;
    async fn bulk_assign(
        &self,
        group_id: &GroupId,
        kind: MemberKind,
        ids: &[MemberId],
    ) -> Result<(), GatewayError>;
    async fn bulk_unassign(&self, group_id: &GroupId, ids: &[MemberId])
        -> Result<(), GatewayError>;
}

/// Hook for the external authorization layer. It sees every outgoing request
/// and decides which credentials, if any, ride along.
pub trait RequestAuthorizer: Send + Sync {
    fn authorize(&self, url: &Url, request: RequestBuilder) -> RequestBuilder;
}

pub struct NoAuthorization;

impl RequestAuthorizer for NoAuthorization {
    fn authorize(&self, _url: &Url, request: RequestBuilder) -> RequestBuilder {
        request
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub groups: Url,
    pub users: Url,
    pub things: Url,
    pub channels: Url,
}

impl Endpoints {
    pub fn new(
        groups: &str,
        users: &str,
        things: &str,
        channels: &str,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            groups: parse_base(groups)?,
            users: parse_base(users)?,
            things: parse_base(things)?,
            channels: parse_base(channels)?,
        })
    }

    /// All four services mounted under one origin, e.g. behind a reverse proxy.
    pub fn from_base(base: &str) -> Result<Self, GatewayError> {
        let base = base.trim_end_matches('/');
        Self::new(
            &format!("{base}/groups"),
            &format!("{base}/users"),
            &format!("{base}/things"),
            &format!("{base}/channels"),
        )
    }

    pub fn directory(&self, kind: MemberKind) -> &Url {
        match kind {
            MemberKind::Account => &self.users,
            MemberKind::Device => &self.things,
            MemberKind::Channel => &self.channels,
        }
    }

    pub fn group(&self, group_id: &GroupId) -> Url {
        endpoint(&self.groups, &[group_id.as_str()])
    }

    pub fn group_members(&self, group_id: &GroupId, kind: MemberKind) -> Url {
        endpoint(&self.groups, &[kind.wire_name(), group_id.as_str()])
    }

    pub fn membership(&self, group_id: &GroupId) -> Url {
        endpoint(&self.groups, &[group_id.as_str(), "members"])
    }
}

fn parse_base(raw: &str) -> Result<Url, GatewayError> {
    let url = Url::parse(raw.trim()).map_err(|source| GatewayError::Url {
        url: raw.to_string(),
        source,
    })?;
    if url.cannot_be_a_base() {
        return Err(GatewayError::Url {
            url: raw.to_string(),
            source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        });
    }
    Ok(url)
}

fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

#[derive(Serialize)]
struct ListGroupsQuery<'a> {
    offset: u64,
    limit: u64,
    level: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

pub struct HttpGateway {
    http: Client,
    endpoints: Endpoints,
    authorizer: Arc<dyn RequestAuthorizer>,
}

impl HttpGateway {
    pub fn new(endpoints: Endpoints) -> Self {
        Self::with_client(Client::new(), endpoints)
    }

    pub fn with_client(http: Client, endpoints: Endpoints) -> Self {
        Self {
            http,
            endpoints,
            authorizer: Arc::new(NoAuthorization),
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn RequestAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub async fn list_groups(&self, query: &PageQuery) -> Result<GroupPage, GatewayError> {
        let url = self.endpoints.groups.clone();
        let request = self.http.get(url.clone()).query(&ListGroupsQuery {
            offset: query.offset,
            limit: query.limit,
            level: GROUP_LIST_LEVEL,
            name: query.name.as_deref(),
        });
        let body = self.execute(&url, request).await?;
        decode(&url, &body)
    }

    async fn execute(&self, url: &Url, request: RequestBuilder) -> Result<String, GatewayError> {
        let request = self.authorizer.authorize(url, request);
        let response = request.send().await.map_err(|source| GatewayError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| GatewayError::Transport {
            url: url.to_string(),
            source,
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&body)
                .ok()
                .map(|api_error| api_error.error);
            warn!(%url, status = status.as_u16(), ?message, "authority rejected request");
            return Err(GatewayError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                code: ErrorCode::from_status(status.as_u16()),
                message,
            });
        }

        debug!(%url, status = status.as_u16(), bytes = body.len(), "authority responded");
        Ok(body)
    }
}

fn decode<T: DeserializeOwned>(url: &Url, body: &str) -> Result<T, GatewayError> {
    serde_json::from_str(body).map_err(|source| GatewayError::Decode {
        url: url.to_string(),
        source,
    })
}

#[async_trait]
impl MemberDirectory for HttpGateway {
    async fn fetch_pool(
        &self,
        kind: MemberKind,
        query: &PageQuery,
    ) -> Result<MemberPage, GatewayError> {
        let url = self.endpoints.directory(kind).clone();
        let request = self.http.get(url.clone()).query(query);
        let body = self.execute(&url, request).await?;
        let page: MemberPageBody = decode(&url, &body)?;
        Ok(page.into_page(kind))
    }
}

#[async_trait]
impl GroupMembership for HttpGateway {
    async fn fetch_group(&self, group_id: &GroupId) -> Result<Group, GatewayError> {
        let url = self.endpoints.group(group_id);
        let request = self.http.get(url.clone());
        let body = self.execute(&url, request).await?;
        decode(&url, &body)
    }

    async fn fetch_members(
        &self,
        group_id: &GroupId,
        kind: MemberKind,
        query: &PageQuery,
    ) -> Result<MemberPage, GatewayError> {
        let url = self.endpoints.group_members(group_id, kind);
        let request = self.http.get(url.clone()).query(query);
        let body = self.execute(&url, request).await?;
        let page: MemberPageBody = decode(&url, &body)?;
        Ok(page.into_page(kind))
    }

    async fn bulk_assign(
        &self,
        group_id: &GroupId,
        kind: MemberKind,
        ids: &[MemberId],
    ) -> Result<(), GatewayError> {
        let url = self.endpoints.membership(group_id);
        let request = self.http.post(url.clone()).json(&AssignMembersRequest {
            members: ids.to_vec(),
            kind,
        });
        self.execute(&url, request).await?;
        Ok(())
    }

    async fn bulk_unassign(
        &self,
        group_id: &GroupId,
        ids: &[MemberId],
    ) -> Result<(), GatewayError> {
        let url = self.endpoints.membership(group_id);
        let request = self.http.delete(url.clone()).json(&UnassignMembersRequest {
            members: ids.to_vec(),
        });
        self.execute(&url, request).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
