mod auth;
mod config;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    ControllerOptions, GatewayError, HttpGateway, MembershipController, MembershipError,
    MembershipSnapshot, PaginatedView, TracingNotifier, ViewKind,
};
use shared::{
    domain::{GroupId, MemberId, MemberKind},
    protocol::{Group, MemberRecord, PageQuery},
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::{auth::TokenAuthorizer, config::Settings};

#[derive(Parser, Debug)]
#[command(name = "groupctl", about = "Inspect and edit group memberships")]
struct Cli {
    #[arg(long, default_value = "groupctl.toml")]
    config: PathBuf,
    /// Overrides every service url with `<base>/groups`, `<base>/users`, ...
    #[arg(long)]
    base_url: Option<String>,
    /// Takes precedence over `token` in the settings file and environment.
    #[arg(long)]
    token: Option<String>,
    /// Used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_filter: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List groups visible to the session.
    Groups {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show a group's members and assignable candidates.
    Show {
        group_id: String,
        #[arg(long, default_value_t = MemberKind::Account)]
        kind: MemberKind,
        #[arg(long)]
        members_offset: Option<u64>,
        #[arg(long)]
        members_limit: Option<u64>,
        #[arg(long)]
        candidates_offset: Option<u64>,
        #[arg(long)]
        candidates_limit: Option<u64>,
    },
    /// Add members of one kind to a group.
    Assign {
        group_id: String,
        #[arg(long, default_value_t = MemberKind::Account)]
        kind: MemberKind,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Remove members of one kind from a group.
    Unassign {
        group_id: String,
        #[arg(long, default_value_t = MemberKind::Account)]
        kind: MemberKind,
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_filter);

    let mut settings = config::load_settings(&cli.config)?;
    if let Some(base) = cli.base_url.as_deref() {
        settings.set_base_url(base);
    }
    if cli.token.is_some() {
        settings.token = cli.token.clone();
    }
    debug!(groups = %settings.groups_url, users = %settings.users_url, "settings loaded");

    let gateway = Arc::new(build_gateway(&settings)?);
    match run(cli.command, &settings, gateway).await {
        Err(err) if expired(&err, &settings) => {
            eprintln!("session expired or not authorized; sign in again and pass a fresh --token");
            Err(err)
        }
        other => other,
    }
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_gateway(settings: &Settings) -> Result<HttpGateway> {
    let authorizer = TokenAuthorizer::new(
        settings.token.clone(),
        &settings.users_url,
        settings.auth_bypass_prefixes.clone(),
    );
    Ok(HttpGateway::new(settings.endpoints()?).with_authorizer(Arc::new(authorizer)))
}

fn expired(err: &anyhow::Error, settings: &Settings) -> bool {
    let gateway_err = err
        .downcast_ref::<MembershipError>()
        .and_then(MembershipError::gateway)
        .or_else(|| err.downcast_ref::<GatewayError>());
    gateway_err.is_some_and(|e| auth::session_expired(e, &settings.auth_bypass_prefixes))
}

async fn run(command: Command, settings: &Settings, gateway: Arc<HttpGateway>) -> Result<()> {
    match command {
        Command::Groups {
            offset,
            limit,
            name,
        } => {
            let query = PageQuery {
                offset,
                limit: limit.unwrap_or(settings.page_limit),
                name,
            };
            let page = gateway.list_groups(&query).await?;
            println!(
                "groups {}-{} of {}",
                page.offset,
                page.offset + page.groups.len() as u64,
                page.total
            );
            for group in &page.groups {
                println!("  {:<38} {}", group.id.as_str(), group.name);
            }
            Ok(())
        }
        Command::Show {
            group_id,
            kind,
            members_offset,
            members_limit,
            candidates_offset,
            candidates_limit,
        } => {
            let controller = open(settings, gateway, group_id, kind);
            let group = controller.load().await?;

            if let Some(limit) = members_limit {
                controller.on_limit_change(ViewKind::Members, limit).await?;
            }
            if let Some(offset) = members_offset {
                controller.on_page_change(ViewKind::Members, offset).await;
            }
            if let Some(limit) = candidates_limit {
                controller.on_limit_change(ViewKind::Candidates, limit).await?;
            }
            if let Some(offset) = candidates_offset {
                controller.on_page_change(ViewKind::Candidates, offset).await;
            }

            render(&group, &controller.snapshot().await);
            cycle_outcome(&controller, settings).await
        }
        Command::Assign {
            group_id,
            kind,
            ids,
        } => {
            let controller = open(settings, gateway, group_id, kind);
            let group = controller.load().await?;
            controller.select_for_assign(member_ids(ids)?).await;
            controller.assign().await?;
            render(&group, &controller.snapshot().await);
            cycle_outcome(&controller, settings).await
        }
        Command::Unassign {
            group_id,
            kind,
            ids,
        } => {
            let controller = open(settings, gateway, group_id, kind);
            let group = controller.load().await?;
            controller.select_for_unassign(member_ids(ids)?).await;
            controller.unassign().await?;
            render(&group, &controller.snapshot().await);
            cycle_outcome(&controller, settings).await
        }
    }
}

fn open(
    settings: &Settings,
    gateway: Arc<HttpGateway>,
    group_id: String,
    kind: MemberKind,
) -> Arc<MembershipController> {
    let options = ControllerOptions {
        page_limit: settings.page_limit,
        directory_limit: settings.directory_limit,
        initial_kind: kind,
    };
    info!(%group_id, %kind, "opening group");
    MembershipController::new_with_options(
        GroupId::from(group_id),
        gateway.clone(),
        gateway,
        Arc::new(TracingNotifier),
        options,
    )
}

/// Turns the last cycle's fetch failures into the command's error, preferring
/// one that means the session is no longer accepted.
async fn cycle_outcome(controller: &MembershipController, settings: &Settings) -> Result<()> {
    let mut failures = controller.take_fetch_errors().await;
    if failures.is_empty() {
        return Ok(());
    }
    let pick = failures
        .iter()
        .position(|err| {
            err.gateway()
                .is_some_and(|e| auth::session_expired(e, &settings.auth_bypass_prefixes))
        })
        .unwrap_or(0);
    Err(failures.swap_remove(pick).into())
}

fn member_ids(raw: Vec<String>) -> Result<Vec<MemberId>> {
    let ids: Vec<MemberId> = raw
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .map(MemberId::from)
        .collect();
    if ids.is_empty() {
        bail!("at least one non-blank member id is required");
    }
    Ok(ids)
}

fn render(group: &Group, snapshot: &MembershipSnapshot) {
    println!("group {} ({})", group.name, group.id);
    if let Some(description) = group.description.as_deref() {
        println!("  {description}");
    }
    render_view("members", snapshot.kind, &snapshot.members, snapshot.members.rows());
    render_view(
        "candidates",
        snapshot.kind,
        &snapshot.candidates,
        snapshot.candidates.visible_rows(),
    );
}

fn render_view(title: &str, kind: MemberKind, view: &PaginatedView, rows: &[MemberRecord]) {
    println!(
        "{title} ({}s) offset={} limit={} total={}",
        kind,
        view.offset(),
        view.limit(),
        view.total()
    );
    if rows.is_empty() {
        println!("  (none)");
    }
    for row in rows {
        println!("  {:<38} {}", row.id.as_str(), row.label(kind));
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use client_core::{GroupMembership, MemberDirectory};
    use shared::protocol::MemberPage;

    use super::*;

    /// Users service that rejects the token while the groups service accepts it.
    struct ExpiredUsersService;

    #[async_trait]
    impl MemberDirectory for ExpiredUsersService {
        async fn fetch_pool(
            &self,
            _kind: MemberKind,
            _query: &PageQuery,
        ) -> Result<MemberPage, GatewayError> {
            Err(GatewayError::status("http://localhost/users", 401, "Unauthorized"))
        }
    }

    #[async_trait]
    impl GroupMembership for ExpiredUsersService {
        async fn fetch_group(&self, _group_id: &GroupId) -> Result<Group, GatewayError> {
            Err(GatewayError::status("http://localhost/groups/g1", 404, "Not Found"))
        }

        async fn fetch_members(
            &self,
            _group_id: &GroupId,
            _kind: MemberKind,
            query: &PageQuery,
        ) -> Result<MemberPage, GatewayError> {
            Ok(MemberPage {
                rows: vec![MemberRecord::new("u1")],
                total: 1,
                offset: query.offset,
                limit: query.limit,
            })
        }

        async fn bulk_assign(
            &self,
            _group_id: &GroupId,
            _kind: MemberKind,
            _ids: &[MemberId],
        ) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn bulk_unassign(
            &self,
            _group_id: &GroupId,
            _ids: &[MemberId],
        ) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn expired_users_controller() -> Arc<MembershipController> {
        let service = Arc::new(ExpiredUsersService);
        MembershipController::new(
            GroupId::from("g1"),
            service.clone(),
            service,
            Arc::new(TracingNotifier),
        )
    }

    #[tokio::test]
    async fn rejected_directory_fetch_reports_expired_session() {
        let settings = Settings::default();
        let controller = expired_users_controller();

        controller.refresh().await;
        let err = cycle_outcome(&controller, &settings)
            .await
            .expect_err("directory rejected");

        assert!(expired(&err, &settings));
        assert_eq!(controller.snapshot().await.members.total(), 1);
    }

    #[tokio::test]
    async fn bypassed_directory_rejection_is_not_an_expired_session() {
        let settings = Settings {
            auth_bypass_prefixes: vec!["http://localhost/users".to_string()],
            ..Settings::default()
        };
        let controller = expired_users_controller();

        controller.refresh().await;
        let err = cycle_outcome(&controller, &settings)
            .await
            .expect_err("directory rejected");

        assert!(!expired(&err, &settings));
    }

    #[test]
    fn parses_show_with_kind_and_paging() {
        let cli = Cli::try_parse_from([
            "groupctl",
            "show",
            "g1",
            "--kind",
            "things",
            "--candidates-limit",
            "5",
        ])
        .expect("parse");
        match cli.command {
            Command::Show {
                group_id,
                kind,
                candidates_limit,
                members_offset,
                ..
            } => {
                assert_eq!(group_id, "g1");
                assert_eq!(kind, MemberKind::Device);
                assert_eq!(candidates_limit, Some(5));
                assert_eq!(members_offset, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn assign_requires_ids() {
        assert!(Cli::try_parse_from(["groupctl", "assign", "g1"]).is_err());
        assert!(Cli::try_parse_from(["groupctl", "assign", "g1", "--kind", "robot", "u1"]).is_err());
    }

    #[test]
    fn blank_member_ids_are_rejected() {
        assert!(member_ids(vec![" ".to_string()]).is_err());
        let ids = member_ids(vec![" u1 ".to_string(), "u2".to_string()]).expect("ids");
        assert_eq!(ids, vec![MemberId::from("u1"), MemberId::from("u2")]);
    }

    #[test]
    fn expired_session_is_detected_through_controller_errors() {
        let settings = Settings::default();
        let err = anyhow::Error::new(MembershipError::Fetch {
            target: client_core::FetchTarget::Group,
            source: GatewayError::status("http://localhost/groups/g1", 401, "Unauthorized"),
        });
        assert!(expired(&err, &settings));

        let validation = anyhow::Error::new(MembershipError::Validation("nope".to_string()));
        assert!(!expired(&validation, &settings));
    }
}
