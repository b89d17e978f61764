use std::sync::Arc;

use shared::{
    domain::{GroupId, MemberId, MemberKind},
    protocol::{Group, MemberPage, MemberRecord, PageQuery},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::{FetchTarget, GatewayError, MembershipError, MutationAction},
    gateway::{GroupMembership, MemberDirectory},
    notify::NotificationSink,
    reconcile::reconcile,
    view::{PageCursor, PaginatedView, Paging, SelectionSet, ViewKind},
};

pub const DEFAULT_DIRECTORY_LIMIT: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub page_limit: u64,
    /// Page size requested from the member directory. The candidates view is
    /// paginated locally over this pool.
    pub directory_limit: u64,
    pub initial_kind: MemberKind,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            page_limit: PageCursor::default().limit,
            directory_limit: DEFAULT_DIRECTORY_LIMIT,
            initial_kind: MemberKind::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    GroupLoaded { group_id: GroupId },
    ViewsReset { kind: MemberKind, generation: u64 },
    ViewUpdated { view: ViewKind, generation: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MembershipSnapshot {
    pub group_id: GroupId,
    pub kind: MemberKind,
    pub generation: u64,
    pub members: Arc<PaginatedView>,
    pub candidates: Arc<PaginatedView>,
    pub to_assign: SelectionSet,
    pub to_unassign: SelectionSet,
}

struct ControllerState {
    group_id: GroupId,
    group: Option<Group>,
    kind: MemberKind,
    generation: u64,
    members_cursor: PageCursor,
    candidates_cursor: PageCursor,
    members: Arc<PaginatedView>,
    candidates: Arc<PaginatedView>,
    directory_pool: Option<Vec<MemberRecord>>,
    members_landed: bool,
    fetch_errors: Vec<MembershipError>,
    to_assign: SelectionSet,
    to_unassign: SelectionSet,
}

struct FetchCycle {
    generation: u64,
    group_id: GroupId,
    kind: MemberKind,
    members_cursor: PageCursor,
    directory_query: PageQuery,
}

impl ControllerState {
    fn new(group_id: GroupId, options: &ControllerOptions) -> Self {
        let cursor = PageCursor::new(options.page_limit);
        Self {
            group_id,
            group: None,
            kind: options.initial_kind,
            generation: 0,
            members_cursor: cursor,
            candidates_cursor: cursor,
            members: Arc::new(PaginatedView::empty(Paging::Server, cursor)),
            candidates: Arc::new(PaginatedView::empty(Paging::Client, cursor)),
            directory_pool: None,
            members_landed: false,
            fetch_errors: Vec::new(),
            to_assign: SelectionSet::default(),
            to_unassign: SelectionSet::default(),
        }
    }

    fn begin_cycle(&mut self, directory_limit: u64) -> FetchCycle {
        self.generation += 1;
        self.candidates_cursor.offset = 0;
        self.members = Arc::new(PaginatedView::empty(Paging::Server, self.members_cursor));
        self.candidates = Arc::new(PaginatedView::empty(Paging::Client, self.candidates_cursor));
        self.directory_pool = None;
        self.members_landed = false;
        self.fetch_errors.clear();
        self.to_assign = SelectionSet::default();
        self.to_unassign = SelectionSet::default();

        FetchCycle {
            generation: self.generation,
            group_id: self.group_id.clone(),
            kind: self.kind,
            members_cursor: self.members_cursor,
            directory_query: PageQuery::new(0, directory_limit),
        }
    }

    // Candidates wait for this cycle's members; returns whether the view changed.
    fn reconcile_candidates(&mut self) -> bool {
        if !self.members_landed {
            return false;
        }
        let Some(pool) = &self.directory_pool else {
            return false;
        };
        let rows = reconcile(self.members.rows(), pool);
        self.candidates = Arc::new(PaginatedView::client_rows(rows, self.candidates_cursor));
        true
    }

    fn snapshot(&self) -> MembershipSnapshot {
        MembershipSnapshot {
            group_id: self.group_id.clone(),
            kind: self.kind,
            generation: self.generation,
            members: Arc::clone(&self.members),
            candidates: Arc::clone(&self.candidates),
            to_assign: self.to_assign.clone(),
            to_unassign: self.to_unassign.clone(),
        }
    }
}

pub struct MembershipController {
    directory: Arc<dyn MemberDirectory>,
    membership: Arc<dyn GroupMembership>,
    notifier: Arc<dyn NotificationSink>,
    options: ControllerOptions,
    state: Mutex<ControllerState>,
    events: broadcast::Sender<MembershipEvent>,
}

impl MembershipController {
    pub fn new(
        group_id: GroupId,
        directory: Arc<dyn MemberDirectory>,
        membership: Arc<dyn GroupMembership>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Arc<Self> {
        Self::new_with_options(
            group_id,
            directory,
            membership,
            notifier,
            ControllerOptions::default(),
        )
    }

    pub fn new_with_options(
        group_id: GroupId,
        directory: Arc<dyn MemberDirectory>,
        membership: Arc<dyn GroupMembership>,
        notifier: Arc<dyn NotificationSink>,
        options: ControllerOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            directory,
            membership,
            notifier,
            state: Mutex::new(ControllerState::new(group_id, &options)),
            options,
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> MembershipSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn group(&self) -> Option<Group> {
        self.state.lock().await.group.clone()
    }

    /// Fetch failures of the current cycle. They are also sent to the
    /// notifier as they happen; taking them clears the record.
    pub async fn take_fetch_errors(&self) -> Vec<MembershipError> {
        std::mem::take(&mut self.state.lock().await.fetch_errors)
    }

    pub async fn load(&self) -> Result<Group, MembershipError> {
        let group_id = self.state.lock().await.group_id.clone();
        let group = match self.membership.fetch_group(&group_id).await {
            Ok(group) => group,
            Err(source) => {
                self.notifier.error("Failed to fetch group", &source.detail());
                return Err(MembershipError::Fetch {
                    target: FetchTarget::Group,
                    source,
                });
            }
        };

        info!(group_id = %group_id, name = %group.name, "group loaded");
        self.state.lock().await.group = Some(group.clone());
        let _ = self.events.send(MembershipEvent::GroupLoaded { group_id });

        self.refresh().await;
        Ok(group)
    }

    /// Always refreshes, even when `kind` is already active.
    pub async fn set_member_kind(&self, kind: MemberKind) {
        let cycle = {
            let mut state = self.state.lock().await;
            state.kind = kind;
            state.members_cursor = PageCursor::new(self.options.page_limit);
            state.candidates_cursor = PageCursor::new(self.options.page_limit);
            state.begin_cycle(self.options.directory_limit)
        };
        self.run_cycle(cycle).await;
    }

    pub async fn refresh(&self) {
        let cycle = self
            .state
            .lock()
            .await
            .begin_cycle(self.options.directory_limit);
        self.run_cycle(cycle).await;
    }

    async fn run_cycle(&self, cycle: FetchCycle) {
        info!(
            group_id = %cycle.group_id,
            kind = %cycle.kind,
            generation = cycle.generation,
            offset = cycle.members_cursor.offset,
            limit = cycle.members_cursor.limit,
            "refreshing group membership"
        );
        let _ = self.events.send(MembershipEvent::ViewsReset {
            kind: cycle.kind,
            generation: cycle.generation,
        });

        let directory = async {
            let result = self
                .directory
                .fetch_pool(cycle.kind, &cycle.directory_query)
                .await;
            self.apply_directory(&cycle, result).await;
        };
        let members = async {
            let result = self
                .membership
                .fetch_members(&cycle.group_id, cycle.kind, &cycle.members_cursor.query())
                .await;
            self.apply_members(&cycle, result).await;
        };
        futures::join!(directory, members);
    }

    async fn apply_directory(&self, cycle: &FetchCycle, result: Result<MemberPage, GatewayError>) {
        let failure = {
            let mut state = self.state.lock().await;
            if state.generation != cycle.generation {
                debug!(
                    stale = cycle.generation,
                    current = state.generation,
                    "dropping stale directory response"
                );
                return;
            }
            match result {
                Ok(page) => {
                    debug!(kind = %cycle.kind, rows = page.rows.len(), "directory pool landed");
                    state.directory_pool = Some(page.rows);
                    if state.reconcile_candidates() {
                        let _ = self.events.send(MembershipEvent::ViewUpdated {
                            view: ViewKind::Candidates,
                            generation: cycle.generation,
                        });
                    }
                    None
                }
                Err(source) => {
                    let err = MembershipError::Fetch {
                        target: FetchTarget::Directory(cycle.kind),
                        source,
                    };
                    warn!(error = %err, "candidates view left empty");
                    let detail = fetch_detail(&err);
                    state.fetch_errors.push(err);
                    Some(detail)
                }
            }
        };

        if let Some(detail) = failure {
            self.notifier
                .error(&format!("Failed to fetch {}s", cycle.kind), &detail);
        }
    }

    async fn apply_members(&self, cycle: &FetchCycle, result: Result<MemberPage, GatewayError>) {
        let failure = {
            let mut state = self.state.lock().await;
            if state.generation != cycle.generation {
                debug!(
                    stale = cycle.generation,
                    current = state.generation,
                    "dropping stale members response"
                );
                return;
            }
            let failure = match result {
                Ok(page) => {
                    debug!(
                        kind = %cycle.kind,
                        rows = page.rows.len(),
                        total = page.total,
                        "group members landed"
                    );
                    state.members = Arc::new(PaginatedView::server_page(page, cycle.members_cursor));
                    let _ = self.events.send(MembershipEvent::ViewUpdated {
                        view: ViewKind::Members,
                        generation: cycle.generation,
                    });
                    None
                }
                Err(source) => {
                    let err = MembershipError::Fetch {
                        target: FetchTarget::Members(cycle.kind),
                        source,
                    };
                    warn!(error = %err, "members view left empty");
                    let detail = fetch_detail(&err);
                    state.fetch_errors.push(err);
                    Some(detail)
                }
            };
            state.members_landed = true;
            if state.reconcile_candidates() {
                let _ = self.events.send(MembershipEvent::ViewUpdated {
                    view: ViewKind::Candidates,
                    generation: cycle.generation,
                });
            }
            failure
        };

        if let Some(detail) = failure {
            self.notifier.error("Failed to fetch group members", &detail);
        }
    }

    pub async fn select_for_assign(&self, ids: impl IntoIterator<Item = MemberId>) {
        self.state.lock().await.to_assign = SelectionSet::from_ids(ids);
    }

    pub async fn select_for_unassign(&self, ids: impl IntoIterator<Item = MemberId>) {
        self.state.lock().await.to_unassign = SelectionSet::from_ids(ids);
    }

    pub async fn assign(&self) -> Result<(), MembershipError> {
        self.mutate(MutationAction::Assign).await
    }

    pub async fn unassign(&self) -> Result<(), MembershipError> {
        self.mutate(MutationAction::Unassign).await
    }

    async fn mutate(&self, action: MutationAction) -> Result<(), MembershipError> {
        let (group_id, kind, ids) = {
            let state = self.state.lock().await;
            let selection = match action {
                MutationAction::Assign => &state.to_assign,
                MutationAction::Unassign => &state.to_unassign,
            };
            (state.group_id.clone(), state.kind, selection.to_vec())
        };

        if ids.is_empty() {
            let message = format!("{kind}(s) must be provided");
            self.notifier.warn(&message, "");
            return Err(MembershipError::Validation(message));
        }

        let result = match action {
            MutationAction::Assign => self.membership.bulk_assign(&group_id, kind, &ids).await,
            MutationAction::Unassign => self.membership.bulk_unassign(&group_id, &ids).await,
        };

        match result {
            Ok(()) => {
                info!(group_id = %group_id, kind = %kind, count = ids.len(), %action, "membership updated");
                let message = match action {
                    MutationAction::Assign => format!("Successfully assigned {kind}(s) to Group"),
                    MutationAction::Unassign => {
                        format!("Successfully unassigned {kind}(s) from Group")
                    }
                };
                self.notifier.success(&message, "");
                self.refresh().await;
                Ok(())
            }
            Err(source) => {
                warn!(
                    group_id = %group_id,
                    kind = %kind,
                    %action,
                    error = %source,
                    "membership update rejected"
                );
                let message = match action {
                    MutationAction::Assign => format!("Failed to assign {kind}(s) to Group"),
                    MutationAction::Unassign => format!("Failed to unassign {kind}(s) from Group"),
                };
                self.notifier.error(&message, &source.detail());
                Err(MembershipError::Mutation {
                    action,
                    kind,
                    source,
                })
            }
        }
    }

    pub async fn on_limit_change(&self, view: ViewKind, limit: u64) -> Result<(), MembershipError> {
        if limit == 0 {
            let message = "page limit must be positive".to_string();
            self.notifier.warn(&message, "");
            return Err(MembershipError::Validation(message));
        }
        self.move_cursor(view, PageCursor { offset: 0, limit }).await;
        Ok(())
    }

    pub async fn on_page_change(&self, view: ViewKind, offset: u64) {
        let limit = {
            let state = self.state.lock().await;
            match view {
                ViewKind::Members => state.members_cursor.limit,
                ViewKind::Candidates => state.candidates_cursor.limit,
            }
        };
        self.move_cursor(view, PageCursor { offset, limit }).await;
    }

    /// The members view is server-paginated and refetches; the candidates view
    /// is a local projection and only swaps its cursor.
    async fn move_cursor(&self, view: ViewKind, cursor: PageCursor) {
        match view {
            ViewKind::Members => {
                let cycle = {
                    let mut state = self.state.lock().await;
                    state.members_cursor = cursor;
                    state.begin_cycle(self.options.directory_limit)
                };
                self.run_cycle(cycle).await;
            }
            ViewKind::Candidates => {
                let generation = {
                    let mut state = self.state.lock().await;
                    state.candidates_cursor = cursor;
                    state.candidates = Arc::new(state.candidates.with_cursor(cursor));
                    state.generation
                };
                debug!(offset = cursor.offset, limit = cursor.limit, "candidates page moved");
                let _ = self.events.send(MembershipEvent::ViewUpdated {
                    view: ViewKind::Candidates,
                    generation,
                });
            }
        }
    }
}

fn fetch_detail(err: &MembershipError) -> String {
    err.gateway()
        .map(GatewayError::detail)
        .unwrap_or_else(|| err.to_string())
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
