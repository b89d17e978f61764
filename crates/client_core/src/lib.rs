pub mod controller;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod reconcile;
pub mod view;

pub use controller::{
    ControllerOptions, MembershipController, MembershipEvent, MembershipSnapshot,
    DEFAULT_DIRECTORY_LIMIT,
};
pub use error::{FetchTarget, GatewayError, MembershipError, MutationAction};
pub use gateway::{
    Endpoints, GroupMembership, HttpGateway, MemberDirectory, NoAuthorization, RequestAuthorizer,
};
pub use notify::{NotificationSink, TracingNotifier};
pub use reconcile::reconcile;
pub use view::{PageCursor, PaginatedView, Paging, SelectionSet, ViewKind};
