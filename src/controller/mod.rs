pub mod context;
pub mod database_reconciler;
pub mod error;
pub mod finalizer;
pub mod instance_reconciler;
pub mod status;
pub mod user_reconciler;

pub use context::{Context, DatabaseContext, InstanceContext, Settings, UserContext};
pub use database_reconciler::{database_error_policy, reconcile_database};
pub use error::{Error, Result};
pub use finalizer::{DATABASE_FINALIZER, USER_FINALIZER};
pub use instance_reconciler::{instance_error_policy, reconcile_instance};
pub use status::{NO_MESSAGE, StatusTracker, condition_types, reasons};
pub use user_reconciler::{reconcile_user, user_error_policy};
