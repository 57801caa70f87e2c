//! Condition bookkeeping
//!
//! [`StatusTracker`] owns the fetched resource for the duration of a
//! reconcile. Every condition change is persisted right away; a change that
//! leaves type and status as they are is not written at all.

use kube::Resource;
use tracing::debug;

use crate::crd::{Condition, HasConditions};
use crate::resources::store::ResourceStore;

pub mod condition_types {
    pub const CONNECTED: &str = "postgres.brose.bike/connected";
    pub const DATABASE_EXISTS: &str = "postgres.brose.bike/database-exists";
    pub const EXTENSIONS_INSTALLED: &str = "postgres.brose.bike/extensions-installed";
    pub const LOGIN_ROLE_EXISTS: &str = "postgres.brose.bike/login-role-exists";
    pub const DATABASE_ATTACHMENTS_READY: &str = "postgres.brose.bike/database-attachments-ready";
}

pub mod reasons {
    pub const CONNECTION_SUCCEEDED: &str = "ConnectionSucceeded";
    pub const CONNECTION_FAILED: &str = "ConnectionFailed";
    pub const DATABASE_EXISTS: &str = "DatabaseExists";
    pub const DATABASE_MISSING: &str = "DatabaseMissing";
    pub const ALL_EXTENSIONS_PRESENT: &str = "AllExtensionsArePresent";
    pub const LOGIN_ROLE_EXISTS: &str = "LoginRoleExists";
    pub const LOGIN_ROLE_DELETED: &str = "LoginRoleDeleted";
    pub const ATTACHMENTS_CONVERGED: &str = "AttachmentsConverged";
    pub const ATTACHMENT_FAILED: &str = "AttachmentFailed";

    pub fn missing_extension(extension: &str) -> String {
        format!("MissingExtension-{extension}")
    }
}

/// Placeholder message for conditions that carry nothing to say
pub const NO_MESSAGE: &str = "-";

pub struct StatusTracker<'a, K> {
    store: &'a dyn ResourceStore<K>,
    resource: K,
}

impl<'a, K> StatusTracker<'a, K>
where
    K: Resource + HasConditions,
{
    pub fn new(store: &'a dyn ResourceStore<K>, resource: K) -> Self {
        Self { store, resource }
    }

    pub fn resource(&self) -> &K {
        &self.resource
    }

    /// Upsert a condition and persist it if type or status changed
    ///
    /// Returns whether a write happened.
    pub async fn set(
        &mut self,
        type_: &str,
        status: bool,
        reason: &str,
        message: &str,
    ) -> kube::Result<bool> {
        let condition = Condition::new(
            type_,
            status,
            reason,
            message,
            self.resource.meta().generation,
        );
        if !self.resource.conditions_mut().upsert(condition) {
            return Ok(false);
        }
        debug!(condition = %type_, status = status, reason = %reason, "Updating condition");
        self.store.patch_status(&self.resource).await?;
        Ok(true)
    }
}
