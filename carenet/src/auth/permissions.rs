//! Permission checking and access control.
//!
//! Each role maps to a static set of (resource, operation) grants. A grant
//! for an `*All` operation also satisfies the corresponding `*Own`
//! requirement, and the `is_admin` flag satisfies everything.
//!
//! Handlers declare their coarse requirement in the signature via the
//! [`RequiresPermission`] extractor:
//!
//! ```ignore
//! pub async fn release_escrow(
//!     State(state): State<AppState>,
//!     current_user: RequiresPermission<resource::Escrows, operation::UpdateOwn>,
//! ) -> Result<Json<EscrowResponse>> { ... }
//! ```
//!
//! The extractor authenticates the caller and rejects with 403 if no role
//! grants the required permission. Ownership checks (is this *your* job,
//! escrow, patient) still happen in the handler afterwards.

use std::marker::PhantomData;
use std::ops::Deref;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    AppState,
    api::models::users::{CurrentUser, Role},
    errors::{Error, Result},
    types::{Operation, Permission, Resource},
};

/// Marker types for resources, used as type parameters to [`RequiresPermission`].
pub mod resource {
    pub struct Users;
    pub struct Agencies;
    pub struct Patients;
    pub struct Jobs;
    pub struct Payments;
    pub struct Escrows;
    pub struct Disputes;
    pub struct Feedback;
    pub struct CareLogs;
    pub struct Analytics;
}

/// Marker types for operations, used as type parameters to [`RequiresPermission`].
pub mod operation {
    pub struct CreateAll;
    pub struct CreateOwn;
    pub struct ReadAll;
    pub struct ReadOwn;
    pub struct UpdateAll;
    pub struct UpdateOwn;
    pub struct DeleteAll;
    pub struct DeleteOwn;
}

/// Maps a marker type to its [`Resource`] value.
pub trait ResourceMarker {
    const RESOURCE: Resource;
}

/// Maps a marker type to its [`Operation`] value.
pub trait OperationMarker {
    const OPERATION: Operation;
}

macro_rules! resource_marker {
    ($($name:ident),* $(,)?) => {
        $(impl ResourceMarker for resource::$name {
            const RESOURCE: Resource = Resource::$name;
        })*
    };
}

macro_rules! operation_marker {
    ($($name:ident),* $(,)?) => {
        $(impl OperationMarker for operation::$name {
            const OPERATION: Operation = Operation::$name;
        })*
    };
}

resource_marker!(Users, Agencies, Patients, Jobs, Payments, Escrows, Disputes, Feedback, CareLogs, Analytics);
operation_marker!(CreateAll, CreateOwn, ReadAll, ReadOwn, UpdateAll, UpdateOwn, DeleteAll, DeleteOwn);

/// Static permission grants for a role.
fn role_grants(role: &Role) -> &'static [(Resource, Operation)] {
    use Operation::*;
    use Resource::*;

    match role {
        Role::Admin => &[
            (Users, CreateAll),
            (Users, ReadAll),
            (Users, UpdateAll),
            (Users, DeleteAll),
            (Agencies, CreateAll),
            (Agencies, ReadAll),
            (Agencies, UpdateAll),
            (Agencies, DeleteAll),
            (Patients, CreateAll),
            (Patients, ReadAll),
            (Patients, UpdateAll),
            (Patients, DeleteAll),
            (Jobs, CreateAll),
            (Jobs, ReadAll),
            (Jobs, UpdateAll),
            (Jobs, DeleteAll),
            (Payments, CreateAll),
            (Payments, ReadAll),
            (Payments, UpdateAll),
            (Escrows, CreateAll),
            (Escrows, ReadAll),
            (Escrows, UpdateAll),
            (Disputes, CreateAll),
            (Disputes, ReadAll),
            (Disputes, UpdateAll),
            (Feedback, ReadAll),
            (Feedback, DeleteAll),
            (CareLogs, ReadAll),
            (Analytics, ReadAll),
        ],
        // Moderators arbitrate: broad read access, KYC and dispute powers,
        // escrow refund/create, but no user deletion.
        Role::Moderator => &[
            (Users, ReadAll),
            (Users, UpdateAll),
            (Agencies, ReadAll),
            (Agencies, UpdateAll),
            (Patients, ReadAll),
            (Jobs, ReadAll),
            (Jobs, UpdateAll),
            (Payments, CreateAll),
            (Payments, ReadAll),
            (Payments, UpdateAll),
            (Escrows, CreateAll),
            (Escrows, ReadAll),
            (Escrows, UpdateAll),
            (Disputes, CreateAll),
            (Disputes, ReadAll),
            (Disputes, UpdateAll),
            (Feedback, ReadAll),
            (CareLogs, ReadAll),
            (Analytics, ReadAll),
        ],
        Role::Guardian => &[
            (Users, ReadOwn),
            (Users, UpdateOwn),
            (Users, DeleteOwn),
            (Patients, CreateOwn),
            (Patients, ReadOwn),
            (Patients, UpdateOwn),
            (Patients, DeleteOwn),
            (Jobs, CreateOwn),
            (Jobs, ReadOwn),
            (Jobs, UpdateOwn),
            (Jobs, DeleteOwn),
            (Payments, CreateOwn),
            (Payments, ReadOwn),
            (Escrows, ReadOwn),
            (Escrows, UpdateOwn),
            (Disputes, CreateOwn),
            (Disputes, ReadOwn),
            (Feedback, CreateOwn),
            (Feedback, ReadOwn),
            (CareLogs, ReadOwn),
        ],
        Role::Caregiver => &[
            (Users, ReadOwn),
            (Users, UpdateOwn),
            (Jobs, ReadOwn),
            (Jobs, UpdateOwn),
            (Escrows, ReadOwn),
            (Escrows, UpdateOwn),
            (Disputes, CreateOwn),
            (Disputes, ReadOwn),
            (Feedback, CreateOwn),
            (Feedback, ReadOwn),
            (CareLogs, CreateOwn),
            (CareLogs, ReadOwn),
        ],
        Role::Agency => &[
            (Users, ReadOwn),
            (Users, UpdateOwn),
            (Agencies, CreateOwn),
            (Agencies, ReadOwn),
            (Agencies, UpdateOwn),
            (Agencies, DeleteOwn),
            (Jobs, ReadOwn),
            (Jobs, UpdateOwn),
            (Payments, ReadOwn),
            (Escrows, ReadOwn),
            (Escrows, UpdateOwn),
            (Disputes, CreateOwn),
            (Disputes, ReadOwn),
            (Feedback, CreateOwn),
            (Feedback, ReadOwn),
            (CareLogs, ReadOwn),
        ],
    }
}

/// Does a granted operation satisfy a required one?
///
/// An `*All` grant covers the matching `*Own` requirement.
fn operation_satisfies(granted: Operation, required: Operation) -> bool {
    use Operation::*;

    granted == required
        || matches!(
            (granted, required),
            (CreateAll, CreateOwn) | (ReadAll, ReadOwn) | (UpdateAll, UpdateOwn) | (DeleteAll, DeleteOwn)
        )
}

/// Check whether a user holds a permission for (resource, operation).
pub fn has_permission(user: &CurrentUser, resource: Resource, operation: Operation) -> bool {
    if user.is_admin {
        return true;
    }

    user.roles.iter().any(|role| {
        role_grants(role)
            .iter()
            .any(|(r, o)| *r == resource && operation_satisfies(*o, operation))
    })
}

/// Convenience check for unrestricted read access to a resource.
///
/// Handlers use this to decide between role-scoped and unscoped listings.
pub fn can_read_all_resources(user: &CurrentUser, resource: Resource) -> bool {
    has_permission(user, resource, Operation::ReadAll)
}

/// Error for permission checks that happen after extraction, e.g. ownership
/// checks inside a handler.
pub fn permission_denied(resource: Resource, operation: Operation) -> Error {
    Error::InsufficientPermissions {
        required: Permission::Allow(resource, operation),
        action: operation,
        resource: format!("{resource:?}"),
    }
}

/// Extractor that authenticates the caller and enforces a permission.
///
/// Dereferences to [`CurrentUser`] so handlers can use the authenticated
/// user directly.
pub struct RequiresPermission<R, O> {
    pub user: CurrentUser,
    _resource: PhantomData<R>,
    _operation: PhantomData<O>,
}

impl<R, O> Deref for RequiresPermission<R, O> {
    type Target = CurrentUser;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl<R, O> FromRequestParts<AppState> for RequiresPermission<R, O>
where
    R: ResourceMarker + Send,
    O: OperationMarker + Send,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;

        if !has_permission(&user, R::RESOURCE, O::OPERATION) {
            return Err(Error::InsufficientPermissions {
                required: Permission::Allow(R::RESOURCE, O::OPERATION),
                action: O::OPERATION,
                resource: format!("{:?}", R::RESOURCE),
            });
        }

        Ok(Self {
            user,
            _resource: PhantomData,
            _operation: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user_with_roles(roles: Vec<Role>) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            username: "test".to_string(),
            email: "test@example.com".to_string(),
            is_admin: false,
            roles,
            display_name: None,
        }
    }

    #[test]
    fn test_admin_flag_grants_everything() {
        let mut user = user_with_roles(vec![]);
        user.is_admin = true;

        assert!(has_permission(&user, Resource::Users, Operation::DeleteAll));
        assert!(has_permission(&user, Resource::Analytics, Operation::ReadAll));
        assert!(has_permission(&user, Resource::Escrows, Operation::CreateAll));
    }

    #[test]
    fn test_guardian_cannot_refund_escrow() {
        let user = user_with_roles(vec![Role::Guardian]);

        // Release on own escrow is allowed
        assert!(has_permission(&user, Resource::Escrows, Operation::UpdateOwn));
        // Refund requires UpdateAll (moderator/admin only)
        assert!(!has_permission(&user, Resource::Escrows, Operation::UpdateAll));
        assert!(!has_permission(&user, Resource::Escrows, Operation::CreateAll));
    }

    #[test]
    fn test_moderator_escrow_and_dispute_powers() {
        let user = user_with_roles(vec![Role::Moderator]);

        assert!(has_permission(&user, Resource::Escrows, Operation::CreateAll));
        assert!(has_permission(&user, Resource::Escrows, Operation::UpdateAll));
        assert!(has_permission(&user, Resource::Disputes, Operation::UpdateAll));
        assert!(has_permission(&user, Resource::Analytics, Operation::ReadAll));
        // Moderators cannot delete users
        assert!(!has_permission(&user, Resource::Users, Operation::DeleteAll));
    }

    #[test]
    fn test_all_grant_covers_own_requirement() {
        let user = user_with_roles(vec![Role::Moderator]);

        // Moderator has Jobs ReadAll, which covers the ReadOwn requirement
        assert!(has_permission(&user, Resource::Jobs, Operation::ReadOwn));
        assert!(can_read_all_resources(&user, Resource::Jobs));
    }

    #[test]
    fn test_own_grant_does_not_cover_all_requirement() {
        let user = user_with_roles(vec![Role::Guardian]);

        assert!(has_permission(&user, Resource::Jobs, Operation::ReadOwn));
        assert!(!has_permission(&user, Resource::Jobs, Operation::ReadAll));
        assert!(!can_read_all_resources(&user, Resource::Jobs));
    }

    #[test]
    fn test_caregiver_care_log_creation() {
        let caregiver = user_with_roles(vec![Role::Caregiver]);
        let guardian = user_with_roles(vec![Role::Guardian]);

        assert!(has_permission(&caregiver, Resource::CareLogs, Operation::CreateOwn));
        assert!(!has_permission(&guardian, Resource::CareLogs, Operation::CreateOwn));
        // Guardians can still read care logs for their jobs
        assert!(has_permission(&guardian, Resource::CareLogs, Operation::ReadOwn));
    }

    #[test]
    fn test_multiple_roles_union() {
        let user = user_with_roles(vec![Role::Guardian, Role::Agency]);

        // From Agency
        assert!(has_permission(&user, Resource::Agencies, Operation::CreateOwn));
        // From Guardian
        assert!(has_permission(&user, Resource::Patients, Operation::CreateOwn));
    }

    #[test]
    fn test_analytics_restricted_to_staff() {
        for role in [Role::Guardian, Role::Caregiver, Role::Agency] {
            let user = user_with_roles(vec![role]);
            assert!(
                !has_permission(&user, Resource::Analytics, Operation::ReadAll),
                "analytics should be staff-only"
            );
        }
    }
}
