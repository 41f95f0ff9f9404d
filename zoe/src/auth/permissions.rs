//! Role-based route guards.
//!
//! Handlers that need a specific platform role take [`RequiresRole`] instead of
//! [`CurrentUser`]; the role set is chosen at the type level:
//!
//! ```ignore
//! async fn create_user(RequiresRole(admin, ..): RequiresRole<AdminOnly>) -> Result<...> { ... }
//! ```

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{AppState, api::models::users::CurrentUser, errors::Error, types::Role};

/// A set of roles allowed through a guard.
pub trait RoleSet: Send + Sync + 'static {
    const ROLES: &'static [Role];

    fn allows(role: Role) -> bool {
        Self::ROLES.contains(&role)
    }
}

/// Only platform admins.
#[derive(Debug, Clone, Copy)]
pub struct AdminOnly;

impl RoleSet for AdminOnly {
    const ROLES: &'static [Role] = &[Role::Admin];
}

/// Platform admins and moderators.
#[derive(Debug, Clone, Copy)]
pub struct AdminOrModerator;

impl RoleSet for AdminOrModerator {
    const ROLES: &'static [Role] = &[Role::Admin, Role::Moderator];
}

/// Check a user's role against a role set.
pub fn require_role<R: RoleSet>(user: &CurrentUser) -> Result<(), Error> {
    if R::allows(user.role) {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions {
            required: R::ROLES.to_vec(),
            actual: user.role,
        })
    }
}

/// An authenticated user whose role is in `R`.
#[derive(Debug, Clone)]
pub struct RequiresRole<R: RoleSet>(pub CurrentUser, pub PhantomData<R>);

impl<R: RoleSet> FromRequestParts<AppState> for RequiresRole<R> {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        require_role::<R>(&user)?;
        Ok(RequiresRole(user, PhantomData))
    }
}
