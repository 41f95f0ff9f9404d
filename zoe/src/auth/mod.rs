//! Authentication and authorization.
//!
//! # Authentication methods
//!
//! Requests authenticate in one of two ways, tried in this order by the
//! [`CurrentUser`](crate::api::models::users::CurrentUser) extractor:
//!
//! 1. **Session token**: `Authorization: Bearer <jwt>` as issued by `POST /auth/login`. The token
//!    only authenticates while its user is still active.
//! 2. **API key**: the user's id, in the `x-api-key` header or the `apiKey` query parameter (both
//!    names are configurable). Every attempt is written to the login log.
//!
//! # Authorization
//!
//! Platform roles (`admin`, `moderator`, `user`) gate routes through
//! [`permissions::RequiresRole`]. Resource rules, such as "admin or self" and group permission
//! flags, are checked in the handlers.
//!
//! # Modules
//!
//! - [`current_user`]: the authenticating extractor
//! - [`device`]: device fingerprinting and user-agent parsing
//! - [`password`]: Argon2 hashing and temporary passwords
//! - [`permissions`]: role guards
//! - [`session`]: JWT session tokens

pub mod current_user;
pub mod device;
pub mod password;
pub mod permissions;
pub mod session;
