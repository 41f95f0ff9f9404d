//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut SqliteConnection` (a pooled connection or an open
//! transaction), binds parameters, and returns the models from [`crate::db::models`].
//! Handlers decide the transaction boundaries:
//!
//! ```ignore
//! use zoe::db::handlers::{Repository, Users};
//!
//! let mut tx = pool.begin().await?;
//! let user = Users::new(&mut tx).create(&request).await?;
//! tx.commit().await?;
//! ```
//!
//! - [`Users`]: accounts, credentials and login counters
//! - [`Devices`]: the devices each user has logged in from
//! - [`Groups`]: groups and their memberships
//! - [`LoginLogs`]: the login audit trail
//! - [`Notifications`]: per-user notification inbox

pub mod devices;
pub mod groups;
pub mod login_logs;
pub mod notifications;
pub mod repository;
pub mod users;

pub use devices::Devices;
pub use groups::Groups;
pub use login_logs::LoginLogs;
pub use notifications::Notifications;
pub use repository::Repository;
pub use users::Users;

/// `%term%` for a `LIKE ... ESCAPE '\'` substring match, with the term's own wildcards escaped.
///
/// SQLite's `LIKE` already ignores ASCII case, so the term is not folded.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::contains_pattern;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("ann"), "%ann%");
        assert_eq!(contains_pattern("50%_off"), r"%50\%\_off%");
        assert_eq!(contains_pattern(r"a\b"), r"%a\\b%");
    }
}
