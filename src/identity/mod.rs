//! Identity service client contract.
//!
//! The identity service owns accounts, sub-users and roles.  The gateway
//! only reads from it: to turn a login into an account, and to translate
//! role-tag names to role identifiers and back.

pub mod memory;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// An account (namespace owner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub uuid: String,
    pub login: String,
    /// Operators may write into job output and report trees.
    pub is_operator: bool,
}

/// A sub-user of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uuid: String,
    pub login: String,
    /// Role identifiers active by default for this user.
    pub default_roles: Vec<String>,
}

/// Async identity service contract.
pub trait IdentityService: Send + Sync + 'static {
    /// Look up an account by login.
    fn get_account(
        &self,
        login: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Account>>> + Send + '_>>;

    /// Look up a sub-user of `account_uuid` by login.
    fn get_user(
        &self,
        account_uuid: &str,
        login: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<User>>> + Send + '_>>;

    /// Resolve role names of an account to role identifiers.  Every
    /// requested name is present in the result; unknown names map to
    /// `None`.
    fn resolve_names(
        &self,
        account_uuid: &str,
        names: &[String],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<HashMap<String, Option<String>>>> + Send + '_>>;

    /// Resolve role identifiers to role names.  Unknown identifiers are
    /// missing from the result.
    fn resolve_identifiers(
        &self,
        identifiers: &[String],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<HashMap<String, String>>> + Send + '_>>;
}
