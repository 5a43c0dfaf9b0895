//! In-memory identity service.
//!
//! Seeded from the `identity` section of the configuration.  Useful for
//! testing and single-node deployments.  Uses `RwLock<HashMap>` for
//! thread-safe access.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use super::{Account, IdentityService, User};
use crate::config::IdentityConfig;

#[derive(Debug, Default)]
struct Inner {
    /// login -> account
    accounts: HashMap<String, Account>,
    /// (account uuid, login) -> user
    users: HashMap<(String, String), User>,
    /// (account uuid, role name) -> role uuid
    role_ids: HashMap<(String, String), String>,
    /// role uuid -> role name
    role_names: HashMap<String, String>,
}

pub struct MemoryIdentityService {
    inner: RwLock<Inner>,
}

impl Default for MemoryIdentityService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityService {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Build a service holding every account declared in `config`.
    pub fn from_config(config: &IdentityConfig) -> Self {
        let service = Self::new();
        for account in &config.accounts {
            service.add_account(Account {
                uuid: account.uuid.clone(),
                login: account.login.clone(),
                is_operator: account.operator,
            });
            for (name, uuid) in &account.roles {
                service.add_role(&account.uuid, name, uuid);
            }
            for user in &account.users {
                let default_roles = user
                    .default_roles
                    .iter()
                    .filter_map(|name| account.roles.get(name).cloned())
                    .collect();
                service.add_user(
                    &account.uuid,
                    User {
                        uuid: user.uuid.clone(),
                        login: user.login.clone(),
                        default_roles,
                    },
                );
            }
        }
        service
    }

    pub fn add_account(&self, account: Account) {
        let mut inner = self.inner.write().expect("rwlock poisoned");
        inner.accounts.insert(account.login.clone(), account);
    }

    pub fn add_user(&self, account_uuid: &str, user: User) {
        let mut inner = self.inner.write().expect("rwlock poisoned");
        inner
            .users
            .insert((account_uuid.to_string(), user.login.clone()), user);
    }

    pub fn add_role(&self, account_uuid: &str, name: &str, uuid: &str) {
        let mut inner = self.inner.write().expect("rwlock poisoned");
        inner
            .role_ids
            .insert((account_uuid.to_string(), name.to_string()), uuid.to_string());
        inner
            .role_names
            .insert(uuid.to_string(), name.to_string());
    }
}

impl IdentityService for MemoryIdentityService {
    fn get_account(
        &self,
        login: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Account>>> + Send + '_>> {
        let login = login.to_string();
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            Ok(inner.accounts.get(&login).cloned())
        })
    }

    fn get_user(
        &self,
        account_uuid: &str,
        login: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<User>>> + Send + '_>> {
        let key = (account_uuid.to_string(), login.to_string());
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            Ok(inner.users.get(&key).cloned())
        })
    }

    fn resolve_names(
        &self,
        account_uuid: &str,
        names: &[String],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<HashMap<String, Option<String>>>> + Send + '_>>
    {
        let account_uuid = account_uuid.to_string();
        let names = names.to_vec();
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            Ok(names
                .into_iter()
                .map(|name| {
                    let uuid = inner
                        .role_ids
                        .get(&(account_uuid.clone(), name.clone()))
                        .cloned();
                    (name, uuid)
                })
                .collect())
        })
    }

    fn resolve_identifiers(
        &self,
        identifiers: &[String],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<HashMap<String, String>>> + Send + '_>> {
        let identifiers = identifiers.to_vec();
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            Ok(identifiers
                .into_iter()
                .filter_map(|id| inner.role_names.get(&id).map(|name| (id, name.clone())))
                .collect())
        })
    }
}
