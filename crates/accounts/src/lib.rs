//! Accounts module (tenants and their users).
//!
//! A small domain wired through the dispatch pipeline: commands and a query
//! with their handlers, request validators, and the sign-up cascade of domain
//! event subscribers. Handlers never commit; the pipeline does.

use std::sync::Arc;

use keystone_infra::{Database, RegistryBuilder};

pub mod commands;
pub mod queries;
pub mod subscribers;
pub mod tenant;
pub mod user;
pub mod validators;

pub use commands::{CreateTenant, CreateTenantHandler, CreateUser, CreateUserHandler};
pub use queries::{GetTenant, GetTenantHandler, TenantResponse};
pub use subscribers::{ActivateTenantOnOwnerCreated, CreateOwnerOnTenantCreated};
pub use tenant::{Tenant, TenantActivated, TenantCreated, TenantState};
pub use user::{User, UserCreated, UserRole};
pub use validators::{TenantNameValidator, UniqueTenantNameValidator, UserEmailValidator};

/// Register the account handlers and validators.
///
/// `database` backs the tenant-name uniqueness check.
pub fn register(builder: RegistryBuilder, database: Arc<dyn Database>) -> RegistryBuilder {
    builder
        .command::<CreateTenant, _>(CreateTenantHandler)
        .command::<CreateUser, _>(CreateUserHandler)
        .query::<GetTenant, _>(GetTenantHandler)
        .validator::<CreateTenant, _>(TenantNameValidator)
        .validator::<CreateTenant, _>(UniqueTenantNameValidator::new(database))
        .validator::<CreateTenant, _>(UserEmailValidator)
        .validator::<CreateUser, _>(UserEmailValidator)
}

/// Register the sign-up cascade: owner creation and tenant activation.
pub fn register_sign_up_flow(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .subscriber::<TenantCreated, _>(CreateOwnerOnTenantCreated)
        .subscriber::<UserCreated, _>(ActivateTenantOnOwnerCreated)
}
