//! Request validators.
//!
//! Validators only report field errors; they never abort a dispatch.

use std::sync::Arc;

use async_trait::async_trait;

use keystone_core::{AggregateRoot, FieldError};
use keystone_infra::{Database, Validator};

use crate::commands::{CreateTenant, CreateUser};
use crate::tenant::Tenant;

pub const TENANT_NAME_MIN_LEN: usize = 3;
pub const TENANT_NAME_MAX_LEN: usize = 30;

/// Tenant names: 3–30 characters of lowercase letters, digits and hyphens.
#[derive(Debug, Default, Clone, Copy)]
pub struct TenantNameValidator;

#[async_trait]
impl Validator<CreateTenant> for TenantNameValidator {
    async fn validate(&self, request: &CreateTenant) -> Vec<FieldError> {
        check_tenant_name(&request.name)
    }
}

fn check_tenant_name(name: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let len = name.chars().count();
    if !(TENANT_NAME_MIN_LEN..=TENANT_NAME_MAX_LEN).contains(&len) {
        errors.push(FieldError::new(
            "name",
            format!("must be between {TENANT_NAME_MIN_LEN} and {TENANT_NAME_MAX_LEN} characters"),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        errors.push(FieldError::new(
            "name",
            "may only contain lowercase letters, digits and hyphens",
        ));
    }
    errors
}

/// Rejects tenant names already taken in the durable store.
pub struct UniqueTenantNameValidator {
    database: Arc<dyn Database>,
}

impl UniqueTenantNameValidator {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self { database }
    }
}

#[async_trait]
impl Validator<CreateTenant> for UniqueTenantNameValidator {
    async fn validate(&self, request: &CreateTenant) -> Vec<FieldError> {
        let stored = match self.database.load_all(Tenant::AGGREGATE_TYPE).await {
            Ok(stored) => stored,
            Err(err) => return unchecked(&err),
        };
        let tenants = match stored
            .into_iter()
            .map(serde_json::from_value::<Tenant>)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(tenants) => tenants,
            Err(err) => return unchecked(&err),
        };

        let taken = tenants.iter().any(|tenant| tenant.name() == request.name);

        if taken {
            vec![FieldError::new("name", format!("'{}' is already taken", request.name))]
        } else {
            vec![]
        }
    }
}

fn unchecked(err: &dyn std::fmt::Display) -> Vec<FieldError> {
    tracing::warn!(error = %err, "tenant name uniqueness check failed");
    vec![FieldError::new("name", "could not be checked for uniqueness")]
}

/// Minimal syntactic email check for owner and user emails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserEmailValidator;

#[async_trait]
impl Validator<CreateTenant> for UserEmailValidator {
    async fn validate(&self, request: &CreateTenant) -> Vec<FieldError> {
        check_email("owner_email", &request.owner_email)
    }
}

#[async_trait]
impl Validator<CreateUser> for UserEmailValidator {
    async fn validate(&self, request: &CreateUser) -> Vec<FieldError> {
        check_email("email", &request.email)
    }
}

fn check_email(field: &str, email: &str) -> Vec<FieldError> {
    let email = email.trim();
    let valid = email.len() <= 254
        && !email.chars().any(char::is_whitespace)
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        });

    if valid {
        vec![]
    } else {
        vec![FieldError::new(field, "must be a valid email address")]
    }
}
