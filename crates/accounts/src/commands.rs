//! Account commands and their handlers.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use keystone_core::{Failure, Outcome, TenantId, UserId};
use keystone_events::TelemetryEvent;
use keystone_infra::{Command, DispatchResult, Request, RequestHandler, RequestScope};

use crate::tenant::Tenant;
use crate::user::{User, UserRole};

/// Command: CreateTenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub owner_email: String,
}

impl Request for CreateTenant {
    type Output = TenantId;
}

impl Command for CreateTenant {}

#[derive(Debug, Default, Clone, Copy)]
pub struct CreateTenantHandler;

#[async_trait]
impl RequestHandler<CreateTenant> for CreateTenantHandler {
    async fn handle(&self, request: CreateTenant, scope: &RequestScope) -> DispatchResult<TenantId> {
        let tenant = Tenant::create(&request.name, &request.owner_email, Utc::now());
        let tenant_id = tenant.id_typed();
        scope.change_tracker().add(tenant)?;

        scope.telemetry().collect_event(
            TelemetryEvent::new("TenantCreated")
                .with_property("tenant_id", tenant_id)
                .with_property("tenant_name", &request.name),
        );
        tracing::info!(%tenant_id, name = %request.name, "tenant created");

        Ok(Outcome::success(tenant_id))
    }
}

/// Command: CreateUser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUser {
    pub tenant_id: TenantId,
    pub email: String,
    pub role: UserRole,
}

impl Request for CreateUser {
    type Output = UserId;
}

impl Command for CreateUser {}

#[derive(Debug, Default, Clone, Copy)]
pub struct CreateUserHandler;

#[async_trait]
impl RequestHandler<CreateUser> for CreateUserHandler {
    async fn handle(&self, request: CreateUser, scope: &RequestScope) -> DispatchResult<UserId> {
        let tracker = scope.change_tracker();

        let Some(tenant) = tracker.find::<Tenant>(&request.tenant_id).await? else {
            return Ok(Outcome::failure(Failure::not_found(format!(
                "tenant {} not found",
                request.tenant_id
            ))));
        };

        let users = tracker.list::<User>().await?;
        if users.iter().any(|u| u.matches(request.tenant_id, &request.email)) {
            return Ok(Outcome::failure(Failure::conflict(format!(
                "a user with email {} already exists in tenant {}",
                request.email.trim(),
                tenant.name()
            ))));
        }
        if request.role == UserRole::Owner
            && users
                .iter()
                .any(|u| u.tenant_id() == request.tenant_id && u.role() == UserRole::Owner)
        {
            return Ok(Outcome::failure(Failure::conflict(format!(
                "tenant {} already has an owner",
                tenant.name()
            ))));
        }

        let user = User::create(request.tenant_id, &request.email, request.role, Utc::now());
        let user_id = user.id_typed();
        tracker.add(user)?;

        scope.telemetry().collect_event(
            TelemetryEvent::new("UserCreated")
                .with_property("tenant_id", request.tenant_id)
                .with_property("user_id", user_id)
                .with_property("role", request.role.as_str()),
        );
        tracing::info!(%user_id, tenant_id = %request.tenant_id, role = request.role.as_str(), "user created");

        Ok(Outcome::success(user_id))
    }
}
