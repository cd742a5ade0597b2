//! Account queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keystone_core::{AggregateRoot, Failure, Outcome, TenantId, UserId};
use keystone_infra::{DispatchResult, Query, Request, RequestHandler, RequestScope};

use crate::tenant::{Tenant, TenantState};
use crate::user::User;

/// Query: GetTenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTenant {
    pub tenant_id: TenantId,
}

/// Read view of a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantResponse {
    pub tenant_id: TenantId,
    pub name: String,
    pub state: TenantState,
    pub owner_email: String,
    pub owner_id: Option<UserId>,
    pub user_count: usize,
    pub created_at: DateTime<Utc>,
}

impl Request for GetTenant {
    type Output = TenantResponse;
}

impl Query for GetTenant {}

#[derive(Debug, Default, Clone, Copy)]
pub struct GetTenantHandler;

#[async_trait]
impl RequestHandler<GetTenant> for GetTenantHandler {
    async fn handle(&self, request: GetTenant, scope: &RequestScope) -> DispatchResult<TenantResponse> {
        let tracker = scope.change_tracker();
        let Some(tenant) = tracker.find::<Tenant>(&request.tenant_id).await? else {
            return Ok(Outcome::failure(Failure::not_found(format!(
                "tenant {} not found",
                request.tenant_id
            ))));
        };

        let user_count = tracker
            .list::<User>()
            .await?
            .iter()
            .filter(|u| u.tenant_id() == request.tenant_id)
            .count();

        Ok(Outcome::success(TenantResponse {
            tenant_id: tenant.id_typed(),
            name: tenant.name().to_string(),
            state: tenant.state(),
            owner_email: tenant.owner_email().to_string(),
            owner_id: tenant.owner_id(),
            user_count,
            created_at: tenant.audit().created_at,
        }))
    }
}
