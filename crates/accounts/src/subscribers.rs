//! The sign-up cascade.
//!
//! ```text
//! CreateTenant ─▶ TenantCreated ─▶ CreateOwnerOnTenantCreated
//!                                     └─ dispatch CreateUser(Owner) (nested)
//!                                          └─▶ UserCreated ─▶ ActivateTenantOnOwnerCreated
//!                                                               └─▶ TenantActivated
//! ```
//!
//! Everything runs inside the unit of work of the outer `CreateTenant`, so the
//! tenant, its owner and the activation become durable together or not at all.

use async_trait::async_trait;
use chrono::Utc;

use keystone_core::Outcome;
use keystone_events::TelemetryEvent;
use keystone_infra::{DomainEventHandler, RequestScope};

use crate::commands::CreateUser;
use crate::tenant::{Tenant, TenantCreated};
use crate::user::{UserCreated, UserRole};

/// Creates the owner user of every new tenant.
#[derive(Debug, Default, Clone, Copy)]
pub struct CreateOwnerOnTenantCreated;

#[async_trait]
impl DomainEventHandler<TenantCreated> for CreateOwnerOnTenantCreated {
    async fn handle(&self, event: &TenantCreated, scope: &RequestScope) -> anyhow::Result<()> {
        let outcome = scope
            .dispatch(CreateUser {
                tenant_id: event.tenant_id,
                email: event.owner_email.clone(),
                role: UserRole::Owner,
            })
            .await?;

        match outcome {
            Outcome::Success(owner_id) => {
                tracing::debug!(tenant_id = %event.tenant_id, %owner_id, "tenant owner created");
                Ok(())
            }
            // A tenant without an owner must not be committed.
            Outcome::Failure(failure) => Err(anyhow::anyhow!(
                "could not create the owner of tenant {}: {failure}",
                event.name
            )),
        }
    }
}

/// Activates a tenant once its owner exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActivateTenantOnOwnerCreated;

#[async_trait]
impl DomainEventHandler<UserCreated> for ActivateTenantOnOwnerCreated {
    async fn handle(&self, event: &UserCreated, scope: &RequestScope) -> anyhow::Result<()> {
        if event.role != UserRole::Owner {
            return Ok(());
        }

        let owner_id = event.user_id;
        let activated = scope
            .change_tracker()
            .modify::<Tenant, _, _>(&event.tenant_id, |tenant| {
                tenant.activate(owner_id, Utc::now())
            })
            .await?
            .ok_or_else(|| anyhow::anyhow!("tenant {} not found", event.tenant_id))?;

        if activated {
            scope.telemetry().collect_event(
                TelemetryEvent::new("TenantActivated")
                    .with_property("tenant_id", event.tenant_id)
                    .with_property("owner_id", owner_id),
            );
            tracing::info!(tenant_id = %event.tenant_id, %owner_id, "tenant activated");
        }
        Ok(())
    }
}
