use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keystone_core::{AggregateRoot, AuditInfo, DomainEvent, DomainEvents, TenantId, UserId};

/// Tenant lifecycle: created in trial, activated once its owner exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantState {
    Trial,
    Active,
}

/// Aggregate root: Tenant (the multi-tenant boundary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    id: TenantId,
    name: String,
    owner_email: String,
    state: TenantState,
    owner_id: Option<UserId>,
    audit: AuditInfo,
    #[serde(skip)]
    events: DomainEvents,
}

impl Tenant {
    /// Create a tenant in trial state and raise `TenantCreated`.
    pub fn create(name: &str, owner_email: &str, at: DateTime<Utc>) -> Self {
        let mut tenant = Self {
            id: TenantId::new(),
            name: name.to_string(),
            owner_email: normalize_email(owner_email),
            state: TenantState::Trial,
            owner_id: None,
            audit: AuditInfo::created(at),
            events: DomainEvents::default(),
        };
        tenant.events.raise(TenantCreated {
            tenant_id: tenant.id,
            name: tenant.name.clone(),
            owner_email: tenant.owner_email.clone(),
            occurred_at: at,
        });
        tenant
    }

    pub fn id_typed(&self) -> TenantId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner_email(&self) -> &str {
        &self.owner_email
    }

    pub fn state(&self) -> TenantState {
        self.state
    }

    pub fn owner_id(&self) -> Option<UserId> {
        self.owner_id
    }

    pub fn is_active(&self) -> bool {
        self.state == TenantState::Active
    }

    /// Activate the tenant with its owner.
    ///
    /// Returns `false` (and raises nothing) if the tenant is already active.
    pub fn activate(&mut self, owner_id: UserId, at: DateTime<Utc>) -> bool {
        if self.is_active() {
            return false;
        }
        self.state = TenantState::Active;
        self.owner_id = Some(owner_id);
        self.events.raise(TenantActivated {
            tenant_id: self.id,
            owner_id,
            occurred_at: at,
        });
        true
    }
}

impl AggregateRoot for Tenant {
    type Id = TenantId;

    const AGGREGATE_TYPE: &'static str = "tenant";

    fn id(&self) -> &TenantId {
        &self.id
    }

    fn audit(&self) -> &AuditInfo {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }

    fn domain_events(&self) -> &DomainEvents {
        &self.events
    }

    fn domain_events_mut(&mut self) -> &mut DomainEvents {
        &mut self.events
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Event: TenantCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantCreated {
    pub tenant_id: TenantId,
    pub name: String,
    pub owner_email: String,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for TenantCreated {
    fn event_type(&self) -> &'static str {
        "TenantCreated"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Event: TenantActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantActivated {
    pub tenant_id: TenantId,
    pub owner_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for TenantActivated {
    fn event_type(&self) -> &'static str {
        "TenantActivated"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
