use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keystone_core::{AggregateRoot, AuditInfo, DomainEvent, DomainEvents, TenantId, UserId};

use crate::tenant::normalize_email;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Admin,
    Member,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Owner => "owner",
            UserRole::Admin => "admin",
            UserRole::Member => "member",
        }
    }
}

/// Aggregate root: User (always scoped to one tenant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    tenant_id: TenantId,
    email: String,
    role: UserRole,
    audit: AuditInfo,
    #[serde(skip)]
    events: DomainEvents,
}

impl User {
    pub fn create(tenant_id: TenantId, email: &str, role: UserRole, at: DateTime<Utc>) -> Self {
        let mut user = Self {
            id: UserId::new(),
            tenant_id,
            email: normalize_email(email),
            role,
            audit: AuditInfo::created(at),
            events: DomainEvents::default(),
        };
        user.events.raise(UserCreated {
            user_id: user.id,
            tenant_id,
            email: user.email.clone(),
            role,
            occurred_at: at,
        });
        user
    }

    pub fn id_typed(&self) -> UserId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> UserRole {
        self.role
    }

    /// Whether this user is `email` within `tenant_id` (case-insensitive).
    pub fn matches(&self, tenant_id: TenantId, email: &str) -> bool {
        self.tenant_id == tenant_id && self.email == normalize_email(email)
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    const AGGREGATE_TYPE: &'static str = "user";

    fn id(&self) -> &UserId {
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

/// Event: UserCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub role: UserRole,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for UserCreated {
    fn event_type(&self) -> &'static str {
        "UserCreated"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
