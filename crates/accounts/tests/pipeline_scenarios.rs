//! Sign-up scenarios driven through the full dispatch pipeline.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use proptest::prelude::*;

use keystone_accounts::{
    CreateTenant, CreateUser, GetTenant, TenantCreated, TenantState, UserCreated, UserRole,
    register, register_sign_up_flow,
};
use keystone_core::{AggregateKey, ErrorKind, TenantId};
use keystone_events::InMemoryTelemetrySink;
use keystone_infra::{
    CancellationToken, DispatchError, Dispatcher, DomainEventHandler, InMemoryDatabase,
    RegistryBuilder, RequestScope,
};
use keystone_observability::TracingTelemetrySink;

struct App {
    dispatcher: Dispatcher,
    database: Arc<InMemoryDatabase>,
    sink: Arc<InMemoryTelemetrySink>,
}

fn app(wire: impl FnOnce(RegistryBuilder) -> RegistryBuilder) -> App {
    let database = Arc::new(InMemoryDatabase::new());
    let sink = Arc::new(InMemoryTelemetrySink::new());
    let builder = wire(register(RegistryBuilder::new(), database.clone()));
    let dispatcher = Dispatcher::new(builder.build().unwrap(), database.clone(), sink.clone());
    App {
        dispatcher,
        database,
        sink,
    }
}

fn create_acme() -> CreateTenant {
    CreateTenant {
        name: "acme".to_string(),
        owner_email: "owner@acme.io".to_string(),
    }
}

fn assert_scope_settled(scope: &RequestScope) {
    assert!(scope.counter().is_zero());
    assert!(scope.telemetry().is_empty());
    assert!(
        scope
            .domain_event_collector()
            .aggregates_with_pending_events()
            .is_empty()
    );
}

#[derive(Clone, Default)]
struct SeenTenants(Arc<Mutex<Vec<TenantId>>>);

#[async_trait]
impl DomainEventHandler<TenantCreated> for SeenTenants {
    async fn handle(&self, event: &TenantCreated, _scope: &RequestScope) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(event.tenant_id);
        Ok(())
    }
}

struct RefuseTenants;

#[async_trait]
impl DomainEventHandler<TenantCreated> for RefuseTenants {
    async fn handle(&self, event: &TenantCreated, _scope: &RequestScope) -> anyhow::Result<()> {
        anyhow::bail!("tenant {} refused", event.name)
    }
}

struct RefuseUsers;

#[async_trait]
impl DomainEventHandler<UserCreated> for RefuseUsers {
    async fn handle(&self, _event: &UserCreated, _scope: &RequestScope) -> anyhow::Result<()> {
        anyhow::bail!("user refused")
    }
}

#[tokio::test]
async fn scenario_a_create_tenant_commits_once_and_reports_once() {
    let seen = SeenTenants::default();
    let app = app(|b| b.subscriber::<TenantCreated, _>(seen.clone()));

    let scope = app.dispatcher.begin_scope();
    let outcome = scope.dispatch(create_acme()).await.unwrap();

    let tenant_id = outcome.into_value().unwrap();
    assert_eq!(*seen.0.lock().unwrap(), vec![tenant_id]);
    assert_eq!(scope.change_tracker().commit_count(), 1);
    assert_eq!(
        app.database.commit_log(),
        vec![vec![AggregateKey::new("tenant", tenant_id)]]
    );
    assert_eq!(app.sink.names(), vec!["TenantCreated"]);
    assert_eq!(app.sink.events()[0].property("tenant_name"), Some("acme"));
    assert_scope_settled(&scope);
}

#[tokio::test]
async fn scenario_b_sign_up_commits_tenant_before_owner_in_one_operation() {
    let app = app(register_sign_up_flow);

    let scope = app.dispatcher.begin_scope();
    let tenant_id = scope
        .dispatch(create_acme())
        .await
        .unwrap()
        .into_value()
        .unwrap();

    // Nested CreateUser commit first, then the outer CreateTenant commit.
    assert_eq!(scope.change_tracker().commit_count(), 2);
    assert_scope_settled(&scope);

    // One telemetry batch for the whole operation, in collection order.
    assert_eq!(
        app.sink.names(),
        vec!["TenantCreated", "UserCreated", "TenantActivated"]
    );

    // Read back from durable storage in a fresh scope.
    let tenant = app
        .dispatcher
        .dispatch(GetTenant { tenant_id })
        .await
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(tenant.state, TenantState::Active);
    assert_eq!(tenant.user_count, 1);
    let owner_id = tenant.owner_id.unwrap();

    assert_eq!(
        app.database.commit_log(),
        vec![vec![
            AggregateKey::new("tenant", tenant_id),
            AggregateKey::new("user", owner_id),
        ]]
    );
}

#[tokio::test]
async fn scenario_c_failing_subscriber_aborts_without_commit_or_telemetry() {
    let app = app(|b| b.subscriber::<TenantCreated, _>(RefuseTenants));

    let scope = app.dispatcher.begin_scope();
    let err = scope.dispatch(create_acme()).await.unwrap_err();

    match &err {
        DispatchError::Subscriber {
            subscriber, event, ..
        } => {
            assert_eq!(*subscriber, "RefuseTenants");
            assert_eq!(*event, "TenantCreated");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("tenant acme refused"));
    assert!(app.database.commit_log().is_empty());
    assert!(app.sink.is_empty());
    assert_eq!(scope.change_tracker().commit_count(), 0);
    assert_scope_settled(&scope);
}

#[tokio::test]
async fn scenario_c_nested_subscriber_failure_unwinds_the_outer_command() {
    let app = app(|b| register_sign_up_flow(b).subscriber::<UserCreated, _>(RefuseUsers));

    let scope = app.dispatcher.begin_scope();
    let err = scope.dispatch(create_acme()).await.unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Subscriber {
            subscriber: "RefuseUsers",
            event: "UserCreated",
            ..
        }
    ));
    assert!(app.database.is_empty());
    assert!(app.sink.is_empty());
    assert_eq!(scope.change_tracker().tracked_count(), 0);
    assert_scope_settled(&scope);
}

#[tokio::test]
async fn scenario_d_only_the_failing_validator_reports() {
    let app = app(|b| b);

    let outcome = app
        .dispatcher
        .dispatch(CreateTenant {
            name: "acme".to_string(),
            owner_email: "not-an-email".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(outcome.status_category(), Some(ErrorKind::BadRequest));
    let fields: Vec<&str> = outcome
        .field_errors()
        .iter()
        .map(|e| e.field.as_str())
        .collect();
    assert_eq!(fields, vec!["owner_email"]);
    assert!(app.database.is_empty());
    assert!(app.sink.is_empty());

    let outcome = app
        .dispatcher
        .dispatch(CreateTenant {
            name: "Not Valid".to_string(),
            owner_email: "owner@acme.io".to_string(),
        })
        .await
        .unwrap();
    assert!(outcome.field_errors().iter().all(|e| e.field == "name"));
    assert!(!outcome.field_errors().is_empty());
}

#[tokio::test]
async fn tenant_names_must_be_unique() {
    let app = app(|b| b);
    app.dispatcher.dispatch(create_acme()).await.unwrap();

    let outcome = app.dispatcher.dispatch(create_acme()).await.unwrap();

    assert_eq!(outcome.status_category(), Some(ErrorKind::BadRequest));
    assert_eq!(outcome.field_errors().len(), 1);
    assert!(outcome.field_errors()[0].message.contains("already taken"));
    assert_eq!(app.database.commit_log().len(), 1);
}

#[tokio::test]
async fn create_user_business_failures_are_outcomes() {
    let app = app(register_sign_up_flow);
    let tenant_id = app
        .dispatcher
        .dispatch(create_acme())
        .await
        .unwrap()
        .into_value()
        .unwrap();

    let missing = app
        .dispatcher
        .dispatch(CreateUser {
            tenant_id: TenantId::new(),
            email: "x@acme.io".to_string(),
            role: UserRole::Member,
        })
        .await
        .unwrap();
    assert_eq!(missing.status_category(), Some(ErrorKind::NotFound));

    let duplicate = app
        .dispatcher
        .dispatch(CreateUser {
            tenant_id,
            email: "OWNER@acme.io".to_string(),
            role: UserRole::Member,
        })
        .await
        .unwrap();
    assert_eq!(duplicate.status_category(), Some(ErrorKind::Conflict));

    let second_owner = app
        .dispatcher
        .dispatch(CreateUser {
            tenant_id,
            email: "other@acme.io".to_string(),
            role: UserRole::Owner,
        })
        .await
        .unwrap();
    assert_eq!(second_owner.status_category(), Some(ErrorKind::Conflict));

    // Failures commit nothing.
    assert_eq!(app.database.commit_log().len(), 1);

    let member = app
        .dispatcher
        .dispatch(CreateUser {
            tenant_id,
            email: "member@acme.io".to_string(),
            role: UserRole::Member,
        })
        .await
        .unwrap();
    assert!(member.is_success());
    assert_eq!(app.database.commit_log().len(), 2);

    let tenant = app
        .dispatcher
        .dispatch(GetTenant { tenant_id })
        .await
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(tenant.user_count, 2);
}

#[tokio::test]
async fn get_tenant_of_unknown_id_is_not_found_and_commits_nothing() {
    let app = app(|b| b);
    let scope = app.dispatcher.begin_scope();

    let outcome = scope
        .dispatch(GetTenant {
            tenant_id: TenantId::new(),
        })
        .await
        .unwrap();

    assert_eq!(outcome.status_category(), Some(ErrorKind::NotFound));
    assert_eq!(scope.change_tracker().commit_count(), 0);
}

#[tokio::test]
async fn cancelled_sign_up_commits_nothing() {
    let app = app(register_sign_up_flow);
    let token = CancellationToken::new();
    let scope = app.dispatcher.begin_scope_with(token.clone());
    token.cancel();

    let err = scope.dispatch(create_acme()).await.unwrap_err();

    assert!(matches!(err, DispatchError::Cancelled));
    assert!(app.database.is_empty());
    assert!(app.sink.is_empty());
}

#[tokio::test]
async fn sign_up_reports_through_the_tracing_sink() {
    keystone_observability::init();

    let database = Arc::new(InMemoryDatabase::new());
    let builder = register_sign_up_flow(register(RegistryBuilder::new(), database.clone()));
    let dispatcher = Dispatcher::new(
        builder.build().unwrap(),
        database.clone(),
        Arc::new(TracingTelemetrySink::new()),
    );

    let outcome = dispatcher.dispatch(create_acme()).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(database.len(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 16,
        ..ProptestConfig::default()
    })]

    /// Every sign-up becomes durable as one batch holding the tenant and its
    /// owner, and reports exactly three telemetry events.
    #[test]
    fn each_sign_up_is_one_atomic_batch(
        names in prop::collection::hash_set("[a-z]{3,12}", 1..5)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let app = app(register_sign_up_flow);
            for name in &names {
                let outcome = app
                    .dispatcher
                    .dispatch(CreateTenant {
                        name: name.clone(),
                        owner_email: format!("owner@{name}.io"),
                    })
                    .await
                    .unwrap();
                prop_assert!(outcome.is_success());
            }

            let log = app.database.commit_log();
            prop_assert_eq!(log.len(), names.len());
            prop_assert!(log.iter().all(|batch| batch.len() == 2));
            prop_assert!(log.iter().all(|batch| batch[0].aggregate_type == "tenant"));
            prop_assert_eq!(app.sink.len(), names.len() * 3);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
