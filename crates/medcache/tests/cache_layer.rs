//! End-to-end behaviour of the cache layer through the facade.

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use uuid::Uuid;

use common::{READ, RESTRICTED, TestServices};
use medcache::{AssociationPolicy, CacheEvent, EstablishRequest, SessionEvent};
use medcache_objects::{BatchOperation, Bundle, Concept, Entity, EntityRelationship};
use medcache_session::{SessionError, purposes};
use medcache_types::RecordingObserver;

fn patient(key: Uuid) -> Entity {
    Entity::new(key, "Patient").with_name("Jane Doe")
}

#[test]
fn test_retrieved_objects_are_isolated() {
    let t = TestServices::new();
    let key = Uuid::new_v4();
    let mut original = patient(key);
    t.services.objects().add(original.clone().into());

    // Neither the caller's copy nor a reader's copy reaches the cache.
    original.names.push("Caller edit".to_string());
    let mut read: Entity = t.services.objects().get_as(key).unwrap();
    read.names.push("Reader edit".to_string());

    let again: Entity = t.services.objects().get_as(key).unwrap();
    assert_eq!(again.names, vec!["Jane Doe".to_string()]);
}

#[test]
fn test_ttl_boundary_across_caches() {
    let t = TestServices::new();
    let key = Uuid::new_v4();
    t.services.objects().add(patient(key).into());
    t.services.adhoc().add("ward", "7B".to_string(), None);

    t.clock.advance(Duration::from_millis(59_999));
    assert!(t.services.objects().get(key).is_some());
    assert_eq!(t.services.adhoc().get::<String>("ward"), Some("7B".to_string()));

    t.clock.advance(Duration::from_millis(2));
    assert!(t.services.objects().get(key).is_none());
    assert!(!t.services.adhoc().exists("ward"));
}

#[test]
fn test_association_evicts_and_notifies() {
    let t = TestServices::new();
    let events = Arc::new(RecordingObserver::new());
    t.services.objects().subscribe(events.clone());

    let (mother, child) = (Uuid::new_v4(), Uuid::new_v4());
    t.services.objects().add(Entity::new(mother, "Person").into());
    t.services.objects().add(patient(child).into());
    events.clear();

    let relationship = Uuid::new_v4();
    t.services
        .objects()
        .add(EntityRelationship::new(relationship, mother, child, "Mother").into());

    assert!(t.services.objects().get(mother).is_none());
    assert!(t.services.objects().get(child).is_none());
    assert_eq!(
        events.events(),
        vec![
            CacheEvent::Removed {
                key: mother.to_string()
            },
            CacheEvent::Removed {
                key: child.to_string()
            },
            CacheEvent::Added {
                key: relationship.to_string()
            },
        ]
    );
}

#[test]
fn test_patch_policy_through_facade() {
    let t = TestServices::new();
    let services = t.services.clone().with_association_policy(AssociationPolicy::Patch);
    let (mother, child) = (Uuid::new_v4(), Uuid::new_v4());
    services.objects().add(Entity::new(mother, "Person").into());

    let relationship = EntityRelationship::new(Uuid::new_v4(), mother, child, "Mother");
    services.objects().add(relationship.clone().into());

    let host: Entity = services.objects().get_as(mother).unwrap();
    assert_eq!(host.relationships, vec![relationship]);
}

#[test]
fn test_bundle_insert_and_delete() {
    let t = TestServices::new();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    t.services.objects().add(patient(b).into());

    t.services.objects().add(
        Bundle::new(vec![
            medcache::DomainObject::from(patient(b)).with_operation(BatchOperation::Delete),
            medcache::DomainObject::from(patient(a)).with_operation(BatchOperation::Insert),
        ])
        .into(),
    );

    assert!(t.services.objects().exists::<Entity>(a));
    assert!(!t.services.objects().exists::<Entity>(b));
}

#[test]
fn test_type_filtered_exists() {
    let t = TestServices::new();
    let key = Uuid::new_v4();
    t.services.objects().add(Concept::new(key, "ACTIVE").into());

    assert!(t.services.objects().get(key).is_some());
    assert!(!t.services.objects().exists::<Entity>(key));
}

#[test]
fn test_query_continuation_example() {
    let t = TestServices::new();
    let query = Uuid::new_v4();
    let (k1, k2, k3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let queries = t.services.queries();
    assert!(queries.register_query_set(query, &[k1, k2], Some(json!("t")), 5));
    queries.add_results(query, &[k2, k3], 5);

    assert_eq!(queries.get_query_results(query, 0, 10), vec![k1, k2, k3]);
    assert_eq!(queries.query_result_total_quantity(query), 5);
    assert_eq!(queries.find_query_id(&json!("t")), Some(query));
}

#[test]
fn test_session_lifecycle() -> Result<()> {
    let t = TestServices::new();
    let events = Arc::new(RecordingObserver::new());
    t.services.sessions().subscribe(events.clone());

    let session = t
        .services
        .sessions()
        .establish(EstablishRequest::new(t.nurse()).with_scope(READ))?;
    let refresh = session
        .refresh_token()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no refresh token"))?;

    t.clock.advance(Duration::from_secs(100));
    let renewed = t.services.sessions().extend(&refresh)?;
    assert_eq!(t.services.sessions().get_user_sessions(t.user_key).len(), 1);

    t.services.sessions().abandon(renewed.id());
    assert_eq!(t.services.sessions().count(), 0);
    assert_eq!(t.policy.cleared(), vec!["nurse".to_string()]);

    let kinds: Vec<String> = events.events().iter().map(ToString::to_string).collect();
    assert_eq!(
        kinds,
        vec!["Established(success=true)", "Extended", "Abandoned"]
    );
    assert!(matches!(
        events.events()[1],
        SessionEvent::Extended { .. }
    ));
    Ok(())
}

#[test]
fn test_session_expiry_boundary() -> Result<()> {
    let t = TestServices::new();
    let session = t
        .services
        .sessions()
        .establish(EstablishRequest::new(t.nurse()).with_scope(READ))?;

    t.clock.advance(Duration::from_secs(300));
    let result = t.services.sessions().authenticate(session.id());
    assert!(matches!(result, Err(SessionError::Expired(_))));
    Ok(())
}

#[test]
fn test_elevated_sessions_are_not_extended() -> Result<()> {
    let t = TestServices::new();
    let sessions = t.services.sessions();

    let override_session = sessions.establish(
        EstablishRequest::new(t.nurse())
            .with_override()
            .with_purpose("EMERG")
            .with_scope(RESTRICTED),
    )?;
    let admin_session = sessions.establish(
        EstablishRequest::new(t.nurse())
            .with_purpose(purposes::SECURITY_ADMIN)
            .with_scope(READ),
    )?;

    for session in [override_session, admin_session] {
        let refresh = session
            .refresh_token()
            .ok_or_else(|| anyhow::anyhow!("no refresh token"))?;
        assert!(matches!(
            sessions.extend(refresh),
            Err(SessionError::PolicyViolation(_))
        ));
    }
    Ok(())
}

#[test]
fn test_session_errors_convert_into_facade_error() {
    fn authenticate(t: &TestServices) -> medcache::Result<()> {
        t.services
            .sessions()
            .authenticate(&medcache_session::SessionToken::generate())?;
        Ok(())
    }

    let t = TestServices::new();
    assert!(matches!(
        authenticate(&t),
        Err(medcache::Error::Session(SessionError::NotFound(_)))
    ));
}
