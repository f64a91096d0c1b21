mod common;

use proptest::prelude::*;

use chronicle_core::{AggregateId, AggregateRoot, ExpectedVersion, TenantId};
use chronicle_events::{Aggregate, EventCodec, EventMetadata, RecordedEvent};
use std::sync::Arc;

use chronicle_infra::quota::InMemoryQuotaStore;
use chronicle_infra::{
    EngineConfig, EventStore, EventStoreError, InMemoryEngine, QuotaTier, RepositoryError,
    ResourceLimits, ResourceType,
};

use common::*;

fn opened(repo: &chronicle_infra::InMemoryRepository) -> anyhow::Result<Aggregate<Account>> {
    let mut account = Aggregate::<Account>::new(AggregateId::new())?;
    account.apply(Opened { owner: "ada".into() })?;
    repo.save(&account)?;
    account.mark_committed();
    Ok(account)
}

#[test]
fn second_concurrent_save_conflicts() -> anyhow::Result<()> {
    let engine = engine();
    let repo = engine.repository();
    let id = *opened(repo)?.id();

    let mut first = repo.load::<Account>(id)?.unwrap();
    let mut second = repo.load::<Account>(id)?.unwrap();
    first.apply(Deposited { amount: 10 })?;
    second.apply(Deposited { amount: 20 })?;

    assert_eq!(repo.save(&first)?.len(), 1);
    match repo.save(&second) {
        Err(RepositoryError::Concurrency {
            aggregate_id,
            expected,
            actual,
        }) => {
            assert_eq!(aggregate_id, id);
            assert_eq!((expected, actual), (1, 2));
        }
        other => panic!("expected concurrency conflict, got {other:?}"),
    }

    let reloaded = repo.load::<Account>(id)?.unwrap();
    assert_eq!(reloaded.state().balance, 10);
    assert_eq!(repo.get_aggregate_version(id)?, 2);
    Ok(())
}

#[test]
fn stale_resave_without_mark_committed_is_detected() -> anyhow::Result<()> {
    let engine = engine();
    let repo = engine.repository();
    let mut account = opened(repo)?;
    account.apply(Deposited { amount: 5 })?;

    repo.save(&account)?;
    let err = repo.save(&account).unwrap_err();
    assert!(matches!(err, RepositoryError::Concurrency { expected: 1, actual: 2, .. }));

    let committed = account.mark_committed();
    assert_eq!(committed.len(), 1);
    assert!(repo.save(&account)?.is_empty());
    Ok(())
}

#[test]
fn load_events_is_exclusive_of_from_version() -> anyhow::Result<()> {
    let engine = engine();
    let repo = engine.repository();
    let mut account = opened(repo)?;
    account.apply(Deposited { amount: 1 })?;
    account.apply(Withdrawn { amount: 1 })?;
    repo.save(&account)?;
    account.mark_committed();

    let versions: Vec<_> = repo
        .load_events(*account.id(), 1)?
        .iter()
        .map(|e| e.aggregate_version)
        .collect();
    assert_eq!(versions, vec![2, 3]);
    assert_eq!(repo.load_events(*account.id(), 0)?.len(), 3);
    assert!(repo.load::<Account>(AggregateId::new())?.is_none());
    assert_eq!(repo.get_aggregate_version(AggregateId::new())?, 0);
    Ok(())
}

#[test]
fn committed_envelopes_carry_positions() -> anyhow::Result<()> {
    let engine = engine();
    let repo = engine.repository();
    let mut account = Aggregate::<Account>::new(AggregateId::new())?;
    account.apply(Opened { owner: "lin".into() })?;
    account.apply(Deposited { amount: 3 })?;

    let committed = repo.save(&account)?;
    let positions: Vec<_> = committed
        .iter()
        .map(|e| (e.global_position(), e.stream_position()))
        .collect();
    assert_eq!(positions, vec![(1, 1), (2, 2)]);
    assert_eq!(repo.get_global_position(), 2);
    assert_eq!(repo.get_stream_position(*account.id()), 2);
    Ok(())
}

#[test]
fn quota_check_allows_exactly_the_remaining_headroom() {
    let engine = engine();
    let quotas = engine.quotas();
    let tenant = TenantId::new();
    quotas.set_tenant_limits(
        tenant,
        ResourceLimits::unlimited().with_limit(ResourceType::Events, Some(1000)),
    );
    quotas.record_tenant_usage(tenant, ResourceType::Events, 100);

    for amount in [1, 500, 900] {
        assert!(quotas.check_tenant_quota(tenant, ResourceType::Events, amount).is_ok());
    }
    for amount in [901, 1000] {
        assert!(quotas.check_tenant_quota(tenant, ResourceType::Events, amount).is_err());
    }
}

#[test]
fn save_reserves_tenant_quota_and_rejects_overflow() -> anyhow::Result<()> {
    let engine = engine();
    let repo = engine.repository();
    let tenant = TenantId::new();
    engine.quotas().set_tenant_limits(
        tenant,
        ResourceLimits::unlimited().with_limit(ResourceType::Events, Some(3)),
    );

    let mut account = Aggregate::<Account>::new(AggregateId::new())?
        .with_metadata(EventMetadata::for_tenant(tenant));
    account.apply(Opened { owner: "ida".into() })?;
    account.apply(Deposited { amount: 1 })?;
    repo.save(&account)?;
    account.mark_committed();

    account.apply(Deposited { amount: 1 })?;
    account.apply(Deposited { amount: 1 })?;
    let err = repo.save(&account).unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::QuotaExceeded {
            resource: ResourceType::Events,
            limit: 3,
            current: 2,
            requested: 2,
            ..
        }
    ));

    let usage = engine.quotas().get_tenant_usage(tenant);
    assert_eq!(usage.get(ResourceType::Events), 2);
    assert_eq!(usage.get(ResourceType::Aggregates), 1);
    assert_eq!(repo.get_aggregate_version(*account.id())?, 2);
    Ok(())
}

#[test]
fn new_streams_count_against_aggregate_limit() -> anyhow::Result<()> {
    let engine = engine();
    let repo = engine.repository();
    let tenant = TenantId::new();
    engine.quotas().set_tenant_limits(
        tenant,
        ResourceLimits::unlimited().with_limit(ResourceType::Aggregates, Some(1)),
    );

    let mut first = Aggregate::<Account>::new(AggregateId::new())?
        .with_metadata(EventMetadata::for_tenant(tenant));
    first.apply(Opened { owner: "a".into() })?;
    repo.save(&first)?;

    let mut second = Aggregate::<Account>::new(AggregateId::new())?
        .with_metadata(EventMetadata::for_tenant(tenant));
    second.apply(Opened { owner: "b".into() })?;
    assert!(matches!(
        repo.save(&second),
        Err(RepositoryError::QuotaExceeded { resource: ResourceType::Aggregates, .. })
    ));
    // The events reservation taken before the rejection was given back.
    assert_eq!(
        engine.quotas().get_tenant_usage(tenant).get(ResourceType::Events),
        1
    );
    Ok(())
}

#[test]
fn storage_failure_surfaces_and_releases_reservation() -> anyhow::Result<()> {
    let engine = engine();
    let repo = engine.repository();
    let tenant = TenantId::new();
    engine.quotas().set_tenant_tier(tenant, QuotaTier::Starter);

    let mut account = Aggregate::<Account>::new(AggregateId::new())?
        .with_metadata(EventMetadata::for_tenant(tenant));
    account.apply(Opened { owner: "kai".into() })?;

    engine.event_store().set_unavailable(true);
    assert!(matches!(repo.save(&account), Err(RepositoryError::Storage(_))));
    assert_eq!(
        engine.quotas().get_tenant_usage(tenant).get(ResourceType::Events),
        0
    );

    engine.event_store().set_unavailable(false);
    assert_eq!(repo.save(&account)?.len(), 1);
    Ok(())
}

#[test]
fn restarted_engine_resumes_flushed_quota_usage() -> anyhow::Result<()> {
    init_logging();
    let quota_store = Arc::new(InMemoryQuotaStore::new());
    let tenant = TenantId::new();

    let engine =
        InMemoryEngine::with_quota_store(EngineConfig::default(), registry(), quota_store.clone())?;
    let mut account = Aggregate::<Account>::new(AggregateId::new())?
        .with_metadata(EventMetadata::for_tenant(tenant));
    account.apply(Opened { owner: "lin".into() })?;
    account.apply(Deposited { amount: 4 })?;
    engine.repository().save(&account)?;
    engine.start_quota_flush()?.shutdown();
    drop(engine);

    let restarted =
        InMemoryEngine::with_quota_store(EngineConfig::default(), registry(), quota_store)?;
    let usage = restarted.quotas().get_tenant_usage(tenant);
    assert_eq!(usage.get(ResourceType::Events), 2);
    assert_eq!(usage.get(ResourceType::Aggregates), 1);
    Ok(())
}

#[test]
fn unregistered_event_fields_survive_save_and_load() -> anyhow::Result<()> {
    let engine = engine();
    let repo = engine.repository();
    let attributes = serde_json::json!({ "model": "m-7", "tools": ["search", "shell"] });

    let mut fleet = Aggregate::<Fleet>::new(AggregateId::new())?;
    fleet.apply(AgentSpawned {
        agent_name: "scout".into(),
        attributes: attributes.clone(),
    })?;
    repo.save(&fleet)?;
    fleet.mark_committed();

    let events = repo.load_events(*fleet.id(), 0)?;
    assert_eq!(events[0].payload["agent_name"], "scout");
    assert_eq!(events[0].payload["attributes"], attributes);

    let generic = repo.registry().resolve(&events[0])?;
    assert!(!generic.is_registered());

    let loaded = repo.load::<Fleet>(*fleet.id())?.unwrap();
    assert_eq!(loaded.state().agents, vec!["scout".to_string()]);
    Ok(())
}

#[test]
fn unknown_top_level_fields_round_trip_through_the_store() -> anyhow::Result<()> {
    let engine = engine();
    let store = engine.event_store();
    let codec = EventCodec::new(engine.repository().registry().clone());

    let raw = serde_json::json!({
        "event_id": uuid::Uuid::now_v7(),
        "aggregate_id": AggregateId::new(),
        "aggregate_type": "fleet",
        "event_type": "agent.spawned",
        "event_version": 1,
        "aggregate_version": 1,
        "timestamp": "2024-05-01T12:00:00Z",
        "payload": { "agent_name": "relay", "attributes": { "zone": "eu" } },
        "trace_tag": "blue",
        "origin": { "host": "edge-3" }
    });
    let event: RecordedEvent = serde_json::from_value(raw)?;
    let original = codec.encode(&event)?;

    store.append(vec![event.clone()], ExpectedVersion::NoStream)?;
    let loaded = store.read_stream(event.aggregate_id, 0)?.remove(0).into_event();

    assert_eq!(loaded.extra["trace_tag"], "blue");
    assert_eq!(loaded.extra["origin"]["host"], "edge-3");
    assert_eq!(codec.encode(&loaded)?, original);
    assert_eq!(store.raw_event(1).unwrap(), original);
    Ok(())
}

#[test]
fn store_rejects_payloads_that_fail_their_schema() {
    let engine = engine();
    let mut event = RecordedEvent::from_typed(
        AggregateId::new(),
        "account",
        1,
        &EventMetadata::default(),
        &Deposited { amount: 9 },
    )
    .unwrap();
    event.payload = serde_json::json!({ "amount": "nine" });

    let err = engine
        .event_store()
        .append(vec![event], ExpectedVersion::NoStream)
        .unwrap_err();
    assert!(matches!(err, EventStoreError::InvalidAppend(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn chunked_saves_replay_to_the_same_state(
        amounts in proptest::collection::vec(-500i64..500, 1..30),
        chunk in 1usize..6,
    ) {
        let engine = engine();
        let repo = engine.repository();
        let mut account = Aggregate::<Account>::new(AggregateId::new()).unwrap();
        account.apply(Opened { owner: "prop".into() }).unwrap();

        for slice in amounts.chunks(chunk) {
            for &amount in slice {
                if amount >= 0 {
                    account.apply(Deposited { amount }).unwrap();
                } else {
                    account.apply(Withdrawn { amount: -amount }).unwrap();
                }
            }
            repo.save(&account).unwrap();
            account.mark_committed();
        }

        let loaded = repo.load::<Account>(*account.id()).unwrap().unwrap();
        prop_assert_eq!(loaded.state(), account.state());
        prop_assert_eq!(loaded.version(), amounts.len() as u64 + 1);
    }
}
