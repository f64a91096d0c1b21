#![allow(dead_code)]

use serde::{Deserialize, Serialize};

use chronicle_events::{AggregateState, DomainEvent, EventRegistry, HandlerTable, HandlerTableBuilder};
use chronicle_infra::{EngineConfig, InMemoryEngine};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opened {
    pub owner: String,
}
impl DomainEvent for Opened {
    const EVENT_TYPE: &'static str = "account.opened";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposited {
    pub amount: i64,
}
impl DomainEvent for Deposited {
    const EVENT_TYPE: &'static str = "account.deposited";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawn {
    pub amount: i64,
}
impl DomainEvent for Withdrawn {
    const EVENT_TYPE: &'static str = "account.withdrawn";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub owner: String,
    pub balance: i64,
    pub movements: u32,
}

impl AggregateState for Account {
    const AGGREGATE_TYPE: &'static str = "account";

    fn handlers() -> HandlerTableBuilder<Self> {
        HandlerTable::builder(Self::AGGREGATE_TYPE)
            .on(|s: &mut Account, e: &Opened| s.owner = e.owner.clone())
            .on(|s: &mut Account, e: &Deposited| {
                s.balance += e.amount;
                s.movements += 1;
            })
            .on(|s: &mut Account, e: &Withdrawn| {
                s.balance -= e.amount;
                s.movements += 1;
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placed {
    pub sku: String,
    pub quantity: u32,
}
impl DomainEvent for Placed {
    const EVENT_TYPE: &'static str = "order.placed";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub lines: Vec<(String, u32)>,
}

impl AggregateState for Order {
    const AGGREGATE_TYPE: &'static str = "order";

    fn handlers() -> HandlerTableBuilder<Self> {
        HandlerTable::builder(Self::AGGREGATE_TYPE)
            .on(|s: &mut Order, e: &Placed| s.lines.push((e.sku.clone(), e.quantity)))
    }
}

/// Registered with the handler table but deliberately absent from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpawned {
    pub agent_name: String,
    pub attributes: serde_json::Value,
}
impl DomainEvent for AgentSpawned {
    const EVENT_TYPE: &'static str = "agent.spawned";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fleet {
    pub agents: Vec<String>,
}

impl AggregateState for Fleet {
    const AGGREGATE_TYPE: &'static str = "fleet";

    fn handlers() -> HandlerTableBuilder<Self> {
        HandlerTable::builder(Self::AGGREGATE_TYPE)
            .on(|s: &mut Fleet, e: &AgentSpawned| s.agents.push(e.agent_name.clone()))
    }
}

pub fn registry() -> EventRegistry {
    EventRegistry::new()
        .with::<Opened>()
        .and_then(|r| r.with::<Deposited>())
        .and_then(|r| r.with::<Withdrawn>())
        .and_then(|r| r.with::<Placed>())
        .unwrap()
}

pub fn init_logging() {
    chronicle_observability::init_pretty("warn");
}

pub fn engine_with(config: EngineConfig) -> InMemoryEngine {
    init_logging();
    InMemoryEngine::new(config, registry()).unwrap()
}

pub fn engine() -> InMemoryEngine {
    engine_with(EngineConfig::default())
}
