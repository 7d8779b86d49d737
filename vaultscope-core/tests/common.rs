#![allow(dead_code, missing_docs)]

//! Common test utilities shared across integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rand::distributions::Alphanumeric;
use rand::{rngs::OsRng, Rng, RngCore};
use vaultscope_core::store::memory::MemoryStore;
use vaultscope_core::store::{AttrKey, Query, WireQuery};
use vaultscope_core::{
    AccessControl, AuthContext, AuthOutcome, Authenticator, ScopeFactory, WritePolicy,
};

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub factory: ScopeFactory,
}

pub fn harness() -> Harness {
    harness_with(WritePolicy::platform_default())
}

pub fn harness_with(policy: WritePolicy) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let factory = ScopeFactory::builder(store.clone())
        .write_policy(policy)
        .build();
    Harness { store, factory }
}

pub fn harness_with_authenticator(authenticator: Arc<ScriptedAuthenticator>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let factory = ScopeFactory::builder(store.clone())
        .authenticator(authenticator)
        .build();
    Harness { store, factory }
}

/// Plays back a fixed list of outcomes and records every prompt shown.
pub struct ScriptedAuthenticator {
    outcomes: Mutex<VecDeque<AuthOutcome>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAuthenticator {
    pub fn new(outcomes: Vec<AuthOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn granting(times: usize) -> Self {
        Self::new(
            (0..times)
                .map(|i| AuthOutcome::Granted(AuthContext::new(vec![0xA0, u8::try_from(i).unwrap()])))
                .collect(),
        )
    }

    pub fn evaluations(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Authenticator for ScriptedAuthenticator {
    fn evaluate(&self, _control: AccessControl, prompt: &str) -> AuthOutcome {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| AuthOutcome::Failed("no scripted outcome".to_string()))
    }
}

pub fn random_key() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

pub fn random_value() -> Vec<u8> {
    let mut value = vec![0u8; OsRng.gen_range(1..64)];
    OsRng.fill_bytes(&mut value);
    value
}

/// Plants a generic-password item the way a pre-scope writer would have.
pub fn plant_legacy(store: &MemoryStore, service: &str, account: &str, value: &[u8]) {
    let mut attributes = WireQuery::new();
    attributes.insert(AttrKey::Class, "genp".into());
    attributes.insert(AttrKey::Service, service.into());
    attributes.insert(AttrKey::Account, account.into());
    store.insert_raw(attributes, Some(value.to_vec()));
}

pub fn legacy_query(service: &str) -> Query {
    Query {
        service: Some(service.to_string()),
        ..Query::generic_password()
    }
    .for_migration()
}
