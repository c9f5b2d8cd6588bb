//! Process-local implementations of the storage, cache and emitter ports.
//! Used by the test suite.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::{SagaEntity, SagaState};
use crate::error::{CacheError, EmitError, RepositoryError, RepositoryResult};
use crate::events::EventEnvelope;
use crate::ports::{CacheStore, EntityRepository, EventEmitter, ThresholdComparison};
use crate::saga::Repositories;

/// Textual value of a JSON field, matching what `#>>` returns in Postgres.
pub(crate) fn field_text(value: &serde_json::Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for segment in path {
        current = current.get(*segment)?;
    }
    match current {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub struct InMemoryRepository<E: SagaEntity> {
    entities: RwLock<HashMap<Uuid, E>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: SagaEntity> Default for InMemoryRepository<E> {
    fn default() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            _entity: PhantomData,
        }
    }
}

impl<E: SagaEntity> InMemoryRepository<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<E> {
        self.entities.read().await.values().cloned().collect()
    }

    /// Stores an entity as-is, bypassing creation checks. Test seeding only.
    pub async fn insert(&self, entity: E) {
        self.entities.write().await.insert(entity.id(), entity);
    }
}

#[async_trait]
impl<E: SagaEntity> EntityRepository<E> for InMemoryRepository<E> {
    async fn create(&self, entity: &E) -> RepositoryResult<E> {
        let mut entities = self.entities.write().await;
        if entities.contains_key(&entity.id()) {
            return Err(RepositoryError::Conflict(entity.id()));
        }
        entities.insert(entity.id(), entity.clone());
        Ok(entity.clone())
    }

    async fn update(&self, entity: &E) -> RepositoryResult<E> {
        let mut entities = self.entities.write().await;
        match entities.get_mut(&entity.id()) {
            Some(stored) => {
                *stored = entity.clone();
                Ok(entity.clone())
            }
            None => Err(RepositoryError::NotFound(entity.id())),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Option<E>> {
        Ok(self.entities.read().await.get(&id).cloned())
    }

    async fn find_by_field(&self, path: &[&str], value: &str) -> RepositoryResult<Vec<E>> {
        let entities = self.entities.read().await;
        let mut found = Vec::new();
        for entity in entities.values() {
            let json = serde_json::to_value(entity)?;
            if field_text(&json, path).as_deref() == Some(value) {
                found.push(entity.clone());
            }
        }
        found.sort_by_key(|entity| entity.created_at());
        Ok(found)
    }

    async fn get_all_by_state(&self, state: E::State) -> RepositoryResult<Vec<E>> {
        let mut found: Vec<E> = self
            .entities
            .read()
            .await
            .values()
            .filter(|entity| entity.state() == state)
            .cloned()
            .collect();
        found.sort_by_key(|entity| entity.created_at());
        Ok(found)
    }

    async fn get_all_by_state_and_threshold_date(
        &self,
        state: E::State,
        threshold: DateTime<Utc>,
        comparison: ThresholdComparison,
    ) -> RepositoryResult<Vec<E>> {
        Ok(self
            .get_all_by_state(state)
            .await?
            .into_iter()
            .filter(|entity| comparison.matches(entity.updated_at(), threshold))
            .collect())
    }

    async fn update_state_if(&self, id: Uuid, expected: E::State, next: E::State) -> RepositoryResult<bool> {
        let mut entities = self.entities.write().await;
        let Some(entity) = entities.get_mut(&id) else {
            return Err(RepositoryError::NotFound(id));
        };
        if entity.state() != expected {
            return Ok(false);
        }
        entity.set_state(next);
        entity.touch();
        tracing::trace!(entity_id = %id, from = expected.as_str(), to = next.as_str(), "state swapped");
        Ok(true)
    }
}

/// A fresh, empty repository per entity kind.
pub fn in_memory_repositories() -> Repositories {
    Repositories {
        payments: Arc::new(InMemoryRepository::new()),
        deposits: Arc::new(InMemoryRepository::new()),
        devolutions: Arc::new(InMemoryRepository::new()),
        devolutions_received: Arc::new(InMemoryRepository::new()),
        refund_devolutions: Arc::new(InMemoryRepository::new()),
        warning_devolutions: Arc::new(InMemoryRepository::new()),
        warning_deposits: Arc::new(InMemoryRepository::new()),
        infractions: Arc::new(InMemoryRepository::new()),
        refunds: Arc::new(InMemoryRepository::new()),
        refund_operations: Arc::new(InMemoryRepository::new()),
        fraud_detections: Arc::new(InMemoryRepository::new()),
        sms: Arc::new(InMemoryRepository::new()),
        emails: Arc::new(InMemoryRepository::new()),
    }
}

#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn live<'a>(entries: &'a mut HashMap<String, (String, Instant)>, key: &str) -> Option<&'a mut (String, Instant)> {
        if entries.get(key).is_some_and(|(_, expires)| *expires <= Instant::now()) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock().await;
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn refresh_if_owner(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key) {
            Some((value, expires)) if value == owner => {
                *expires = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_owner(&self, key: &str, owner: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock().await;
        let owned = matches!(Self::live(&mut entries, key), Some((value, _)) if value == owner);
        if owned {
            entries.remove(key);
        }
        Ok(owned)
    }
}

/// Emitter that keeps every published event, in order.
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<(String, EventEnvelope)>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<(String, EventEnvelope)> {
        self.events.lock().await.clone()
    }

    pub async fn topics(&self) -> Vec<String> {
        self.events.lock().await.iter().map(|(topic, _)| topic.clone()).collect()
    }

    /// Removes and returns everything recorded so far.
    pub async fn drain(&self) -> Vec<(String, EventEnvelope)> {
        std::mem::take(&mut *self.events.lock().await)
    }
}

#[async_trait]
impl EventEmitter for RecordingEmitter {
    async fn emit(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), EmitError> {
        self.events.lock().await.push((topic.to_string(), envelope.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NotificationState, Sms};

    fn sms(phone_number: &str) -> Sms {
        let now = Utc::now();
        Sms {
            id: Uuid::new_v4(),
            user_id: None,
            phone_number: phone_number.to_string(),
            body: "code 1234".to_string(),
            idempotency_token: None,
            route: vec!["A".to_string()],
            attempt: 0,
            state: NotificationState::Pending,
            failed: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_field_text_reads_nested_and_scalar_values() {
        let value = serde_json::json!({ "operation": { "id": "abc", "value": 10 }, "amount": 5, "none": null });
        assert_eq!(field_text(&value, &["operation", "id"]).as_deref(), Some("abc"));
        assert_eq!(field_text(&value, &["amount"]).as_deref(), Some("5"));
        assert_eq!(field_text(&value, &["none"]), None);
        assert_eq!(field_text(&value, &["missing"]), None);
    }

    #[tokio::test]
    async fn test_repository_rejects_duplicate_create() {
        let repository = InMemoryRepository::<Sms>::new();
        let record = sms("+5511999990000");
        repository.create(&record).await.unwrap();
        assert!(matches!(
            repository.create(&record).await,
            Err(RepositoryError::Conflict(id)) if id == record.id
        ));
    }

    #[tokio::test]
    async fn test_update_state_if_is_compare_and_set() {
        let repository = InMemoryRepository::<Sms>::new();
        let record = sms("+5511999990000");
        repository.create(&record).await.unwrap();

        assert!(repository
            .update_state_if(record.id, NotificationState::Pending, NotificationState::Processing)
            .await
            .unwrap());
        assert!(!repository
            .update_state_if(record.id, NotificationState::Pending, NotificationState::Processing)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_find_by_field() {
        let repository = InMemoryRepository::<Sms>::new();
        repository.create(&sms("+5511999990000")).await.unwrap();
        repository.create(&sms("+14155550100")).await.unwrap();

        let found = repository.find_by_field(&["phoneNumber"], "+14155550100").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].phone_number, "+14155550100");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_entries_expire() {
        let cache = InMemoryCache::new();
        assert!(cache.set_if_absent("k", "a", Duration::from_secs(10)).await.unwrap());
        assert!(!cache.set_if_absent("k", "b", Duration::from_secs(10)).await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.set_if_absent("k", "b", Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_owner_checks() {
        let cache = InMemoryCache::new();
        cache.set("lock", "owner-1", Duration::from_secs(10)).await.unwrap();
        assert!(!cache.delete_if_owner("lock", "owner-2").await.unwrap());
        assert!(cache.refresh_if_owner("lock", "owner-1", Duration::from_secs(10)).await.unwrap());
        assert!(cache.delete_if_owner("lock", "owner-1").await.unwrap());
        assert_eq!(cache.get("lock").await.unwrap(), None);
    }
}
