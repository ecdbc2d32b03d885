//! InMemoryPools - テスト用のプール collaborator
//!
//! Records which pools are running and with what configuration; no
//! connection is ever opened.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::PoolConfig;
use crate::error::LifecycleError;
use crate::ports::PoolLifecycle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolHandle {
    pub name: String,
}

#[derive(Default)]
pub struct InMemoryPools {
    running: Mutex<HashMap<String, PoolConfig>>,
}

impl InMemoryPools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn config(&self, name: &str) -> Option<PoolConfig> {
        self.lock().get(name).cloned()
    }

    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PoolConfig>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PoolLifecycle for InMemoryPools {
    type Handle = PoolHandle;

    async fn start_pool(
        &self,
        name: &str,
        config: &PoolConfig,
    ) -> Result<PoolHandle, LifecycleError> {
        config
            .validate()
            .map_err(|e| LifecycleError::Other(e.to_string()))?;
        let mut running = self.lock();
        if running.contains_key(name) {
            return Err(LifecycleError::AlreadyRunning {
                kind: "pool",
                name: name.to_string(),
            });
        }
        running.insert(name.to_string(), config.clone());
        Ok(PoolHandle {
            name: name.to_string(),
        })
    }

    async fn stop_pool(&self, handle: PoolHandle) -> Result<(), LifecycleError> {
        match self.lock().remove(&handle.name) {
            Some(_) => Ok(()),
            None => Err(LifecycleError::UnknownHandle(handle.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PoolConfig {
        PoolConfig::builder("localhost", 6379).build().unwrap()
    }

    #[tokio::test]
    async fn start_then_stop() {
        let pools = InMemoryPools::new();
        let handle = pools.start_pool("p1", &config()).await.unwrap();
        assert!(pools.is_running("p1"));
        assert_eq!(pools.config("p1"), Some(config()));

        pools.stop_pool(handle).await.unwrap();
        assert!(pools.running().is_empty());
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let pools = InMemoryPools::new();
        pools.start_pool("p1", &config()).await.unwrap();

        let err = pools.start_pool("p1", &config()).await.unwrap_err();
        let LifecycleError::AlreadyRunning { name, .. } = err else {
            panic!("expected AlreadyRunning");
        };
        assert_eq!(name, "p1");
    }

    #[tokio::test]
    async fn stopping_unknown_pool_fails() {
        let pools = InMemoryPools::new();
        let err = pools
            .stop_pool(PoolHandle {
                name: "ghost".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownHandle(_)));
    }
}
