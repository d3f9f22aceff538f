//! Component C: the port store (spec §4.C).
//!
//! A port slot is created lazily, by whichever side — producer or
//! waiter — references it first, and transitions Empty → Ready exactly
//! once. Readers block on the transition; writes past the first are a
//! precondition violation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use swirl_model::PortValue;

use crate::error::{Result, RuntimeError};

struct PortSlot {
    value: Mutex<Option<PortValue>>,
    ready: Notify,
}

impl PortSlot {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Notify::new(),
        }
    }

    async fn set(&self, name: &str, value: PortValue) -> Result<()> {
        let mut guard = self.value.lock().await;
        if guard.is_some() {
            return Err(RuntimeError::PortAlreadySet(name.to_string()));
        }
        *guard = Some(value);
        drop(guard);
        self.ready.notify_waiters();
        Ok(())
    }

    async fn get(&self) -> PortValue {
        loop {
            let notified = self.ready.notified();
            {
                let guard = self.value.lock().await;
                if let Some(value) = guard.as_ref() {
                    return value.clone();
                }
            }
            notified.await;
        }
    }
}

/// Mapping from port name to [`PortSlot`], scoped to one location's process.
#[derive(Default)]
pub struct PortStore {
    slots: Mutex<HashMap<String, Arc<PortSlot>>>,
}

impl PortStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, name: &str) -> Arc<PortSlot> {
        let mut guard = self.slots.lock().await;
        guard.entry(name.to_string()).or_insert_with(|| Arc::new(PortSlot::new())).clone()
    }

    /// Compiler-generated, one-shot seeding of a dataset binding. Fails if
    /// the port has already been set.
    pub async fn init_port(&self, name: &str, value: PortValue) -> Result<()> {
        self.slot(name).await.set(name, value).await
    }

    /// Called from the receive or step-execution paths; same single-write
    /// guarantee as `init_port`.
    pub async fn set_port(&self, name: &str, value: PortValue) -> Result<()> {
        self.slot(name).await.set(name, value).await
    }

    /// Blocks until `name` is Ready, creating the slot if this is the
    /// first reference. Many concurrent awaiters are permitted.
    pub async fn await_port(&self, name: &str) -> PortValue {
        self.slot(name).await.get().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_then_await_returns_value() {
        let store = PortStore::new();
        store.init_port("p1", PortValue::Int(7)).await.unwrap();
        assert_eq!(store.await_port("p1").await, PortValue::Int(7));
    }

    #[tokio::test]
    async fn await_blocks_until_set() {
        let store = Arc::new(PortStore::new());
        let reader = {
            let store = store.clone();
            tokio::spawn(async move { store.await_port("p1").await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        store.init_port("p1", PortValue::Bool(true)).await.unwrap();

        let value = reader.await.unwrap();
        assert_eq!(value, PortValue::Bool(true));
    }

    #[tokio::test]
    async fn double_write_is_rejected() {
        let store = PortStore::new();
        store.init_port("p1", PortValue::Int(1)).await.unwrap();
        let err = store.set_port("p1", PortValue::Int(2)).await.unwrap_err();
        assert!(matches!(err, RuntimeError::PortAlreadySet(_)));
    }

    #[tokio::test]
    async fn many_concurrent_awaiters_all_observe_the_value() {
        let store = Arc::new(PortStore::new());
        let mut readers = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            readers.push(tokio::spawn(async move { store.await_port("p1").await }));
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        store.init_port("p1", PortValue::String("hi".into())).await.unwrap();
        for r in readers {
            assert_eq!(r.await.unwrap(), PortValue::String("hi".into()));
        }
    }
}
