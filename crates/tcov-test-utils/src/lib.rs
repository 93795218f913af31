//! Testing utilities for tcov workspace
//!
//! Shared fixtures for methods, class metadata and sessions, plus a store
//! that fails on demand.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tcov_counter::{ClassMetadata, ClassRegistry, MethodMetadata, ProbeWeight};
use tcov_model::{ExecClassData, FinishedSession, Method, Probes};
use tcov_store::{MemoryStore, Store, StoreClient, StoreError, StoreResult};

pub fn method(owner: &str, name: &str, hash: &str) -> Method {
    Method::new(owner, name, "()V", hash)
}

/// Builds class metadata with consecutive probes per method
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    class: ClassMetadata,
}

pub fn class(name: &str) -> ClassBuilder {
    ClassBuilder {
        class: ClassMetadata {
            id: 0,
            name: name.to_string(),
            probe_count: 0,
            methods: Vec::new(),
        },
    }
}

impl ClassBuilder {
    /// Add a `()V` method; one probe per entry of `instructions`
    pub fn method(self, name: &str, hash: &str, instructions: &[u32]) -> Self {
        self.method_with_desc(name, "()V", hash, instructions)
    }

    pub fn method_with_desc(mut self, name: &str, desc: &str, hash: &str, instructions: &[u32]) -> Self {
        let first = self.class.probe_count;
        let probes = instructions
            .iter()
            .zip(first..)
            .map(|(instructions, probe)| ProbeWeight {
                probe,
                instructions: *instructions,
            })
            .collect::<Vec<_>>();
        self.class.probe_count += probes.len() as u32;
        self.class.methods.push(MethodMetadata::new(name, desc, hash, probes));
        self
    }

    pub fn id(mut self, id: u64) -> Self {
        self.class.id = id;
        self
    }

    pub fn build(self) -> ClassMetadata {
        self.class
    }
}

pub fn registry(classes: impl IntoIterator<Item = ClassBuilder>) -> ClassRegistry {
    let (registry, skipped) = ClassRegistry::from_classes(classes.into_iter().map(ClassBuilder::build));
    assert!(skipped.is_empty(), "invalid fixture classes: {skipped:?}");
    registry
}

/// Exec data hitting the given probe indexes of a class with `len` probes
pub fn exec(class: &str, len: u32, hits: &[u32]) -> ExecClassData {
    let mut probes = Probes::new(len);
    for hit in hits {
        probes.set(*hit);
    }
    ExecClassData::new(class, probes)
}

pub fn session(id: &str, test_type: &str, probes: Vec<ExecClassData>) -> FinishedSession {
    FinishedSession {
        id: id.to_string(),
        test_type: test_type.to_string(),
        name: String::new(),
        probes,
    }
}

pub fn memory_client() -> StoreClient {
    StoreClient::new(MemoryStore::new())
}

/// In-memory store whose reads and writes can be made to fail
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    failing_collection: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail writes to one collection only; `None` clears it
    pub fn fail_collection(&self, collection: Option<&str>) {
        *self.failing_collection.lock() = collection.map(str::to_string);
    }

    /// Number of successful `put` calls
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn client(self: &Arc<Self>) -> StoreClient {
        StoreClient::from_arc(Arc::clone(self) as Arc<dyn Store>)
    }

    fn check(&self, flag: &AtomicBool) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }

    fn check_write(&self, collection: &str) -> StoreResult<()> {
        self.check(&self.fail_writes)?;
        if self.failing_collection.lock().as_deref() == Some(collection) {
            return Err(StoreError::Unavailable(format!("injected failure on {collection}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
        self.check(&self.fail_reads)?;
        self.inner.get(collection, id).await
    }

    async fn put(&self, collection: &str, id: &str, secondary: Option<&str>, value: Value) -> StoreResult<()> {
        self.check_write(collection)?;
        self.inner.put(collection, id, secondary, value).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_by(&self, collection: &str, secondary: &str) -> StoreResult<Vec<Value>> {
        self.check(&self.fail_reads)?;
        self.inner.find_by(collection, secondary).await
    }

    async fn all(&self, collection: &str) -> StoreResult<Vec<Value>> {
        self.check(&self.fail_reads)?;
        self.inner.all(collection).await
    }

    async fn remove(&self, collection: &str, id: &str) -> StoreResult<bool> {
        self.check_write(collection)?;
        self.inner.remove(collection, id).await
    }

    async fn remove_by(&self, collection: &str, secondary: &str) -> StoreResult<usize> {
        self.check_write(collection)?;
        self.inner.remove_by(collection, secondary).await
    }
}
