//! Async-data binding: fetch once on the server, reuse on the client.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::Value;
use ssr_core::Environment;
use ssr_fetch::{FetchError, FetchInstance};

use crate::{DataCache, DataError, PrefetchQueue};

type InflightFetch = Shared<BoxFuture<'static, Result<Value, DataError>>>;

/// Outcome of binding a cache key to a data-producing function.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Server: registered with the prefetch phase.
    Deferred,
    /// Server: the key was already registered in this render.
    Duplicate,
    /// Client: value found in the cache; nothing was fetched.
    Cached(Value),
    /// Client: joined a fetch already in flight for the same key.
    Joined(Value),
    /// Client: fetched now and written to the cache.
    Fetched(Value),
}

impl Binding {
    /// The bound value, if it is known yet.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Binding::Cached(v) | Binding::Joined(v) | Binding::Fetched(v) => Some(v),
            Binding::Deferred | Binding::Duplicate => None,
        }
    }

    /// Check if this binding issued its own fetch.
    pub fn fetched(&self) -> bool {
        matches!(self, Binding::Fetched(_))
    }
}

/// Data context of one application instance.
///
/// Owns the cache, the fetch instance handed to data-producing functions,
/// and, on the server, the prefetch queue. Clones share all of them.
#[derive(Clone)]
pub struct DataScope {
    env: Environment,
    cache: DataCache,
    fetch: Arc<FetchInstance>,
    prefetch: PrefetchQueue,
    registered: Arc<Mutex<HashSet<String>>>,
    inflight: Arc<Mutex<HashMap<String, InflightFetch>>>,
}

impl std::fmt::Debug for DataScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataScope")
            .field("env", &self.env)
            .field("entries", &self.cache.len())
            .field("prefetch", &self.prefetch)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DataScope {
    /// Create a scope with an empty cache.
    pub fn new(env: Environment, fetch: FetchInstance) -> Self {
        Self::with_cache(env, fetch, DataCache::new())
    }

    /// Create a scope over an existing cache.
    pub fn with_cache(env: Environment, fetch: FetchInstance, cache: DataCache) -> Self {
        Self {
            env,
            cache,
            fetch: Arc::new(fetch),
            prefetch: PrefetchQueue::new(),
            registered: Arc::default(),
            inflight: Arc::default(),
        }
    }

    /// Environment this scope runs in.
    pub fn env(&self) -> Environment {
        self.env
    }

    /// The scope's cache.
    pub fn cache(&self) -> &DataCache {
        &self.cache
    }

    /// The scope's fetch instance.
    pub fn fetch(&self) -> &Arc<FetchInstance> {
        &self.fetch
    }

    /// Bind `key` to a data-producing function.
    ///
    /// On the server the function is deferred to the prefetch phase and its
    /// result written to the cache there; a key already registered in this
    /// render is not registered again. On the client the cache is read
    /// first and the function only runs on a miss; a second binding of a
    /// key whose fetch is still in flight waits for that fetch instead of
    /// issuing another.
    pub async fn use_async_data<T, F, Fut>(
        &self,
        key: impl Into<String>,
        producer: F,
    ) -> Result<Binding, DataError>
    where
        T: Serialize + Send + 'static,
        F: FnOnce(Arc<FetchInstance>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let key = key.into();
        match self.env {
            Environment::Server => Ok(self.defer(key, producer)),
            Environment::Client => self.resolve(key, producer).await,
        }
    }

    /// Run the producer now and overwrite whatever the cache holds.
    pub async fn refresh<T, F, Fut>(
        &self,
        key: impl Into<String>,
        producer: F,
    ) -> Result<Value, DataError>
    where
        T: Serialize + Send + 'static,
        F: FnOnce(Arc<FetchInstance>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let key = key.into();
        tracing::debug!(key = %key, "refresh");
        produce(key, Arc::clone(&self.fetch), self.cache.clone(), producer).await
    }

    /// Await every deferred binding registered so far, including ones
    /// registered while the phase runs.
    pub async fn run_prefetch(&self) -> Result<usize, DataError> {
        self.prefetch.run_all().await
    }

    /// Number of deferred bindings not yet started.
    pub fn pending_prefetch(&self) -> usize {
        self.prefetch.pending()
    }

    fn defer<T, F, Fut>(&self, key: String, producer: F) -> Binding
    where
        T: Serialize + Send + 'static,
        F: FnOnce(Arc<FetchInstance>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        if !lock(&self.registered).insert(key.clone()) {
            tracing::debug!(key = %key, "binding already registered for this render");
            return Binding::Duplicate;
        }

        let task = produce(key.clone(), Arc::clone(&self.fetch), self.cache.clone(), producer)
            .map(|result| result.map(|_| ()))
            .boxed();
        self.prefetch.register(key, task);
        Binding::Deferred
    }

    async fn resolve<T, F, Fut>(&self, key: String, producer: F) -> Result<Binding, DataError>
    where
        T: Serialize + Send + 'static,
        F: FnOnce(Arc<FetchInstance>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        if let Some(value) = self.cache.get_data(&key) {
            tracing::trace!(key = %key, "cache hit");
            return Ok(Binding::Cached(value));
        }

        let (fetch, joined) = {
            let mut inflight = lock(&self.inflight);
            match inflight.get(&key) {
                Some(existing) => (existing.clone(), true),
                None => {
                    let produced = produce(
                        key.clone(),
                        Arc::clone(&self.fetch),
                        self.cache.clone(),
                        producer,
                    );
                    // Released by whichever caller drives the fetch to
                    // completion, not only by the one that started it.
                    let slots = Arc::clone(&self.inflight);
                    let slot = key.clone();
                    let fetch = async move {
                        let result = produced.await;
                        lock(&slots).remove(&slot);
                        result
                    }
                    .boxed()
                    .shared();
                    inflight.insert(key.clone(), fetch.clone());
                    (fetch, false)
                }
            }
        };

        let value = fetch.await?;
        Ok(if joined {
            Binding::Joined(value)
        } else {
            Binding::Fetched(value)
        })
    }
}

async fn produce<T, F, Fut>(
    key: String,
    fetch: Arc<FetchInstance>,
    cache: DataCache,
    producer: F,
) -> Result<Value, DataError>
where
    T: Serialize,
    F: FnOnce(Arc<FetchInstance>) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let data = producer(fetch)
        .await
        .map_err(|source| DataError::Fetch {
            key: key.clone(),
            source,
        })?;
    let value = serde_json::to_value(data).map_err(|e| DataError::Serialize {
        key: key.clone(),
        message: e.to_string(),
    })?;
    cache.set_data(key, value.clone());
    Ok(value)
}
