//! URL cache with host-driven fetching.
//!
//! The cache owns a mutex; every public operation acquires and releases it.
//! Nothing fetches on its own: the host calls [`UrlCache::update`], which
//! performs a bounded number of fetch-slot transitions
//! (`Queued → InProgress → Complete | Failed`) through a pluggable
//! [`Fetcher`]. Notifications run synchronously while the lock is held;
//! handlers must not re-enter the cache on the same thread.
//!
//! Unreferenced complete entries are evicted least-recently-used when the
//! byte budget is exceeded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq)]
pub enum CacheError {
    #[error("malformed url: {0}")]
    BadUrl(String),
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    #[error("stale handle")]
    StaleHandle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UrlHandle(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FetchPriority {
    Low = 0,
    Normal = 1,
    High = 2,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Queued,
    InProgress,
    Complete,
    Failed,
}

/// Notifications delivered synchronously from inside the lock.
#[derive(Clone, Debug)]
pub enum Notification {
    FetchComplete(UrlHandle),
    FetchFailed(UrlHandle, String),
    Evicted(UrlHandle),
}

/// The thing that actually moves bytes. Blocking; called from `update`.
pub trait Fetcher: Send {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, String>;
}

/// Default fetcher over blocking HTTP.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new() -> HttpFetcher {
        HttpFetcher { agent: ureq::AgentBuilder::new().user_agent("folio/0.1").build() }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        HttpFetcher::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, String> {
        let response = self.agent.get(url.as_str()).call().map_err(|e| e.to_string())?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| e.to_string())?;
        Ok(bytes)
    }
}

struct Entry {
    url: Url,
    state: FetchState,
    priority: FetchPriority,
    data: Option<Arc<[u8]>>,
    refs: u32,
    last_use: u64,
    error: Option<String>,
}

struct Inner {
    entries: Vec<Entry>,
    by_url: HashMap<Url, UrlHandle>,
    use_clock: u64,
    bytes: usize,
}

type NotifyFn = Box<dyn FnMut(Notification) + Send>;

pub struct UrlCache {
    inner: Mutex<Inner>,
    fetcher: Box<dyn Fetcher>,
    notify: Mutex<Option<NotifyFn>>,
    byte_budget: usize,
}

impl UrlCache {
    pub fn new(byte_budget: usize, fetcher: Box<dyn Fetcher>) -> UrlCache {
        UrlCache {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                by_url: HashMap::new(),
                use_clock: 0,
                bytes: 0,
            }),
            fetcher,
            notify: Mutex::new(None),
            byte_budget,
        }
    }

    pub fn set_notify(&self, f: NotifyFn) {
        *self.notify.lock().unwrap() = Some(f);
    }

    fn emit(&self, n: Notification) {
        // Handlers run while the entry lock is held by the caller; they
        // must not re-enter the cache on this thread.
        if let Some(f) = self.notify.lock().unwrap().as_mut() {
            f(n);
        }
    }

    /// Requests a URL, returning a referenced handle. Repeated requests for
    /// the same URL share one slot; a higher priority wins.
    pub fn request(&self, url: &str, priority: FetchPriority) -> Result<UrlHandle, CacheError> {
        let parsed = Url::parse(url).map_err(|e| CacheError::BadUrl(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(CacheError::UnsupportedScheme(other.to_string())),
        }
        let mut inner = self.inner.lock().unwrap();
        inner.use_clock += 1;
        let clock = inner.use_clock;
        if let Some(&h) = inner.by_url.get(&parsed) {
            let e = &mut inner.entries[h.0 as usize];
            e.refs += 1;
            e.last_use = clock;
            if e.priority < priority {
                e.priority = priority;
            }
            if e.state == FetchState::Idle || e.state == FetchState::Failed {
                e.state = FetchState::Queued;
                e.error = None;
            }
            return Ok(h);
        }
        let h = UrlHandle(inner.entries.len() as u32);
        inner.entries.push(Entry {
            url: parsed.clone(),
            state: FetchState::Queued,
            priority,
            data: None,
            refs: 1,
            last_use: clock,
            error: None,
        });
        inner.by_url.insert(parsed, h);
        Ok(h)
    }

    pub fn state(&self, handle: UrlHandle) -> Result<FetchState, CacheError> {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .get(handle.0 as usize)
            .map(|e| e.state.clone())
            .ok_or(CacheError::StaleHandle)
    }

    /// Completed data, bumping the entry's recency.
    pub fn data(&self, handle: UrlHandle) -> Option<Arc<[u8]>> {
        let mut inner = self.inner.lock().unwrap();
        inner.use_clock += 1;
        let clock = inner.use_clock;
        let e = inner.entries.get_mut(handle.0 as usize)?;
        e.last_use = clock;
        e.data.clone()
    }

    pub fn add_ref(&self, handle: UrlHandle) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(e) = inner.entries.get_mut(handle.0 as usize) {
            e.refs += 1;
        }
    }

    pub fn release(&self, handle: UrlHandle) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(e) = inner.entries.get_mut(handle.0 as usize) {
            e.refs = e.refs.saturating_sub(1);
        }
    }

    /// Performs up to `max_transitions` fetch-slot transitions. Returns the
    /// number performed; the host calls this from its update loop.
    pub fn update(&self, max_transitions: usize) -> usize {
        let mut performed = 0;
        while performed < max_transitions {
            // Pick the highest-priority queued slot.
            let next = {
                let mut inner = self.inner.lock().unwrap();
                let next = inner
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.state == FetchState::Queued)
                    .max_by_key(|(_, e)| (e.priority, std::cmp::Reverse(e.last_use)))
                    .map(|(i, _)| UrlHandle(i as u32));
                if let Some(h) = next {
                    let e = &mut inner.entries[h.0 as usize];
                    e.state = FetchState::InProgress;
                    Some((h, e.url.clone()))
                } else {
                    None
                }
            };
            let Some((h, url)) = next else { break };

            log::debug!("fetching {url}");
            let result = self.fetcher.fetch(&url);
            {
                let mut inner = self.inner.lock().unwrap();
                match result {
                    Ok(bytes) => {
                        inner.bytes += bytes.len();
                        let e = &mut inner.entries[h.0 as usize];
                        e.data = Some(Arc::from(bytes.into_boxed_slice()));
                        e.state = FetchState::Complete;
                        self.emit(Notification::FetchComplete(h));
                    }
                    Err(message) => {
                        log::warn!("fetch failed for {url}: {message}");
                        let e = &mut inner.entries[h.0 as usize];
                        e.state = FetchState::Failed;
                        e.error = Some(message.clone());
                        self.emit(Notification::FetchFailed(h, message));
                    }
                }
                self.evict_over_budget(&mut inner);
            }
            performed += 1;
        }
        performed
    }

    fn evict_over_budget(&self, inner: &mut Inner) {
        while inner.bytes > self.byte_budget {
            let victim = inner
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.refs == 0 && e.state == FetchState::Complete)
                .min_by_key(|(_, e)| e.last_use)
                .map(|(i, _)| UrlHandle(i as u32));
            let Some(h) = victim else { break };
            let removed = inner.entries[h.0 as usize].data.take();
            if let Some(data) = removed {
                inner.bytes -= data.len();
            }
            inner.entries[h.0 as usize].state = FetchState::Idle;
            self.emit(Notification::Evicted(h));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher {
        responses: HashMap<String, Result<Vec<u8>, String>>,
        calls: AtomicUsize,
    }

    impl Fetcher for StubFetcher {
        fn fetch(&self, url: &Url) -> Result<Vec<u8>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(url.as_str())
                .cloned()
                .unwrap_or(Err("no such url".to_string()))
        }
    }

    fn stub(pairs: &[(&str, Result<Vec<u8>, String>)]) -> Box<StubFetcher> {
        Box::new(StubFetcher {
            responses: pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn fetch_completes_through_update() {
        let cache = UrlCache::new(
            1 << 20,
            stub(&[("http://a.invalid/x.png", Ok(vec![1, 2, 3]))]),
        );
        let h = cache.request("http://a.invalid/x.png", FetchPriority::Normal).unwrap();
        assert_eq!(cache.state(h).unwrap(), FetchState::Queued);
        // Nothing happens until the host drives the cache.
        assert_eq!(cache.data(h), None);
        assert_eq!(cache.update(8), 1);
        assert_eq!(cache.state(h).unwrap(), FetchState::Complete);
        assert_eq!(cache.data(h).unwrap().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn failures_are_reported_and_requeueable() {
        let cache = UrlCache::new(1 << 20, stub(&[]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        cache.set_notify(Box::new(move |n| seen2.lock().unwrap().push(format!("{n:?}"))));
        let h = cache.request("http://a.invalid/missing", FetchPriority::Low).unwrap();
        cache.update(8);
        assert_eq!(cache.state(h).unwrap(), FetchState::Failed);
        assert!(seen.lock().unwrap()[0].starts_with("FetchFailed"));
        // Re-requesting a failed URL queues it again.
        let h2 = cache.request("http://a.invalid/missing", FetchPriority::Low).unwrap();
        assert_eq!(h2, h);
        assert_eq!(cache.state(h).unwrap(), FetchState::Queued);
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let cache = UrlCache::new(1 << 20, stub(&[]));
        assert!(matches!(
            cache.request("file:///etc/passwd", FetchPriority::Low),
            Err(CacheError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            cache.request("not a url", FetchPriority::Low),
            Err(CacheError::BadUrl(_))
        ));
    }

    #[test]
    fn lru_eviction_respects_references() {
        let cache = UrlCache::new(
            4,
            stub(&[
                ("http://a.invalid/1", Ok(vec![0; 3])),
                ("http://a.invalid/2", Ok(vec![0; 3])),
            ]),
        );
        let h1 = cache.request("http://a.invalid/1", FetchPriority::Normal).unwrap();
        let h2 = cache.request("http://a.invalid/2", FetchPriority::Normal).unwrap();
        cache.update(8);
        // Both fetched (6 bytes > 4); h1 is older but referenced.
        assert_eq!(cache.state(h2).unwrap(), FetchState::Complete);
        cache.release(h1);
        cache.release(h2);
        let _ = cache.data(h2); // h2 most recently used
        cache.request("http://a.invalid/1", FetchPriority::Normal).unwrap();
        cache.update(8);
        assert_eq!(cache.state(h2).unwrap(), FetchState::Complete);
    }

    #[test]
    fn priority_orders_the_queue() {
        let cache = UrlCache::new(
            1 << 20,
            stub(&[
                ("http://a.invalid/low", Ok(vec![1])),
                ("http://a.invalid/high", Ok(vec![2])),
            ]),
        );
        let low = cache.request("http://a.invalid/low", FetchPriority::Low).unwrap();
        let high = cache.request("http://a.invalid/high", FetchPriority::High).unwrap();
        cache.update(1);
        assert_eq!(cache.state(high).unwrap(), FetchState::Complete);
        assert_eq!(cache.state(low).unwrap(), FetchState::Queued);
    }
}
