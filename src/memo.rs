use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::LoanError;

/// how a dependency token is fingerprinted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    /// shared handles compare by allocation; a rebuilt but equal value counts as changed
    Identity,
    /// tokens compare by content
    Value,
}

/// dependency token that can be fingerprinted
pub trait Fingerprint {
    fn fingerprint(&self, mode: HashMode) -> u64;
}

fn value_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

impl<T: Hash + ?Sized> Fingerprint for Arc<T> {
    fn fingerprint(&self, mode: HashMode) -> u64 {
        match mode {
            HashMode::Identity => Arc::as_ptr(self) as *const () as usize as u64,
            HashMode::Value => value_hash(&**self),
        }
    }
}

macro_rules! value_fingerprint {
    ($($t:ty),* $(,)?) => {
        $(
            // plain values have no identity of their own
            impl Fingerprint for $t {
                fn fingerprint(&self, _mode: HashMode) -> u64 {
                    value_hash(self)
                }
            }
        )*
    };
}

value_fingerprint!((), bool, u32, u64, i32, i64, usize, String, NaiveDate, Uuid, Money);

/// snapshot returned by a dependency reader
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot<D> {
    One(D),
    /// compared element-wise; a length change is a change
    Many(Vec<D>),
}

impl<D: Fingerprint> Snapshot<D> {
    fn fingerprints(&self, mode: HashMode) -> Vec<u64> {
        match self {
            Snapshot::One(token) => vec![token.fingerprint(mode)],
            Snapshot::Many(tokens) => tokens.iter().map(|t| t.fingerprint(mode)).collect(),
        }
    }
}

type Producer<T, E> = Box<dyn Fn() -> Result<T, E> + Send + Sync>;
type DependencyReader<D> = Box<dyn Fn() -> Snapshot<D> + Send + Sync>;

struct Cached<T, D> {
    value: T,
    fingerprint: Option<Vec<u64>>,
    // held so identity-hashed tokens cannot be freed and their address reused
    _dependencies: Option<Snapshot<D>>,
}

/// cache cell recomputed only when its dependency snapshot changes.
///
/// readers with an unchanged snapshot only take the read lock; recompute
/// runs under a per-cell mutex so concurrent callers never compute twice.
/// a failed recompute leaves the last good value and fingerprint in place.
pub struct MemoizedValue<T, D = (), E = LoanError> {
    producer: Producer<T, E>,
    dependencies: Option<DependencyReader<D>>,
    mode: HashMode,
    cached: RwLock<Option<Cached<T, D>>>,
    recompute: Mutex<()>,
}

impl<T: Clone, D: Fingerprint, E> MemoizedValue<T, D, E> {
    /// computed on first use and kept until invalidated
    pub fn new(producer: impl Fn() -> Result<T, E> + Send + Sync + 'static) -> Self {
        Self {
            producer: Box::new(producer),
            dependencies: None,
            mode: HashMode::Value,
            cached: RwLock::new(None),
            recompute: Mutex::new(()),
        }
    }

    /// recomputed whenever the dependency snapshot's fingerprint changes
    pub fn with_dependencies(
        producer: impl Fn() -> Result<T, E> + Send + Sync + 'static,
        dependencies: impl Fn() -> Snapshot<D> + Send + Sync + 'static,
        mode: HashMode,
    ) -> Self {
        Self {
            producer: Box::new(producer),
            dependencies: Some(Box::new(dependencies)),
            mode,
            cached: RwLock::new(None),
            recompute: Mutex::new(()),
        }
    }

    pub fn get(&self) -> Result<T, E> {
        let snapshot = self.dependencies.as_ref().map(|watch| watch());
        let current = snapshot.as_ref().map(|s| s.fingerprints(self.mode));
        if let Some(value) = self.fresh(&current) {
            return Ok(value);
        }

        let _guard = self.recompute.lock().unwrap_or_else(PoisonError::into_inner);

        // another caller may have finished the recompute while we waited
        if let Some(value) = self.fresh(&current) {
            return Ok(value);
        }

        let value = (self.producer)()?;
        let mut cached = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(Cached {
            value: value.clone(),
            fingerprint: current,
            _dependencies: snapshot,
        });
        Ok(value)
    }

    /// drop the cached value; the next `get` recomputes
    pub fn invalidate(&self) {
        let _guard = self.recompute.lock().unwrap_or_else(PoisonError::into_inner);
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cached.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    pub fn mode(&self) -> HashMode {
        self.mode
    }

    fn fresh(&self, current: &Option<Vec<u64>>) -> Option<T> {
        let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
        cached
            .as_ref()
            .filter(|c| &c.fingerprint == current)
            .map(|c| c.value.clone())
    }
}
