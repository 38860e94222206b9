//! 키별 상호 배제를 제공하는 동기화 맵.
//!
//! 맵 자체는 `RwLock`으로 보호하고, 각 값은 개별 `Mutex`로 감쌉니다.
//! 서로 다른 키에 대한 갱신은 서로를 막지 않고, 같은 키에 대한 갱신은 직렬화됩니다.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::warn;

/// 키별 `Mutex`를 가진 동기화 맵.
#[derive(Debug)]
pub struct SynchronizedMap<K, V> {
    entries: RwLock<HashMap<K, Arc<Mutex<V>>>>,
}

impl<K, V> Default for SynchronizedMap<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

fn recover<T>(poisoned: PoisonError<T>) -> T {
    warn!("SynchronizedMap lock was poisoned, recovering");
    poisoned.into_inner()
}

fn lock_value<V>(value: &Mutex<V>) -> MutexGuard<'_, V> {
    value.lock().unwrap_or_else(recover)
}

impl<K, V> SynchronizedMap<K, V>
where
    K: Eq + Hash,
{
    /// 빈 맵을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 키에 해당하는 값을 가져오거나 `init`으로 생성합니다.
    fn entry<Q>(&self, key: &Q, init: impl FnOnce() -> V) -> Arc<Mutex<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        {
            let entries = self.entries.read().unwrap_or_else(recover);
            if let Some(value) = entries.get(key) {
                return value.clone();
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(recover);
        entries
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(init())))
            .clone()
    }

    /// 키의 `Mutex`를 잡은 상태로 `f`를 실행합니다.
    ///
    /// 값이 없으면 `init`으로 먼저 생성합니다.
    pub fn with_entry<Q, R>(
        &self,
        key: &Q,
        init: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> R
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let value = self.entry(key, init);
        let mut guard = lock_value(&value);
        f(&mut *guard)
    }

    /// 값이 있으면 복사본을 반환합니다.
    pub fn get_cloned<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let value = self.entries.read().unwrap_or_else(recover).get(key).cloned()?;
        let guard = lock_value(&value);
        Some((*guard).clone())
    }

    /// `keep`이 `false`를 반환하는 항목을 제거하고 제거한 개수를 반환합니다.
    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(recover);
        let before = entries.len();
        entries.retain(|key, value| keep(key, &*lock_value(value)));
        before - entries.len()
    }

    /// 항목 수.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(recover).len()
    }

    /// 비어있는지 확인.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
