//! Process-wide cache of per-type tables.
//!
//! Registration metadata and collection capabilities are built once per
//! Rust type and shared afterwards. Each entry is a cell created under a
//! short write lock and initialized outside of it, so building one type's
//! table may freely read the tables of other types.

use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

type Entry = Arc<dyn Any + Send + Sync>;
type Cell = Arc<OnceLock<Entry>>;

static CELLS: OnceLock<RwLock<FxHashMap<(TypeId, TypeId), Cell>>> = OnceLock::new();

fn cell_for<K: 'static, V: 'static>() -> Cell {
    let key = (TypeId::of::<K>(), TypeId::of::<V>());
    let cells = CELLS.get_or_init(Default::default);

    if let Some(cell) = cells
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return Arc::clone(cell);
    }

    let mut cells = cells.write().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(cells.entry(key).or_default())
}

/// Returns the shared `V` for type `K`, building it on first use.
pub(crate) fn cached<K, V>(build: fn() -> V) -> Arc<V>
where
    K: 'static,
    V: Any + Send + Sync,
{
    let cell = cell_for::<K, V>();
    let entry = cell.get_or_init(|| Arc::new(build()) as Entry);
    match Arc::clone(entry).downcast::<V>() {
        Ok(value) => value,
        // Cells are keyed by the value type, so this arm is never taken.
        Err(_) => Arc::new(build()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    struct Marker;

    fn build() -> String {
        BUILDS.fetch_add(1, Ordering::SeqCst);
        "built".to_string()
    }

    #[test]
    fn test_cached_builds_once() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| cached::<Marker, String>(build)))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().as_str(), "built");
        }
        assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
    }
}
