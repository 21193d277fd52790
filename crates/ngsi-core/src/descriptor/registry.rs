//! Process-wide cache of validated descriptors, keyed by type.

use super::{NgsiMapped, TypeDescriptor};
use crate::error::MappingResult;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::debug;

type ErasedDescriptor = Arc<dyn Any + Send + Sync>;

fn registry() -> &'static RwLock<HashMap<TypeId, ErasedDescriptor>> {
    static REGISTRY: OnceLock<RwLock<HashMap<TypeId, ErasedDescriptor>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn lookup<T: NgsiMapped>() -> Option<Arc<TypeDescriptor<T>>> {
    let cache = registry().read().unwrap_or_else(|poisoned| poisoned.into_inner());
    cache
        .get(&TypeId::of::<T>())
        .cloned()
        .and_then(|erased| erased.downcast::<TypeDescriptor<T>>().ok())
}

/// Returns the validated descriptor of `T`, building it on first use.
///
/// Invalid tables are not cached; every lookup reports the same schema error.
pub fn descriptor<T: NgsiMapped>() -> MappingResult<Arc<TypeDescriptor<T>>> {
    if let Some(descriptor) = lookup::<T>() {
        return Ok(descriptor);
    }

    let built = Arc::new(T::describe().build()?);
    debug!(
        type_name = built.type_name(),
        attributes = built.attributes().len(),
        "Registered mapping descriptor"
    );

    let mut cache = registry().write().unwrap_or_else(|poisoned| poisoned.into_inner());
    let entry = cache
        .entry(TypeId::of::<T>())
        .or_insert_with(|| built.clone() as ErasedDescriptor)
        .clone();
    drop(cache);

    Ok(entry.downcast::<TypeDescriptor<T>>().unwrap_or(built))
}
