//! Bound-value targets: copy-on-write shadow copies published atomically.

use super::{Bind, FieldBinding, apply_key};
use crate::store::KeyChange;
use crate::value::Value;
use arc_swap::ArcSwap;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A bound value kept in sync with the store.
///
/// `apply` receives the changed-key set of one merge, mutates a full
/// shallow copy of the previous value and publishes it atomically: readers
/// of the bound value never see partial updates.
pub(crate) trait BoundTarget: Send + Sync {
    fn apply(&self, changes: &[KeyChange]);
    fn current(&self) -> Arc<dyn Any + Send + Sync>;
}

/// Struct-shaped bound value with a schema table built once at bind time.
pub(crate) struct StructBinding<T: Bind> {
    current: ArcSwap<T>,
    schema: Vec<FieldBinding<T>>,
}

impl<T: Bind> StructBinding<T> {
    pub(crate) fn new() -> Self {
        Self {
            current: ArcSwap::new(Arc::new(T::default())),
            schema: T::fields(),
        }
    }
}

impl<T: Bind> BoundTarget for StructBinding<T> {
    fn apply(&self, changes: &[KeyChange]) {
        let mut next = self.current.load().as_ref().clone();
        for change in changes {
            if !apply_key(&self.schema, &mut next, &change.key, change.value.as_ref()) {
                debug!(key = %change.key, "config key not found in bound value");
            }
        }
        self.current.store(Arc::new(next));
    }

    fn current(&self) -> Arc<dyn Any + Send + Sync> {
        self.current.load_full()
    }
}

/// Map-shaped bound value: flattened dotted keys are set verbatim.
pub(crate) struct MapBinding {
    current: ArcSwap<HashMap<String, Value>>,
}

impl MapBinding {
    pub(crate) fn new() -> Self {
        Self {
            current: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }
}

impl BoundTarget for MapBinding {
    fn apply(&self, changes: &[KeyChange]) {
        let mut next = self.current.load().as_ref().clone();
        for change in changes {
            match &change.value {
                Some(value) => {
                    next.insert(change.key.clone(), value.clone());
                }
                None => {
                    next.remove(&change.key);
                }
            }
        }
        self.current.store(Arc::new(next));
    }

    fn current(&self) -> Arc<dyn Any + Send + Sync> {
        self.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::assign;
    use crate::store::ChangeKind;

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Flags {
        verbose: bool,
        level: i64,
    }

    impl Bind for Flags {
        fn fields() -> Vec<FieldBinding<Self>> {
            vec![
                FieldBinding::scalar("verbose", |c: &mut Self, v| assign(&mut c.verbose, v)),
                FieldBinding::scalar("level", |c: &mut Self, v| assign(&mut c.level, v)),
            ]
        }
    }

    fn change(key: &str, value: Option<Value>) -> KeyChange {
        KeyChange {
            key: key.to_string(),
            kind: match value {
                Some(_) => ChangeKind::Updated,
                None => ChangeKind::Removed,
            },
            value,
        }
    }

    #[test]
    fn test_struct_binding_applies_batch() {
        let binding = StructBinding::<Flags>::new();
        binding.apply(&[
            change("verbose", Some(Value::Bool(true))),
            change("level", Some(Value::Int(3))),
        ]);

        let current = binding.current().downcast::<Flags>().unwrap();
        assert_eq!(
            *current,
            Flags {
                verbose: true,
                level: 3
            }
        );
    }

    #[test]
    fn test_struct_binding_publishes_new_copy() {
        let binding = StructBinding::<Flags>::new();
        let before = binding.current();
        binding.apply(&[change("level", Some(Value::Int(1)))]);
        let after = binding.current();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_map_binding_set_and_remove() {
        let binding = MapBinding::new();
        binding.apply(&[change("db.host", Some(Value::from("x")))]);
        binding.apply(&[change("db.host", None)]);

        let current = binding
            .current()
            .downcast::<HashMap<String, Value>>()
            .unwrap();
        assert!(current.is_empty());
    }
}
