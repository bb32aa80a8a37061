//! Typed value binding: projecting flat dotted keys onto structs and maps.
//!
//! A bound value is kept in sync with the store: every successful merge
//! applies its changed-key set to a shadow copy of the value, which is then
//! published atomically. Instead of runtime reflection, binding is driven by
//! a schema table: each bindable struct describes its fields once as a list
//! of [`FieldBinding`]s.
//!
//! # Examples
//!
//! ```rust
//! use conflux::bind::{Bind, FieldBinding, assign, bind_nested, nested_keys};
//!
//! #[derive(Clone, Default)]
//! struct ServerConfig {
//!     host: String,
//!     port: u16,
//! }
//!
//! impl Bind for ServerConfig {
//!     fn fields() -> Vec<FieldBinding<Self>> {
//!         vec![
//!             FieldBinding::scalar("host", |c: &mut Self, v| assign(&mut c.host, v)),
//!             FieldBinding::scalar("port", |c: &mut Self, v| assign(&mut c.port, v)),
//!         ]
//!     }
//! }
//!
//! #[derive(Clone, Default)]
//! struct AppConfig {
//!     server: ServerConfig,
//!     debug: bool,
//! }
//!
//! impl Bind for AppConfig {
//!     fn fields() -> Vec<FieldBinding<Self>> {
//!         vec![
//!             FieldBinding::nested(
//!                 "server",
//!                 |c: &mut Self, path, v| bind_nested(&mut c.server, path, v),
//!                 |prefix| nested_keys::<ServerConfig>(prefix),
//!             ),
//!             FieldBinding::scalar("debug", |c: &mut Self, v| assign(&mut c.debug, v)),
//!         ]
//!     }
//! }
//! ```

mod target;

pub(crate) use target::{BoundTarget, MapBinding, StructBinding};

use crate::value::{FromValue, Value};
use std::collections::HashMap;
use tracing::warn;

/// A value that can be bound to a store.
///
/// Implementations describe their fields once; the store builds the schema
/// table when the value is bound and reuses it on every merge.
pub trait Bind: Clone + Default + Send + Sync + Sized + 'static {
    /// The schema table: one entry per bindable field.
    fn fields() -> Vec<FieldBinding<Self>>;
}

/// Describes how one field of a bound struct maps onto configuration keys.
pub struct FieldBinding<T> {
    name: &'static str,
    kind: BindingKind<T>,
}

/// The shape of a bound field.
pub enum BindingKind<T> {
    /// A leaf scalar; the setter coerces the value into the field's type,
    /// returning `false` when the conversion is impossible.
    Scalar(fn(&mut T, Option<&Value>) -> bool),
    /// A nested struct; the setter projects the remaining path onto the
    /// field, and `keys` enumerates the field's leaf keys for strict
    /// binding.
    Nested {
        /// Projects the remaining path onto the nested struct.
        set: fn(&mut T, &str, Option<&Value>) -> bool,
        /// Enumerates the nested struct's leaf keys under a prefix.
        keys: fn(&str) -> Vec<String>,
    },
    /// A string-keyed map of structs; the entry named by the next path
    /// segment is looked up or created, then the rest of the path recurses
    /// into it.
    MapOfStruct(fn(&mut T, &str, &str, Option<&Value>) -> bool),
    /// A lazily-allocated boxed struct (`Option<Box<T>>` field).
    Boxed(fn(&mut T, &str, Option<&Value>) -> bool),
}

impl<T> FieldBinding<T> {
    /// A leaf scalar field.
    pub fn scalar(name: &'static str, set: fn(&mut T, Option<&Value>) -> bool) -> Self {
        Self {
            name,
            kind: BindingKind::Scalar(set),
        }
    }

    /// A nested struct field.
    pub fn nested(
        name: &'static str,
        set: fn(&mut T, &str, Option<&Value>) -> bool,
        keys: fn(&str) -> Vec<String>,
    ) -> Self {
        Self {
            name,
            kind: BindingKind::Nested { set, keys },
        }
    }

    /// A string-keyed map-of-struct field.
    pub fn map_of_struct(name: &'static str, set: fn(&mut T, &str, &str, Option<&Value>) -> bool) -> Self {
        Self {
            name,
            kind: BindingKind::MapOfStruct(set),
        }
    }

    /// A lazily-allocated boxed struct field.
    pub fn boxed(name: &'static str, set: fn(&mut T, &str, Option<&Value>) -> bool) -> Self {
        Self {
            name,
            kind: BindingKind::Boxed(set),
        }
    }

    /// The field's key name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Projects one dotted key onto a target using its schema table.
///
/// Returns `true` when some field matched the key. A scalar whose value
/// cannot be coerced still counts as matched: the failure is logged and
/// only that field is skipped.
pub fn bind_key<T: Bind>(target: &mut T, key: &str, value: Option<&Value>) -> bool {
    apply_key(&T::fields(), target, key, value)
}

pub(crate) fn apply_key<T>(
    schema: &[FieldBinding<T>],
    target: &mut T,
    key: &str,
    value: Option<&Value>,
) -> bool {
    let mut matched = false;
    for field in schema {
        // Exact match: tag name or case-insensitive field name.
        if field.name.eq_ignore_ascii_case(key) {
            if let BindingKind::Scalar(set) = &field.kind {
                if !set(target, value) {
                    warn!(key, field = field.name, "cannot coerce config value for bound field");
                }
                matched = true;
            }
            continue;
        }

        // Prefix match: descend with the remaining path.
        let Some(rest) = split_prefix(key, field.name) else {
            continue;
        };
        match &field.kind {
            BindingKind::Scalar(_) => {}
            BindingKind::Nested { set, .. } => {
                if set(target, rest, value) {
                    matched = true;
                }
            }
            BindingKind::Boxed(set) => {
                if set(target, rest, value) {
                    matched = true;
                }
            }
            BindingKind::MapOfStruct(set) => {
                if let Some((entry, remainder)) = rest.split_once('.') {
                    if set(target, entry, remainder, value) {
                        matched = true;
                    }
                }
            }
        }
    }
    matched
}

fn split_prefix<'a>(key: &'a str, name: &str) -> Option<&'a str> {
    let prefix = key.get(..name.len())?;
    if !prefix.eq_ignore_ascii_case(name) || key.as_bytes().get(name.len()) != Some(&b'.') {
        return None;
    }
    let rest = key.get(name.len() + 1..)?;
    if rest.is_empty() { None } else { Some(rest) }
}

/// Assigns a coerced value to a scalar field slot.
///
/// `None` (a removed key) resets the slot to its zero value. Returns
/// `false` when the value cannot be coerced to the slot's type.
pub fn assign<F: FromValue + Default>(slot: &mut F, value: Option<&Value>) -> bool {
    match value {
        None => {
            *slot = F::default();
            true
        }
        Some(v) => match F::from_value(v) {
            Some(converted) => {
                *slot = converted;
                true
            }
            None => false,
        },
    }
}

/// Projects the remaining path onto a nested struct field.
pub fn bind_nested<U: Bind>(child: &mut U, path: &str, value: Option<&Value>) -> bool {
    bind_key(child, path, value)
}

/// Projects the remaining path onto a lazily-allocated boxed struct field.
///
/// The box is allocated on first matching key; an existing value is cloned
/// before mutation.
pub fn bind_boxed<U: Bind>(slot: &mut Option<Box<U>>, path: &str, value: Option<&Value>) -> bool {
    let mut current = slot.as_deref().cloned().unwrap_or_default();
    if bind_key(&mut current, path, value) {
        *slot = Some(Box::new(current));
        true
    } else {
        false
    }
}

/// Projects the remaining path onto one entry of a map-of-struct field.
///
/// The entry is looked up (or created from its zero value) by name and
/// fully copied before mutation, so readers of a previously published
/// bound value are never mutated in place.
pub fn bind_map_entry<U: Bind>(
    map: &mut HashMap<String, U>,
    entry: &str,
    path: &str,
    value: Option<&Value>,
) -> bool {
    let mut current = map.get(entry).cloned().unwrap_or_default();
    if bind_key(&mut current, path, value) {
        map.insert(entry.to_string(), current);
        true
    } else {
        false
    }
}

/// Enumerates the leaf keys of a bindable type under a prefix.
///
/// Used by strict struct binding: every scalar, map and boxed field
/// contributes one key; nested structs recurse.
pub fn nested_keys<T: Bind>(prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    for field in T::fields() {
        let qualified = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{prefix}.{}", field.name)
        };
        match field.kind {
            BindingKind::Nested { keys: child_keys, .. } => keys.extend(child_keys(&qualified)),
            _ => keys.push(qualified),
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Server {
        host: String,
        port: u16,
        timeout: Duration,
    }

    impl Bind for Server {
        fn fields() -> Vec<FieldBinding<Self>> {
            vec![
                FieldBinding::scalar("host", |c: &mut Self, v| assign(&mut c.host, v)),
                FieldBinding::scalar("port", |c: &mut Self, v| assign(&mut c.port, v)),
                FieldBinding::scalar("timeout", |c: &mut Self, v| assign(&mut c.timeout, v)),
            ]
        }
    }

    #[derive(Clone, Default, Debug, PartialEq)]
    struct App {
        server: Server,
        backends: HashMap<String, Server>,
        fallback: Option<Box<Server>>,
        debug: bool,
    }

    impl Bind for App {
        fn fields() -> Vec<FieldBinding<Self>> {
            vec![
                FieldBinding::nested(
                    "server",
                    |c: &mut Self, path, v| bind_nested(&mut c.server, path, v),
                    |prefix| nested_keys::<Server>(prefix),
                ),
                FieldBinding::map_of_struct("backends", |c: &mut Self, entry, path, v| {
                    bind_map_entry(&mut c.backends, entry, path, v)
                }),
                FieldBinding::boxed("fallback", |c: &mut Self, path, v| {
                    bind_boxed(&mut c.fallback, path, v)
                }),
                FieldBinding::scalar("debug", |c: &mut Self, v| assign(&mut c.debug, v)),
            ]
        }
    }

    #[test]
    fn test_scalar_assignment() {
        let mut app = App::default();
        assert!(bind_key(&mut app, "debug", Some(&Value::Bool(true))));
        assert!(app.debug);
    }

    #[test]
    fn test_nested_assignment() {
        let mut app = App::default();
        assert!(bind_key(
            &mut app,
            "server.host",
            Some(&Value::String("localhost".to_string()))
        ));
        assert!(bind_key(&mut app, "server.port", Some(&Value::Int(8080))));
        assert_eq!(app.server.host, "localhost");
        assert_eq!(app.server.port, 8080);
    }

    #[test]
    fn test_case_insensitive_match() {
        let mut app = App::default();
        assert!(bind_key(&mut app, "Server.Host", Some(&Value::from("x"))));
        assert_eq!(app.server.host, "x");
    }

    #[test]
    fn test_map_of_struct_creates_entry() {
        let mut app = App::default();
        assert!(bind_key(
            &mut app,
            "backends.primary.host",
            Some(&Value::from("db1"))
        ));
        assert!(bind_key(
            &mut app,
            "backends.primary.port",
            Some(&Value::Int(5432))
        ));
        let primary = app.backends.get("primary").unwrap();
        assert_eq!(primary.host, "db1");
        assert_eq!(primary.port, 5432);
    }

    #[test]
    fn test_boxed_lazily_allocated() {
        let mut app = App::default();
        assert!(app.fallback.is_none());
        assert!(bind_key(&mut app, "fallback.port", Some(&Value::Int(9000))));
        assert_eq!(app.fallback.as_ref().unwrap().port, 9000);
    }

    #[test]
    fn test_removed_key_resets_field() {
        let mut app = App::default();
        bind_key(&mut app, "server.port", Some(&Value::Int(8080)));
        assert!(bind_key(&mut app, "server.port", None));
        assert_eq!(app.server.port, 0);
    }

    #[test]
    fn test_unmatched_key() {
        let mut app = App::default();
        assert!(!bind_key(&mut app, "extra", Some(&Value::Int(1))));
        assert!(!bind_key(&mut app, "server.missing", Some(&Value::Int(1))));
        assert_eq!(app, App::default());
    }

    #[test]
    fn test_impossible_coercion_counts_as_matched() {
        let mut app = App::default();
        // An array cannot coerce to u16; the field keeps its value but the
        // key still counts as matched.
        bind_key(&mut app, "server.port", Some(&Value::Int(8080)));
        assert!(bind_key(
            &mut app,
            "server.port",
            Some(&Value::Array(vec![]))
        ));
        assert_eq!(app.server.port, 8080);
    }

    #[test]
    fn test_duration_coercion() {
        let mut app = App::default();
        bind_key(
            &mut app,
            "server.timeout",
            Some(&Value::String("2s".to_string())),
        );
        assert_eq!(app.server.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_nested_keys_enumeration() {
        let keys = nested_keys::<App>("");
        assert_eq!(
            keys,
            vec![
                "server.host",
                "server.port",
                "server.timeout",
                "backends",
                "fallback",
                "debug",
            ]
        );
    }
}
