//! Shared identifiers, async aliases and generation settings for the trellis crates.
//!
//! ```rust
//! use tcommon::{GenerationOptions, MessageId, ThreadId};
//!
//! let thread = ThreadId::from("thread-1");
//! let message = MessageId::generate();
//! let options = GenerationOptions::default().with_max_tokens(512).enable_streaming();
//!
//! assert_eq!(thread.as_str(), "thread-1");
//! assert!(!message.as_str().is_empty());
//! assert!(options.stream);
//! ```

pub mod future {
    //! Boxed future alias used by object-safe async traits.
    //!
    //! ```rust
    //! use tcommon::BoxFuture;
    //!
    //! fn doubled<'a>(value: &'a u32) -> BoxFuture<'a, u32> {
    //!     Box::pin(async move { value * 2 })
    //! }
    //!
    //! let _future = doubled(&21);
    //! ```

    use std::future::Future;
    use std::pin::Pin;

    pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
}

pub mod ids {
    //! String newtypes for thread and message identity.
    //!
    //! Ids are opaque. Freshly generated ids are random v4 uuids, but any string loaded
    //! from storage or supplied by a caller is accepted as-is.

    use std::fmt::{Display, Formatter};

    use serde::{Deserialize, Serialize};

    macro_rules! string_id {
        ($(#[$meta:meta])* $name:ident) => {
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(String);

            impl $name {
                pub fn new(value: impl Into<String>) -> Self {
                    Self(value.into())
                }

                pub fn generate() -> Self {
                    Self(uuid::Uuid::new_v4().to_string())
                }

                pub fn as_str(&self) -> &str {
                    self.0.as_str()
                }

                pub fn into_inner(self) -> String {
                    self.0
                }
            }

            impl Display for $name {
                fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<String> for $name {
                fn from(value: String) -> Self {
                    Self(value)
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }

            impl AsRef<str> for $name {
                fn as_ref(&self) -> &str {
                    &self.0
                }
            }
        };
    }

    string_id!(
        /// Identity of a conversation thread.
        ThreadId
    );
    string_id!(
        /// Identity of a single node in a thread's message tree.
        MessageId
    );
}

pub mod model {
    //! Sampling settings shared by provider requests.
    //!
    //! ```rust
    //! use tcommon::GenerationOptions;
    //!
    //! let options = GenerationOptions::default()
    //!     .with_temperature(0.7)
    //!     .with_max_tokens(2048);
    //!
    //! assert_eq!(options.temperature, Some(0.7));
    //! assert!(!options.stream);
    //! ```

    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct GenerationOptions {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub temperature: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub max_tokens: Option<u32>,
        #[serde(default)]
        pub stream: bool,
    }

    impl GenerationOptions {
        pub fn with_temperature(mut self, temperature: f32) -> Self {
            self.temperature = Some(temperature);
            self
        }

        pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
            self.max_tokens = Some(max_tokens);
            self
        }

        pub fn with_streaming(mut self, stream: bool) -> Self {
            self.stream = stream;
            self
        }

        pub fn enable_streaming(self) -> Self {
            self.with_streaming(true)
        }
    }
}

pub mod registry {
    //! Keyed registry used for providers and remote tool servers.

    use std::borrow::Borrow;
    use std::collections::HashMap;
    use std::hash::Hash;

    #[derive(Debug, Clone)]
    pub struct Registry<K, V> {
        items: HashMap<K, V>,
    }

    impl<K, V> Default for Registry<K, V>
    where
        K: Eq + Hash,
    {
        fn default() -> Self {
            Self {
                items: HashMap::new(),
            }
        }
    }

    impl<K, V> Registry<K, V>
    where
        K: Eq + Hash,
    {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&mut self, key: K, value: V) -> Option<V> {
            self.items.insert(key, value)
        }

        pub fn get<Q>(&self, key: &Q) -> Option<&V>
        where
            K: Borrow<Q>,
            Q: Eq + Hash + ?Sized,
        {
            self.items.get(key)
        }

        pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
        where
            K: Borrow<Q>,
            Q: Eq + Hash + ?Sized,
        {
            self.items.remove(key)
        }

        pub fn contains_key<Q>(&self, key: &Q) -> bool
        where
            K: Borrow<Q>,
            Q: Eq + Hash + ?Sized,
        {
            self.items.contains_key(key)
        }

        pub fn keys(&self) -> impl Iterator<Item = &K> {
            self.items.keys()
        }

        pub fn values(&self) -> impl Iterator<Item = &V> {
            self.items.values()
        }

        pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
            self.items.iter()
        }

        pub fn len(&self) -> usize {
            self.items.len()
        }

        pub fn is_empty(&self) -> bool {
            self.items.is_empty()
        }
    }
}

pub use future::BoxFuture;
pub use ids::{MessageId, ThreadId};
pub use model::GenerationOptions;
pub use registry::Registry;

/// Free-form string metadata attached to requests and tool contexts.
pub type MetadataMap = std::collections::HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::{GenerationOptions, MessageId, Registry, ThreadId};

    #[test]
    fn generated_ids_are_unique() {
        let first = MessageId::generate();
        let second = MessageId::generate();

        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 36);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let thread = ThreadId::new("t-1");
        let json = serde_json::to_string(&thread).expect("id should serialize");
        assert_eq!(json, "\"t-1\"");

        let parsed: ThreadId = serde_json::from_str(&json).expect("id should deserialize");
        assert_eq!(parsed, thread);
    }

    #[test]
    fn generation_options_builders_compose() {
        let options = GenerationOptions::default()
            .with_temperature(0.1)
            .with_max_tokens(64)
            .enable_streaming();

        assert_eq!(options.temperature, Some(0.1));
        assert_eq!(options.max_tokens, Some(64));
        assert!(options.stream);
    }

    #[test]
    fn registry_tracks_insert_and_remove() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());

        registry.insert("openai".to_string(), 1_u8);
        registry.insert("ollama".to_string(), 2_u8);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("ollama"), Some(&2));

        assert_eq!(registry.remove("openai"), Some(1));
        assert!(!registry.contains_key("openai"));
        assert_eq!(registry.keys().count(), 1);
    }
}
