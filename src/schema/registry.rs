use std::sync::{Arc, RwLock};

use super::SchemaRepository;

struct Published {
    version: u64,
    repo: Arc<SchemaRepository>,
}

/// Holds the current schema snapshot shared by decoders.
///
/// Decoders take a [`snapshot`](Self::snapshot) at the start of a decode and
/// use it until they finish. Reloading the schema publishes a whole new
/// repository, so in-flight decodes never see a partially updated schema.
///
/// ```
/// use pbinspect::schema::{SchemaBuilder, SchemaRegistry};
///
/// let registry = SchemaRegistry::new(SchemaBuilder::new().build());
/// let before = registry.snapshot();
///
/// let version = registry.publish(SchemaBuilder::new().with_timestamp().build());
/// assert_eq!(version, 1);
/// assert_eq!(before.message_count(), 0);
/// assert_eq!(registry.snapshot().message_count(), 1);
/// ```
pub struct SchemaRegistry {
    current: RwLock<Published>,
}

impl SchemaRegistry {
    pub fn new(repo: SchemaRepository) -> Self {
        Self {
            current: RwLock::new(Published {
                version: 0,
                repo: Arc::new(repo),
            }),
        }
    }

    /// Return the current schema.
    pub fn snapshot(&self) -> Arc<SchemaRepository> {
        // The lock only guards a pointer swap, so a poisoned lock still holds
        // a complete snapshot.
        let current = self.current.read().unwrap_or_else(|err| err.into_inner());
        current.repo.clone()
    }

    /// Return the version of the current schema. This starts at zero and is
    /// incremented by each call to [`publish`](Self::publish).
    pub fn version(&self) -> u64 {
        let current = self.current.read().unwrap_or_else(|err| err.into_inner());
        current.version
    }

    /// Replace the current schema and return the new version number.
    pub fn publish(&self, repo: SchemaRepository) -> u64 {
        let repo = Arc::new(repo);
        let mut current = self.current.write().unwrap_or_else(|err| err.into_inner());
        current.version += 1;
        current.repo = repo;
        tracing::debug!(version = current.version, "published schema");
        current.version
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(SchemaRepository::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::SchemaRegistry;
    use crate::schema::{MessageDescriptor, SchemaBuilder};

    #[test]
    fn test_publish_does_not_affect_snapshots() {
        let registry = SchemaRegistry::default();
        assert_eq!(registry.version(), 0);

        let old = registry.snapshot();
        registry.publish(
            SchemaBuilder::new()
                .message(MessageDescriptor::new("test.A"))
                .build(),
        );

        assert_eq!(registry.version(), 1);
        assert!(old.find_message_type("test.A").is_none());

        let new = registry.snapshot();
        assert!(new.find_message_type("test.A").is_some());
        assert!(Arc::ptr_eq(&new, &registry.snapshot()));
    }

    #[test]
    fn test_concurrent_publish() {
        let registry = SchemaRegistry::default();
        std::thread::scope(|s| {
            for i in 0..4 {
                let registry = &registry;
                s.spawn(move || {
                    let name = format!("test.M{}", i);
                    registry.publish(
                        SchemaBuilder::new()
                            .message(MessageDescriptor::new(&name))
                            .build(),
                    );
                    assert_eq!(registry.snapshot().message_count(), 1);
                });
            }
        });
        assert_eq!(registry.version(), 4);
    }
}
