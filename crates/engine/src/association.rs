//! Associations between versioned tables
//!
//! Rows refer to other entities by storing their `entity_id` in a payload
//! field. An `AssociationDescriptor` names such a reference once:
//!
//! ```text
//! "owner": posts.owner_id ──► accounts (current row)
//! ```
//!
//! Descriptors live in an explicit `AssociationRegistry` built at startup.
//! `preload` resolves one association for many source rows with a single
//! batched current-row query on the target table.

use crate::resolver::QueryResolver;
use annal_core::changes::to_object;
use annal_core::{Entity, EntityId, Error, Result, ValidationErrors, VersionRow};
use once_cell::sync::OnceCell;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

static GLOBAL: OnceCell<AssociationRegistry> = OnceCell::new();

/// One named foreign reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDescriptor {
    /// Association name, unique within a registry
    pub name: String,
    /// Table holding the foreign key
    pub source_table: String,
    /// Table the key points into
    pub target_table: String,
    /// Payload field of the source holding the target's `entity_id`
    pub foreign_key: String,
}

impl AssociationDescriptor {
    /// Describe a reference from `S` rows to `T` rows through `foreign_key`
    pub fn belongs_to<S: Entity, T: Entity>(
        name: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_table: S::TABLE.to_string(),
            target_table: T::TABLE.to_string(),
            foreign_key: foreign_key.into(),
        }
    }
}

/// Name-to-descriptor table
#[derive(Debug, Clone, Default)]
pub struct AssociationRegistry {
    by_name: FxHashMap<String, AssociationDescriptor>,
}

impl AssociationRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor
    ///
    /// # Errors
    ///
    /// `Error::Config` if the name is already registered.
    pub fn register(&mut self, descriptor: AssociationDescriptor) -> Result<()> {
        if self.by_name.contains_key(&descriptor.name) {
            return Err(Error::Config(format!(
                "association '{}' is already registered",
                descriptor.name
            )));
        }
        self.by_name.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Builder-style `register`
    pub fn with(mut self, descriptor: AssociationDescriptor) -> Result<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Descriptor by name
    pub fn get(&self, name: &str) -> Option<&AssociationDescriptor> {
        self.by_name.get(name)
    }

    /// Descriptors whose source is `table`
    pub fn for_source<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = &'a AssociationDescriptor> + 'a {
        self.by_name.values().filter(move |d| d.source_table == table)
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Install this registry as the process-wide one
    ///
    /// # Errors
    ///
    /// `Error::Config` if a global registry was already installed.
    pub fn install_global(self) -> Result<&'static AssociationRegistry> {
        GLOBAL
            .set(self)
            .map_err(|_| Error::Config("association registry already installed".into()))?;
        GLOBAL
            .get()
            .ok_or_else(|| Error::Config("association registry not installed".into()))
    }

    /// The process-wide registry, if installed
    pub fn global() -> Option<&'static AssociationRegistry> {
        GLOBAL.get()
    }

    /// Resolve association `name` for every row in `sources`
    ///
    /// Collects the foreign keys, runs one current-row query on the target
    /// table for that id set, and pairs each source with its target. A
    /// null or absent key, or a target that is missing or deleted, yields
    /// `target: None`. Output order follows `sources`.
    ///
    /// # Errors
    ///
    /// - `Error::Config` for an unknown name or mismatched table types
    /// - `Error::Validation` if a foreign key is not an entity id
    pub fn preload<S: Entity, T: Entity>(
        &self,
        name: &str,
        sources: &[Arc<VersionRow<S>>],
        targets: &QueryResolver<T>,
    ) -> Result<Vec<Preloaded<S, T>>> {
        let descriptor = self
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown association '{}'", name)))?;
        if descriptor.source_table != S::TABLE || descriptor.target_table != T::TABLE {
            return Err(Error::Config(format!(
                "association '{}' links {} -> {}, not {} -> {}",
                name,
                descriptor.source_table,
                descriptor.target_table,
                S::TABLE,
                T::TABLE
            )));
        }

        let mut keys = Vec::with_capacity(sources.len());
        for source in sources {
            keys.push(foreign_key(source.fields(), &descriptor.foreign_key)?);
        }

        let wanted: FxHashSet<EntityId> = keys.iter().flatten().copied().collect();
        let found: FxHashMap<EntityId, Arc<VersionRow<T>>> = if wanted.is_empty() {
            FxHashMap::default()
        } else {
            targets
                .current()
                .entities(wanted.iter().copied())
                .fetch()?
                .into_iter()
                .map(|row| (row.entity_id(), row))
                .collect()
        };

        debug!(
            target: "annal::store",
            association = name,
            sources = sources.len(),
            keys = wanted.len(),
            resolved = found.len(),
            "Preloaded association"
        );

        Ok(sources
            .iter()
            .zip(keys)
            .map(|(source, key)| Preloaded {
                source: Arc::clone(source),
                target: key.and_then(|id| found.get(&id).cloned()),
            })
            .collect())
    }
}

/// A source row paired with its resolved target
#[derive(Debug, Clone)]
pub struct Preloaded<S, T> {
    /// The row holding the foreign key
    pub source: Arc<VersionRow<S>>,
    /// Current target row, if the key is set and the target is live
    pub target: Option<Arc<VersionRow<T>>>,
}

fn foreign_key<S: Entity>(fields: &S, field: &str) -> Result<Option<EntityId>> {
    let object = to_object(fields)?;
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => EntityId::from_string(s).map(Some).ok_or_else(|| {
            Error::Validation(ValidationErrors::single(field, "is not an entity id"))
        }),
        Some(_) => Err(Error::Validation(ValidationErrors::single(
            field,
            "is not an entity id",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annal_core::{RowStorage, Timestamp};
    use annal_storage::VersionTable;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        name: String,
    }

    impl Entity for Account {
        const TABLE: &'static str = "accounts";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Post {
        title: String,
        owner_id: Option<EntityId>,
    }

    impl Entity for Post {
        const TABLE: &'static str = "posts";
    }

    fn registry() -> AssociationRegistry {
        AssociationRegistry::new()
            .with(AssociationDescriptor::belongs_to::<Post, Account>("owner", "owner_id"))
            .unwrap()
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut reg = registry();
        let err = reg
            .register(AssociationDescriptor::belongs_to::<Post, Account>("owner", "x"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_for_source_lists_descriptors() {
        let reg = registry();
        assert_eq!(reg.for_source("posts").count(), 1);
        assert_eq!(reg.for_source("accounts").count(), 0);
    }

    #[test]
    fn test_preload_resolves_current_targets() {
        let accounts = Arc::new(VersionTable::<Account>::new("accounts"));
        let live = VersionRow::first(Account { name: "ann".into() }, Timestamp::from_micros(1));
        let gone = VersionRow::first(Account { name: "bob".into() }, Timestamp::from_micros(1));
        let gone_tomb = gone.successor(gone.fields().clone(), Timestamp::from_micros(2), true);
        let (live_id, gone_id) = (live.entity_id(), gone.entity_id());
        accounts.append(vec![live, gone, gone_tomb]).unwrap();
        let resolver = QueryResolver::new(accounts as Arc<dyn RowStorage<Account>>);

        let post = |owner: Option<EntityId>| {
            Arc::new(VersionRow::first(
                Post {
                    title: "t".into(),
                    owner_id: owner,
                },
                Timestamp::from_micros(3),
            ))
        };
        let sources = vec![
            post(Some(live_id)),
            post(Some(gone_id)),
            post(None),
            post(Some(EntityId::new())),
            post(Some(live_id)),
        ];

        let loaded = registry().preload("owner", &sources, &resolver).unwrap();
        let names: Vec<Option<String>> = loaded
            .iter()
            .map(|p| p.target.as_ref().map(|t| t.fields().name.clone()))
            .collect();
        assert_eq!(
            names,
            vec![Some("ann".to_string()), None, None, None, Some("ann".to_string())]
        );
        assert_eq!(loaded[1].source.row_id(), sources[1].row_id());
    }

    #[test]
    fn test_preload_unknown_or_mismatched() {
        let resolver: QueryResolver<Account> =
            QueryResolver::new(Arc::new(VersionTable::<Account>::new("accounts")));
        let reg = registry();

        assert!(reg.preload::<Post, Account>("nope", &[], &resolver).is_err());

        let wrong: QueryResolver<Post> =
            QueryResolver::new(Arc::new(VersionTable::<Post>::new("posts")));
        let err = reg.preload::<Post, Post>("owner", &[], &wrong).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_key_is_validation_error() {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        struct Loose {
            owner_id: String,
        }
        impl Entity for Loose {
            const TABLE: &'static str = "loose";
        }

        let reg = AssociationRegistry::new()
            .with(AssociationDescriptor::belongs_to::<Loose, Account>("owner", "owner_id"))
            .unwrap();
        let resolver: QueryResolver<Account> =
            QueryResolver::new(Arc::new(VersionTable::<Account>::new("accounts")));
        let row = Arc::new(VersionRow::first(
            Loose {
                owner_id: "not-a-uuid".into(),
            },
            Timestamp::from_micros(1),
        ));

        let err = reg.preload("owner", &[row], &resolver).unwrap_err();
        assert!(err.validation_errors().unwrap().has_field("owner_id"));
    }
}
