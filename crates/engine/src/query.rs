//! Composable queries over a versioned table
//!
//! A `Query<T>` is a relation description, not a result: it names a
//! source projection (current rows, one history, rows as of an instant,
//! ...) and accumulates caller filters, ordering and pagination. Nothing
//! is read until a terminal method (`fetch`, `first`, `count`) runs.
//!
//! ## Evaluation order
//!
//! ```text
//! rows (scan, or chains of the restricted entity set)
//!   └─► source projection (latest-per-entity, as-of, ...)
//!         └─► default order: (entity_id, version) ascending
//!               └─► filters ─► order_by (stable) ─► offset ─► limit
//! ```
//!
//! An unrestricted query reads one storage snapshot, so it never observes
//! half of a concurrent commit. A query restricted with `entities` reads
//! each chain separately; every chain is still read whole.

use annal_core::{EntityId, Error, Result, RowStorage, Timestamp, VersionRow};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type Row<T> = Arc<VersionRow<T>>;
type Predicate<T> = Arc<dyn Fn(&VersionRow<T>) -> bool + Send + Sync>;
type Comparator<T> = Arc<dyn Fn(&VersionRow<T>, &VersionRow<T>) -> Ordering + Send + Sync>;

/// Which projection of the version relation a query starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Latest row per entity, tombstones removed
    Current,
    /// Latest row per entity, tombstones kept
    IncludeDeleted,
    /// Every row of one entity, ascending by version
    History(EntityId),
    /// Row with the highest version among `valid_from <= T`, per entity;
    /// tombstones kept
    AtTime(Timestamp),
    /// `AtTime` with tombstones removed
    ActiveAt(Timestamp),
    /// Every row of every entity
    AllVersions,
}

/// A lazily evaluated query
pub struct Query<T> {
    storage: Arc<dyn RowStorage<T>>,
    source: Source,
    entities: Option<FxHashSet<EntityId>>,
    filters: Vec<Predicate<T>>,
    order: Vec<Comparator<T>>,
    offset: usize,
    limit: Option<usize>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            source: self.source,
            entities: self.entities.clone(),
            filters: self.filters.clone(),
            order: self.order.clone(),
            offset: self.offset,
            limit: self.limit,
        }
    }
}

impl<T: Send + Sync + 'static> Query<T> {
    pub(crate) fn new(storage: Arc<dyn RowStorage<T>>, source: Source) -> Self {
        Self {
            storage,
            source,
            entities: None,
            filters: Vec::new(),
            order: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    /// The source projection
    pub fn source(&self) -> Source {
        self.source
    }

    /// Keep only rows matching `predicate`
    ///
    /// Filters run after the source projection: `current().filter(p)`
    /// keeps current rows matching `p`, it does not look for older versions
    /// that match.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&VersionRow<T>) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(predicate));
        self
    }

    /// Keep only rows whose payload matches `predicate`
    pub fn filter_fields<F>(self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter(move |row| predicate(row.fields()))
    }

    /// Restrict the query to a set of entities
    ///
    /// Only the chains of these entities are read, instead of the whole
    /// table. Calling it twice intersects the sets.
    pub fn entities<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = EntityId>,
    {
        let ids: FxHashSet<EntityId> = ids.into_iter().collect();
        self.entities = Some(match self.entities.take() {
            Some(existing) => existing.intersection(&ids).copied().collect(),
            None => ids,
        });
        self
    }

    /// Sort ascending by `key`
    ///
    /// Sorting is stable. Successive `order_by` calls add tie-breakers, so
    /// the first call is the primary key. Rows that tie on every key keep
    /// the default `(entity_id, version)` order.
    pub fn order_by<K, F>(mut self, key: F) -> Self
    where
        K: Ord,
        F: Fn(&VersionRow<T>) -> K + Send + Sync + 'static,
    {
        self.order
            .push(Arc::new(move |a: &VersionRow<T>, b: &VersionRow<T>| key(a).cmp(&key(b))));
        self
    }

    /// Sort descending by `key`
    pub fn order_by_desc<K, F>(mut self, key: F) -> Self
    where
        K: Ord,
        F: Fn(&VersionRow<T>) -> K + Send + Sync + 'static,
    {
        self.order
            .push(Arc::new(move |a: &VersionRow<T>, b: &VersionRow<T>| key(b).cmp(&key(a))));
        self
    }

    /// Skip the first `n` rows
    pub fn offset(mut self, n: usize) -> Self {
        self.offset = n;
        self
    }

    /// Return at most `n` rows
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Evaluate the query
    ///
    /// # Errors
    ///
    /// Propagates storage read errors.
    pub fn fetch(&self) -> Result<Vec<Row<T>>> {
        let mut rows = self.project(self.read_rows()?);
        rows.retain(|row| self.filters.iter().all(|f| f(&**row)));

        if !self.order.is_empty() {
            rows.sort_by(|a, b| {
                self.order
                    .iter()
                    .map(|cmp| cmp(&**a, &**b))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let rows = rows.into_iter().skip(self.offset);
        Ok(match self.limit {
            Some(n) => rows.take(n).collect(),
            None => rows.collect(),
        })
    }

    /// First row of the result, if any
    pub fn first(&self) -> Result<Option<Row<T>>> {
        Ok(self.clone().limit(1).fetch()?.into_iter().next())
    }

    /// Number of rows in the result
    pub fn count(&self) -> Result<usize> {
        Ok(self.fetch()?.len())
    }

    /// Payloads of the result rows
    pub fn fetch_fields(&self) -> Result<Vec<T>>
    where
        T: Clone,
    {
        Ok(self
            .fetch()?
            .into_iter()
            .map(|row| row.fields().clone())
            .collect())
    }

    fn read_rows(&self) -> Result<Vec<Row<T>>> {
        if let Source::History(id) = self.source {
            let mut chain = self.storage.chain(id)?;
            if let Some(ids) = &self.entities {
                chain.retain(|r| ids.contains(&r.entity_id()));
            }
            return Ok(chain);
        }

        match &self.entities {
            Some(ids) => {
                let mut rows = Vec::new();
                for id in ids {
                    rows.extend(self.storage.chain(*id)?);
                }
                Ok(rows)
            }
            None => self.storage.scan(),
        }
    }

    fn project(&self, rows: Vec<Row<T>>) -> Vec<Row<T>> {
        let mut out = match self.source {
            Source::History(_) => return rows,
            Source::AllVersions => rows,
            Source::Current => latest_per_entity(rows, |_| true)
                .into_iter()
                .filter(|r| !r.is_tombstone())
                .collect(),
            Source::IncludeDeleted => latest_per_entity(rows, |_| true),
            Source::AtTime(at) => latest_per_entity(rows, |r| r.valid_from() <= at),
            Source::ActiveAt(at) => latest_per_entity(rows, |r| r.valid_from() <= at)
                .into_iter()
                .filter(|r| !r.is_tombstone())
                .collect(),
        };
        out.sort_by(|a, b| {
            a.entity_id()
                .cmp(&b.entity_id())
                .then(a.version().cmp(&b.version()))
        });
        out
    }
}

/// Highest-version row per entity among rows accepted by `eligible`
///
/// Entities with no eligible row are absent from the output.
fn latest_per_entity<T, F>(rows: Vec<Row<T>>, eligible: F) -> Vec<Row<T>>
where
    F: Fn(&VersionRow<T>) -> bool,
{
    let mut latest: FxHashMap<EntityId, Row<T>> = FxHashMap::default();
    for row in rows.into_iter().filter(|r| eligible(&**r)) {
        match latest.get(&row.entity_id()) {
            Some(seen) if seen.version() >= row.version() => {}
            _ => {
                latest.insert(row.entity_id(), row);
            }
        }
    }
    latest.into_values().collect()
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("source", &self.source)
            .field("entities", &self.entities.as_ref().map(|s| s.len()))
            .field("filters", &self.filters.len())
            .field("order", &self.order.len())
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish()
    }
}

/// Outcome of a single-entity current lookup
///
/// Keeps "never existed" and "existed, now deleted" apart, which a
/// filtered `current()` query cannot.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// Latest row is active
    Found(Arc<VersionRow<T>>),
    /// Latest row is a tombstone
    Deleted(EntityId),
    /// No row exists for the entity
    NotFound(EntityId),
}

impl<T> Lookup<T> {
    /// Whether the entity is current
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Whether the entity's latest row is a tombstone
    pub fn is_deleted(&self) -> bool {
        matches!(self, Lookup::Deleted(_))
    }

    /// Whether the entity has no rows at all
    pub fn is_not_found(&self) -> bool {
        matches!(self, Lookup::NotFound(_))
    }

    /// The current row, if found
    pub fn found(self) -> Option<Arc<VersionRow<T>>> {
        match self {
            Lookup::Found(row) => Some(row),
            _ => None,
        }
    }

    /// Convert to a result, mapping the two misses to their errors
    ///
    /// # Errors
    ///
    /// `Error::Deleted` or `Error::NotFound`.
    pub fn into_result(self) -> Result<Arc<VersionRow<T>>> {
        match self {
            Lookup::Found(row) => Ok(row),
            Lookup::Deleted(entity_id) => Err(Error::Deleted { entity_id }),
            Lookup::NotFound(entity_id) => Err(Error::NotFound { entity_id }),
        }
    }
}
