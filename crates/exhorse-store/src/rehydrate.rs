//! The rehydration engine.
//!
//! A read is served by loading the latest snapshot, fetching only the events
//! past its watermark, and folding them in. Read models with dependencies
//! rehydrate those first, then interleave the new foreign events with the
//! local ones in log order. The result is persisted as the next snapshot when
//! the [`SnapshotPolicy`] says so.
//!
//! Nothing here holds state between calls, so the engine is shared freely
//! across tasks. Dropping a rehydration future before it resolves leaves the
//! stored snapshot untouched: the write happens only after every fetch and
//! fold succeeded.

use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use exhorse_core::clock::Clock;
use exhorse_core::entity::ProjectionState;
use exhorse_core::error::DomainError;
use exhorse_core::event::{StoredEvent, Watermark};
use exhorse_core::repository::{EventFilter, EventLog, SaveOutcome, Snapshot, SnapshotStore};
use tracing::{debug, info, warn};

use crate::config::SnapshotPolicy;
use crate::registry::{ProjectionDefinition, ProjectionRegistry, projection_key};

type BoxedRehydration<'a> = Pin<Box<dyn Future<Output = Result<Rehydrated, DomainError>> + Send + 'a>>;

/// The outcome of one rehydration.
#[derive(Debug, Clone, PartialEq)]
pub struct Rehydrated {
    /// Entities as of `watermark`.
    pub state: ProjectionState,
    /// Last local event folded, `None` if the stream is empty.
    pub watermark: Option<Watermark>,
    /// Local plus foreign events folded in this pass.
    pub folded: usize,
    /// Whether this pass wrote a new snapshot.
    pub persisted: bool,
}

/// Rebuilds projections from the event log and snapshot cache.
pub struct Rehydrator {
    events: Arc<dyn EventLog>,
    snapshots: Arc<dyn SnapshotStore>,
    registry: Arc<ProjectionRegistry>,
    clock: Arc<dyn Clock>,
    policy: SnapshotPolicy,
}

impl std::fmt::Debug for Rehydrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rehydrator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Rehydrator {
    /// Creates a rehydration engine over the given backends.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventLog>,
        snapshots: Arc<dyn SnapshotStore>,
        registry: Arc<ProjectionRegistry>,
        clock: Arc<dyn Clock>,
        policy: SnapshotPolicy,
    ) -> Self {
        Self {
            events,
            snapshots,
            registry,
            clock,
            policy,
        }
    }

    /// The event log this engine reads.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventLog> {
        &self.events
    }

    /// The projections this engine knows.
    #[must_use]
    pub fn registry(&self) -> &ProjectionRegistry {
        &self.registry
    }

    /// The clock used for snapshot timestamps.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Produces the current state of a read model.
    ///
    /// # Errors
    ///
    /// - `DomainError::UnknownProjection` if the read model or one of its
    ///   dependencies was never registered.
    /// - `DomainError::DependencyCycle` if dependencies loop back.
    /// - `DomainError::Storage` if the log or snapshot store cannot be read.
    ///   A failed snapshot write is logged and does not fail the read.
    pub async fn rehydrate(
        &self,
        aggregate_name: &str,
        read_model: &str,
    ) -> Result<Rehydrated, DomainError> {
        let mut in_progress = Vec::new();
        self.rehydrate_guarded(aggregate_name, read_model, &mut in_progress, false)
            .await
    }

    /// Discards the snapshot, replays the whole log and persists the result
    /// regardless of policy. Dependencies are brought current the usual way.
    ///
    /// # Errors
    ///
    /// Same as [`Rehydrator::rehydrate`], plus `DomainError::Storage` if the
    /// old snapshot cannot be deleted.
    pub async fn rebuild(
        &self,
        aggregate_name: &str,
        read_model: &str,
    ) -> Result<Rehydrated, DomainError> {
        self.registry.get(aggregate_name, read_model)?;
        self.snapshots.delete(aggregate_name, read_model).await?;
        info!(
            projection = %projection_key(aggregate_name, read_model),
            "rebuilding projection from the beginning"
        );
        let mut in_progress = Vec::new();
        self.rehydrate_guarded(aggregate_name, read_model, &mut in_progress, true)
            .await
    }

    /// Returns the last persisted state without consulting the event log.
    /// The result may trail the log.
    ///
    /// # Errors
    ///
    /// - `DomainError::UnknownProjection` if the read model was never registered.
    /// - `DomainError::CorruptSnapshot` or `DomainError::Storage` if the
    ///   snapshot cannot be read.
    pub async fn load_cached(
        &self,
        aggregate_name: &str,
        read_model: &str,
    ) -> Result<Rehydrated, DomainError> {
        self.registry.get(aggregate_name, read_model)?;
        let snapshot = self.snapshots.load(aggregate_name, read_model).await?;
        Ok(match snapshot {
            Some(snapshot) => Rehydrated {
                state: snapshot.state,
                watermark: snapshot.watermark,
                folded: 0,
                persisted: false,
            },
            None => Rehydrated {
                state: ProjectionState::new(),
                watermark: None,
                folded: 0,
                persisted: false,
            },
        })
    }

    fn rehydrate_guarded<'a>(
        &'a self,
        aggregate_name: &'a str,
        read_model: &'a str,
        in_progress: &'a mut Vec<String>,
        force_persist: bool,
    ) -> BoxedRehydration<'a> {
        Box::pin(async move {
            let key = projection_key(aggregate_name, read_model);
            if in_progress.contains(&key) {
                let mut path = in_progress.clone();
                path.push(key);
                return Err(DomainError::DependencyCycle { path });
            }
            let definition = self.registry.get(aggregate_name, read_model)?;

            in_progress.push(key);
            let result = self.fold_pending(definition, in_progress, force_persist).await;
            in_progress.pop();
            result
        })
    }

    async fn fold_pending(
        &self,
        definition: &ProjectionDefinition,
        in_progress: &mut Vec<String>,
        force_persist: bool,
    ) -> Result<Rehydrated, DomainError> {
        let (snapshot, previous_taken_at) = self.load_snapshot(definition).await?;

        let mut consumed = snapshot.dependencies.clone();
        let mut foreign: Vec<(usize, StoredEvent)> = Vec::new();
        for (index, dependency) in definition.dependencies().iter().enumerate() {
            let current = self
                .rehydrate_guarded(
                    &dependency.aggregate_name,
                    &dependency.read_model,
                    in_progress,
                    false,
                )
                .await?;
            let dependency_key = dependency.key();
            let already = snapshot.dependencies.get(&dependency_key).copied();
            if current.watermark <= already {
                continue;
            }
            // Foreign events appended after this point wait for the next
            // pass. One that lands before a local event fetched below is
            // therefore folded after that local event.
            let filter = EventFilter::stream(&dependency.aggregate_name)
                .for_read_model(&dependency.read_model)
                .after(already)
                .until(current.watermark);
            let events = self.events.fetch(&filter).await?;
            if let Some(last) = events.last() {
                consumed.insert(dependency_key, last.watermark());
            }
            foreign.extend(events.into_iter().map(|event| (index, event)));
        }
        foreign.sort_by(|(_, a), (_, b)| a.watermark().cmp(&b.watermark()));

        let filter = EventFilter::stream(definition.aggregate_name())
            .for_read_model(definition.read_model())
            .after(snapshot.watermark);
        let local = self.events.fetch(&filter).await?;

        let mut state = snapshot.state;
        let watermark = local.last().map(StoredEvent::watermark).or(snapshot.watermark);
        let folded = fold_interleaved(definition, &mut state, &local, &foreign);

        debug!(
            projection = %definition.key(),
            local = local.len(),
            foreign = foreign.len(),
            "folded pending events"
        );

        let now = self.clock.now();
        let next = Snapshot {
            aggregate_name: definition.aggregate_name().to_owned(),
            read_model: definition.read_model().to_owned(),
            state,
            watermark,
            dependencies: consumed,
            taken_at: now,
        };
        let persisted = if force_persist
            || self.policy.should_persist(folded, previous_taken_at, now)
        {
            self.persist(&next).await
        } else {
            false
        };

        Ok(Rehydrated {
            state: next.state,
            watermark: next.watermark,
            folded,
            persisted,
        })
    }

    async fn load_snapshot(
        &self,
        definition: &ProjectionDefinition,
    ) -> Result<(Snapshot, Option<DateTime<Utc>>), DomainError> {
        let aggregate_name = definition.aggregate_name();
        let read_model = definition.read_model();
        match self.snapshots.load(aggregate_name, read_model).await {
            Ok(Some(snapshot)) => {
                let taken_at = snapshot.taken_at;
                Ok((snapshot, Some(taken_at)))
            }
            Ok(None) => Ok((Snapshot::empty(aggregate_name, read_model, self.clock.now()), None)),
            Err(DomainError::CorruptSnapshot(reason)) => {
                warn!(
                    projection = %definition.key(),
                    %reason,
                    "discarding unreadable snapshot, replaying from the beginning"
                );
                if let Err(e) = self.snapshots.delete(aggregate_name, read_model).await {
                    warn!(projection = %definition.key(), error = %e, "failed to discard snapshot");
                }
                Ok((Snapshot::empty(aggregate_name, read_model, self.clock.now()), None))
            }
            Err(e) => Err(e),
        }
    }

    async fn persist(&self, snapshot: &Snapshot) -> bool {
        let projection = projection_key(&snapshot.aggregate_name, &snapshot.read_model);
        match self.snapshots.save(snapshot).await {
            Ok(SaveOutcome::Stored) => {
                info!(
                    %projection,
                    entities = snapshot.state.len(),
                    "snapshot persisted"
                );
                true
            }
            Ok(SaveOutcome::Stale) => {
                debug!(%projection, "stored snapshot already at or past this one");
                false
            }
            Err(e) => {
                warn!(%projection, error = %e, "snapshot persist failed");
                false
            }
        }
    }
}

/// Merges local and foreign events by watermark and folds them. On equal
/// watermarks the local event goes first.
fn fold_interleaved(
    definition: &ProjectionDefinition,
    state: &mut ProjectionState,
    local: &[StoredEvent],
    foreign: &[(usize, StoredEvent)],
) -> usize {
    let reducer = definition.reducer();
    let dependencies = definition.dependencies();
    let mut local_iter = local.iter().peekable();
    let mut foreign_iter = foreign.iter().peekable();
    let mut folded = 0;

    loop {
        let take_local = match (local_iter.peek(), foreign_iter.peek()) {
            (Some(l), Some((_, f))) => l.watermark().cmp(&f.watermark()) != Ordering::Greater,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        if take_local {
            if let Some(event) = local_iter.next() {
                reducer.fold(state, event);
            }
        } else if let Some((index, event)) = foreign_iter.next() {
            (dependencies[*index].handler)(state, event);
        }
        folded += 1;
    }

    folded
}
