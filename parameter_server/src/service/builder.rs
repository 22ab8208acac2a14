use std::{ops::Range, sync::mpsc::Sender};

use comms::{
    Key, Message, ModelId,
    specs::table::{ConsistencySpec, PartitionSpec, StorageSpec, TableSpec},
};

use crate::{
    error::{Result, ServerErr},
    storage::{DenseStore, MapStore, Store},
    synchronization::{Asp, Bsp, Model, Ssp},
};

/// Builds the consistency model of one table on one shard given its specification.
pub struct ModelBuilder {
    replies: Sender<Message>,
}

impl ModelBuilder {
    /// Creates a new `ModelBuilder`.
    ///
    /// # Arguments
    /// * `replies` - The queue every built model sends its replies through.
    ///
    /// # Returns
    /// A new `ModelBuilder` instance.
    pub fn new(replies: Sender<Message>) -> Self {
        Self { replies }
    }

    /// Builds a new `Model` following a spec.
    ///
    /// # Arguments
    /// * `model_id` - The id of the table.
    /// * `spec` - The specification of the table.
    /// * `range` - The keys owned by this shard, only known under range partitioning.
    ///
    /// # Returns
    /// A new model or an `InvalidSpec` error if the storage can't be built for this shard.
    pub fn build(
        &self,
        model_id: ModelId,
        spec: &TableSpec,
        range: Option<Range<Key>>,
    ) -> Result<Model> {
        let store = self.resolve_store(spec, range)?;
        Ok(self.resolve_consistency(model_id, spec, store))
    }

    /// Resolves the `Store` for this shard.
    ///
    /// # Arguments
    /// * `spec` - The specification of the table.
    /// * `range` - The keys owned by this shard.
    ///
    /// # Returns
    /// A boxed store or an error if a dense store lacks its range.
    fn resolve_store(&self, spec: &TableSpec, range: Option<Range<Key>>) -> Result<Box<dyn Store>> {
        match (spec.storage, spec.partition, range) {
            (StorageSpec::Map, ..) => Ok(Box::new(MapStore::new())),
            (StorageSpec::Dense, PartitionSpec::Range { .. }, Some(range)) => {
                let store = DenseStore::new(range)
                    .map_err(|e| ServerErr::InvalidSpec(e.to_string()))?;
                Ok(Box::new(store))
            }
            (StorageSpec::Dense, PartitionSpec::Range { .. }, None) => Err(ServerErr::InvalidSpec(
                "dense storage needs the key range of its shard".into(),
            )),
            (StorageSpec::Dense, PartitionSpec::Hash { .. }, _) => Err(ServerErr::InvalidSpec(
                "dense storage requires range partitioning".into(),
            )),
        }
    }

    /// Resolves the consistency model wrapping `store`.
    ///
    /// # Arguments
    /// * `model_id` - The id of the table.
    /// * `spec` - The specification of the table.
    /// * `store` - A resolved store.
    ///
    /// # Returns
    /// A new model.
    fn resolve_consistency(
        &self,
        model_id: ModelId,
        spec: &TableSpec,
        store: Box<dyn Store>,
    ) -> Model {
        let replies = self.replies.clone();

        match spec.consistency {
            ConsistencySpec::Asp => Asp::new(model_id, store, replies).into(),
            ConsistencySpec::Bsp => Bsp::new(model_id, store, replies).into(),
            ConsistencySpec::Ssp { staleness } => {
                Ssp::new(model_id, store, replies, staleness).into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroUsize, sync::mpsc};

    use comms::specs::table::UnroutedPolicy;

    use super::*;
    use crate::synchronization::ConsistencyModel;

    fn table(consistency: ConsistencySpec, storage: StorageSpec, partition: PartitionSpec) -> TableSpec {
        TableSpec {
            consistency,
            storage,
            partition,
        }
    }

    fn range_partition() -> PartitionSpec {
        PartitionSpec::Range {
            key_space: 100,
            unrouted: UnroutedPolicy::Reject,
        }
    }

    #[test]
    fn builds_every_consistency_kind() {
        let (tx, _rx) = mpsc::channel();
        let builder = ModelBuilder::new(tx);

        let kinds = [
            (ConsistencySpec::Asp, "asp"),
            (ConsistencySpec::Bsp, "bsp"),
            (ConsistencySpec::Ssp { staleness: 1 }, "ssp"),
        ];

        for (consistency, kind) in kinds {
            let spec = table(consistency, StorageSpec::Map, range_partition());
            let model = builder.build(3, &spec, None).unwrap();
            assert_eq!(model.kind(), kind);
            assert_eq!(model.model_id(), 3);
        }
    }

    #[test]
    fn dense_store_spans_the_shard_range() {
        let (tx, _rx) = mpsc::channel();
        let builder = ModelBuilder::new(tx);

        let spec = table(ConsistencySpec::Asp, StorageSpec::Dense, range_partition());
        let model = builder.build(0, &spec, Some(50..100)).unwrap();
        assert_eq!(model.core().store().len(), 50);
    }

    #[test]
    fn dense_store_too_large_to_allocate_is_invalid() {
        let (tx, _rx) = mpsc::channel();
        let builder = ModelBuilder::new(tx);

        let partition = PartitionSpec::Range {
            key_space: Key::MAX,
            unrouted: UnroutedPolicy::Reject,
        };
        let spec = table(ConsistencySpec::Bsp, StorageSpec::Dense, partition);

        assert!(matches!(
            builder.build(0, &spec, Some(0..Key::MAX)),
            Err(ServerErr::InvalidSpec(_))
        ));
    }

    #[test]
    fn dense_store_rejects_hash_partitioning() {
        let (tx, _rx) = mpsc::channel();
        let builder = ModelBuilder::new(tx);

        let partition = PartitionSpec::Hash {
            virtual_nodes: NonZeroUsize::new(10).unwrap(),
        };
        let spec = table(ConsistencySpec::Asp, StorageSpec::Dense, partition);

        assert!(matches!(
            builder.build(0, &spec, None),
            Err(ServerErr::InvalidSpec(_))
        ));
    }
}
