//! Error type returned by record store operations.

/// Errors returned by [`RecordStore`](super::RecordStore) operations.
///
/// Failures coming from collaborators (the external store, an observer sink)
/// are carried transparently so callers see the original message and source
/// chain.
#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    /// The external store rejected a write, delete or load.
    #[error(transparent)]
    Persistence(anyhow::Error),
    /// A mutation observer failed. Already-applied persistence is not rolled back.
    #[error(transparent)]
    Observer(anyhow::Error),
    /// A value could not be converted to the map's in-memory format.
    #[error("value conversion failed: {0}")]
    Codec(anyhow::Error),
    /// Lock state was queried on a record store created without lock support.
    #[error("lock support is not enabled for map {map} on partition {partition_id}")]
    LockSupportDisabled {
        /// Map name.
        map: String,
        /// Partition ID.
        partition_id: u32,
    },
}

/// Result alias for record store operations.
pub type Result<T> = std::result::Result<T, RecordStoreError>;
