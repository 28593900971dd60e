//! Running memory-cost estimate for the entries of one partition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mapstore_core::{Data, InMemoryFormat};

use crate::storage::record::{Record, RecordValue};

/// Approximate cost of one hash table slot.
const HASH_ENTRY_COST_BYTES: u64 = 32;

/// Approximate fixed cost of a record's metadata.
const RECORD_COST_BYTES: u64 = 72;

/// How entry costs are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostModel {
    /// Key bytes + value bytes + fixed per-entry overhead.
    Serialized,
    /// Always zero. Deserialized object graphs cannot be measured cheaply.
    Zero,
}

impl CostModel {
    /// The model used for maps kept in `format`.
    #[must_use]
    pub fn for_format(format: InMemoryFormat) -> Self {
        match format {
            InMemoryFormat::Binary | InMemoryFormat::Native => Self::Serialized,
            InMemoryFormat::Object => Self::Zero,
        }
    }
}

/// Running estimate of the memory held by a storage's entries.
///
/// Only the owning storage adjusts the estimate. The value lives in an
/// atomic so a [`CostGauge`] handed to monitoring can read it from another
/// thread; such reads may be momentarily stale.
#[derive(Debug)]
pub struct EntryCostEstimator {
    model: CostModel,
    estimate: Arc<AtomicU64>,
}

impl EntryCostEstimator {
    /// Creates an estimator starting at zero.
    #[must_use]
    pub fn new(model: CostModel) -> Self {
        Self {
            model,
            estimate: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates the estimator appropriate for `format`.
    #[must_use]
    pub fn for_format(format: InMemoryFormat) -> Self {
        Self::new(CostModel::for_format(format))
    }

    /// The cost model in use.
    #[must_use]
    pub fn model(&self) -> CostModel {
        self.model
    }

    /// Current estimate in bytes.
    #[must_use]
    pub fn estimate(&self) -> u64 {
        self.estimate.load(Ordering::Relaxed)
    }

    /// Read-only handle for concurrent readers.
    #[must_use]
    pub fn gauge(&self) -> CostGauge {
        CostGauge(Arc::clone(&self.estimate))
    }

    /// Moves the estimate by `delta`, clamping at zero.
    pub fn adjust_estimate_by(&self, delta: i64) {
        let current = self.estimate.load(Ordering::Relaxed);
        let next = current.saturating_add_signed(delta);
        self.estimate.store(next, Ordering::Relaxed);
    }

    /// Cost attributed to a value alone.
    #[must_use]
    pub fn calculate_value_cost(&self, value: &RecordValue) -> u64 {
        match self.model {
            CostModel::Serialized => value.estimated_size() as u64,
            CostModel::Zero => 0,
        }
    }

    /// Cost attributed to a whole entry (slot, key, record, value).
    #[must_use]
    pub fn calculate_entry_cost(&self, key: &Data, record: &Record) -> u64 {
        match self.model {
            CostModel::Serialized => {
                HASH_ENTRY_COST_BYTES
                    + key.len() as u64
                    + RECORD_COST_BYTES
                    + self.calculate_value_cost(&record.value)
            }
            CostModel::Zero => 0,
        }
    }

    /// Resets the estimate to zero.
    pub fn reset(&self) {
        self.estimate.store(0, Ordering::Relaxed);
    }
}

/// Read-only view of an [`EntryCostEstimator`]'s current estimate.
#[derive(Debug, Clone)]
pub struct CostGauge(Arc<AtomicU64>);

impl CostGauge {
    /// Current estimate in bytes.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[allow(clippy::cast_possible_wrap)]
pub(crate) fn signed(cost: u64) -> i64 {
    cost.min(i64::MAX as u64) as i64
}
