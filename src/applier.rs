//! Index operation execution.
//!
//! Applies a computed plan against the registered partitions. A failure on
//! one partition never blocks the remaining matches; failures are
//! aggregated and surfaced, and the partitions that did succeed are not
//! rolled back.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::{IndexOp, IndexOperation};
use crate::entities::EntityId;
use crate::partitions::{PartitionRegistry, WriteError};

const METRIC_INDEX_WRITES_TOTAL: &str = "rintocco_index_writes_total";
const METRIC_INDEX_WRITE_FAILURES_TOTAL: &str = "rintocco_index_write_failures_total";

/// One failed partition write within an otherwise-attempted batch.
#[derive(Debug)]
pub struct FailedWrite {
    pub partition: String,
    pub entity_id: EntityId,
    pub error: WriteError,
}

/// One or more partition writes failed while others succeeded.
#[derive(Debug, Error)]
#[error("{} of {attempted} partition writes failed", .failures.len())]
pub struct PartialApplyFailure {
    pub attempted: usize,
    pub failures: Vec<FailedWrite>,
}

/// Counts of successfully applied writes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AppliedStats {
    pub upserts: usize,
    pub deletes: usize,
}

impl AppliedStats {
    pub fn total(&self) -> usize {
        self.upserts + self.deletes
    }
}

/// Executes index operations against the partition registry.
pub struct IndexApplier {
    registry: Arc<PartitionRegistry>,
}

impl IndexApplier {
    pub fn new(registry: Arc<PartitionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PartitionRegistry> {
        &self.registry
    }

    /// Apply every operation to every enabled partition its target
    /// addresses. All matches are attempted even when some fail.
    pub async fn apply(
        &self,
        operations: &[IndexOperation],
    ) -> Result<AppliedStats, PartialApplyFailure> {
        let mut stats = AppliedStats::default();
        let mut attempted = 0;
        let mut failures = Vec::new();

        for operation in operations {
            for partition in self.registry.matching(operation.target) {
                attempted += 1;
                let (result, op_label) = match &operation.op {
                    IndexOp::Upsert(document) => {
                        (partition.writer().upsert(document).await, "upsert")
                    }
                    IndexOp::Delete => (
                        partition.writer().delete(operation.entity_id).await,
                        "delete",
                    ),
                };

                match result {
                    Ok(()) => {
                        counter!(METRIC_INDEX_WRITES_TOTAL, "op" => op_label).increment(1);
                        match operation.op {
                            IndexOp::Upsert(_) => stats.upserts += 1,
                            IndexOp::Delete => stats.deletes += 1,
                        }
                        debug!(
                            partition = partition.name(),
                            entity_id = operation.entity_id,
                            op = op_label,
                            "Applied index operation"
                        );
                    }
                    Err(error) => {
                        counter!(METRIC_INDEX_WRITE_FAILURES_TOTAL).increment(1);
                        warn!(
                            partition = partition.name(),
                            entity_id = operation.entity_id,
                            op = op_label,
                            %error,
                            "Index partition write failed; continuing with remaining partitions"
                        );
                        failures.push(FailedWrite {
                            partition: partition.name().to_string(),
                            entity_id: operation.entity_id,
                            error,
                        });
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(stats)
        } else {
            Err(PartialApplyFailure {
                attempted,
                failures,
            })
        }
    }

    /// Ask every enabled partition to re-derive its field definitions
    /// (content-type change). Returns how many partitions refreshed.
    pub async fn refresh_fields(&self) -> Result<usize, PartialApplyFailure> {
        let mut refreshed = 0;
        let mut attempted = 0;
        let mut failures = Vec::new();

        for partition in self.registry.enabled() {
            attempted += 1;
            match partition.writer().refresh_fields().await {
                Ok(()) => refreshed += 1,
                Err(error) => {
                    counter!(METRIC_INDEX_WRITE_FAILURES_TOTAL).increment(1);
                    warn!(
                        partition = partition.name(),
                        %error,
                        "Field definition refresh failed"
                    );
                    failures.push(FailedWrite {
                        partition: partition.name().to_string(),
                        entity_id: 0,
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(refreshed)
        } else {
            Err(PartialApplyFailure {
                attempted,
                failures,
            })
        }
    }
}
