// ============================================================================
// focus-core/src/distributed/mod.rs
// ============================================================================
//
// DISTRIBUTED EXECUTION: Worker identity and collective primitives
//
// Every worker runs the same control flow. The only collective operations are
// a barrier and a deterministic all-reduce sum; there are no timeouts, so a
// worker that never arrives stalls the others.
//
// KEY COMPONENTS:
// - WorkerIdentity: rank and group size, fixed for the process lifetime
// - Communicator: the collective seam used by the controller and optimizer
// - SingleProcess: trivial one-worker communicator
// - LocalGroup: in-process worker group backed by std::sync::Barrier
// - partition: assignment of loss terms and calibrations to ranks

pub mod partition;

pub use partition::{LOSS_GROUPS, Partition};

use crate::error::{CoreError, CoreResult};
use std::sync::{Arc, Barrier, Mutex};

/// Rank of a worker within its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerIdentity {
    rank: usize,
    size: usize,
}

impl WorkerIdentity {
    pub fn new(rank: usize, size: usize) -> CoreResult<Self> {
        if size == 0 || rank >= size {
            return Err(CoreError::Worker(format!(
                "rank {rank} is outside a group of {size} workers"
            )));
        }
        Ok(Self { rank, size })
    }

    pub fn single() -> Self {
        Self { rank: 0, size: 1 }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_root(&self) -> bool {
        self.rank == 0
    }
}

/// Collective operations shared by every worker of a group.
pub trait Communicator: Send + Sync {
    fn identity(&self) -> WorkerIdentity;

    /// Blocks until every worker of the group has reached this call.
    fn barrier(&self);

    /// Replaces `values` with the element-wise sum over all workers.
    ///
    /// Contributions are added in rank order, so every worker receives a
    /// bit-identical result.
    fn all_reduce_sum(&self, values: &mut [f64]) -> CoreResult<()>;
}

/// Communicator of a run with a single worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn identity(&self) -> WorkerIdentity {
        WorkerIdentity::single()
    }

    fn barrier(&self) {}

    fn all_reduce_sum(&self, _values: &mut [f64]) -> CoreResult<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct GroupState {
    barrier: Barrier,
    slots: Mutex<Vec<Vec<f64>>>,
}

/// One member of an in-process worker group.
#[derive(Debug, Clone)]
pub struct LocalGroup {
    identity: WorkerIdentity,
    state: Arc<GroupState>,
}

impl LocalGroup {
    /// Creates the communicators of a group of `size` workers, in rank order.
    pub fn create(size: usize) -> CoreResult<Vec<LocalGroup>> {
        if size == 0 {
            return Err(CoreError::Worker("a worker group needs at least one member".to_string()));
        }
        let state = Arc::new(GroupState {
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![Vec::new(); size]),
        });
        (0..size)
            .map(|rank| {
                Ok(LocalGroup {
                    identity: WorkerIdentity::new(rank, size)?,
                    state: Arc::clone(&state),
                })
            })
            .collect()
    }

    fn slots(&self) -> CoreResult<std::sync::MutexGuard<'_, Vec<Vec<f64>>>> {
        self.state
            .slots
            .lock()
            .map_err(|_| CoreError::Worker("a worker panicked during a collective".to_string()))
    }

    fn reduce_published(&self, values: &mut [f64]) -> CoreResult<()> {
        let slots = self.slots()?;
        if let Some((rank, slot)) = slots.iter().enumerate().find(|(_, s)| s.len() != values.len()) {
            return Err(CoreError::Worker(format!(
                "all-reduce length mismatch: rank {rank} sent {} values, rank {} expected {}",
                slot.len(),
                self.identity.rank,
                values.len()
            )));
        }
        values.iter_mut().for_each(|v| *v = 0.0);
        for slot in slots.iter() {
            for (acc, v) in values.iter_mut().zip(slot) {
                *acc += v;
            }
        }
        Ok(())
    }
}

impl Communicator for LocalGroup {
    fn identity(&self) -> WorkerIdentity {
        self.identity
    }

    fn barrier(&self) {
        self.state.barrier.wait();
    }

    fn all_reduce_sum(&self, values: &mut [f64]) -> CoreResult<()> {
        let published = self.slots().map(|mut slots| {
            slots[self.identity.rank] = values.to_vec();
        });
        self.state.barrier.wait();
        let reduced = published.and_then(|()| self.reduce_published(values));
        // Nobody may publish the next round before everyone has read this one.
        self.state.barrier.wait();
        reduced
    }
}
