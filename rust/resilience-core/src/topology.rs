// rust/resilience-core/src/topology.rs

//! Partner selection on a logical ring of ranks.
//!
//! Every rank replicates its state to the rank `rank_separation` hops ahead
//! (`out_rank`) and holds the replica of the rank the same distance behind
//! (`in_rank`).

use crate::error::{ResilienceError, Result};

/// A rank's position on the ring and its two partners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartnerTopology {
    pub current_rank: i32,
    pub comm_size: i32,
    /// Rank whose replica this rank holds.
    pub in_rank: i32,
    /// Rank holding this rank's replica.
    pub out_rank: i32,
}

impl PartnerTopology {
    /// Derives both partners.
    ///
    /// # Errors
    ///
    /// `Topology` if `comm_size` is not positive or `current_rank` is not a
    /// member of the communicator.
    pub fn derive(current_rank: i32, comm_size: i32, rank_separation: i32) -> Result<Self> {
        if comm_size <= 0 {
            return Err(ResilienceError::topology(format!(
                "communicator size must be positive, got {comm_size}"
            )));
        }
        if !(0..comm_size).contains(&current_rank) {
            return Err(ResilienceError::topology(format!(
                "rank {current_rank} is outside a communicator of size {comm_size}"
            )));
        }

        let (rank, size, separation) = (
            i64::from(current_rank),
            i64::from(comm_size),
            i64::from(rank_separation),
        );
        // Both results are in [0, comm_size), so they fit back into i32.
        let in_rank = (rank + size - separation).rem_euclid(size) as i32;
        let out_rank = (rank + size + separation).rem_euclid(size) as i32;

        Ok(Self {
            current_rank,
            comm_size,
            in_rank,
            out_rank,
        })
    }

    /// True when the rank would replicate onto itself.
    pub fn is_self_partnered(&self) -> bool {
        self.out_rank == self.current_rank
    }
}
