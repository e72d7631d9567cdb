//! Cuckoo Cycle CPU solver.
//!
//! Edges are inserted one at a time into a forest stored as a back-pointer
//! table (`cuckoo[node] = parent`, 0 = root). For each new edge both
//! endpoints are followed to their roots:
//!
//! 1. different roots: the shorter path is reversed and the edge joins the
//!    two trees
//! 2. same root: the edge closes a cycle whose length is the two path
//!    lengths past their meeting point plus one
//!
//! A 42-cycle is recovered by collecting its node pairs and replaying the edge
//! space to find the edge indices that produce them.

use crate::error::{SolverError, SolverResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use thought_consensus::cuckoo::{derive_key, GraphParams, SipKeys};
use thought_consensus::params::{MAX_PATH_LEN, PROOF_SIZE};
use thought_consensus::{BlockHeader, Proof};
use tracing::{trace, warn};

/// Nonces processed between checks of the stop flag.
const CANCEL_POLL_INTERVAL: u32 = 1024;

/// Single-threaded Cuckoo Cycle solver.
///
/// Owns one back-pointer table of `1 + nnodes` words, allocated at
/// construction and reused across headers.
pub struct CuckooSolver {
    graph: GraphParams,
    keys: SipKeys,
    cuckoo: Box<[u32]>,
    us: Box<[u32]>,
    vs: Box<[u32]>,
    nonce: u32,
}

impl CuckooSolver {
    /// Allocate a solver for graphs of `graph_size` bits.
    pub fn new(graph_size: u32) -> Self {
        let graph = GraphParams::new(graph_size);
        Self {
            graph,
            keys: SipKeys::default(),
            cuckoo: vec![0u32; 1 + graph.nnodes as usize].into_boxed_slice(),
            us: vec![0u32; MAX_PATH_LEN].into_boxed_slice(),
            vs: vec![0u32; MAX_PATH_LEN].into_boxed_slice(),
            nonce: 0,
        }
    }

    /// Graph constants this solver was built for.
    pub fn graph(&self) -> &GraphParams {
        &self.graph
    }

    /// Next edge index to be inserted.
    pub fn nonce_cursor(&self) -> u32 {
        self.nonce
    }

    /// Start solving the graph of `header`.
    pub fn set_header(&mut self, header: &BlockHeader) {
        self.set_keys(derive_key(header));
    }

    /// Start solving the graph keyed by `keys`.
    pub fn set_keys(&mut self, keys: SipKeys) {
        self.keys = keys;
        self.cuckoo.fill(0);
        self.nonce = 0;
    }

    /// Search on from the cursor for the next 42-cycle.
    ///
    /// Returns `Ok(None)` once the edge space is exhausted.
    pub fn next_solution(&mut self) -> SolverResult<Option<Proof>> {
        self.search(PROOF_SIZE, None).map(|cycle| cycle.map(into_proof))
    }

    /// As [`Self::next_solution`], also returning `Ok(None)` soon after
    /// `stop` is set.
    pub fn next_solution_cancellable(&mut self, stop: &AtomicBool) -> SolverResult<Option<Proof>> {
        self.search(PROOF_SIZE, Some(stop))
            .map(|cycle| cycle.map(into_proof))
    }

    /// Search on from the cursor for the next cycle of `length` edges,
    /// returned as ascending edge indices.
    pub fn next_cycle(&mut self, length: usize) -> SolverResult<Option<Vec<u32>>> {
        self.search(length, None)
    }

    fn search(&mut self, cycle_len: usize, stop: Option<&AtomicBool>) -> SolverResult<Option<Vec<u32>>> {
        let easiness = self.graph.easiness;
        while self.nonce < easiness {
            let nonce = self.nonce;
            self.nonce += 1;

            if nonce % CANCEL_POLL_INTERVAL == 0 {
                if let Some(stop) = stop {
                    if stop.load(Ordering::Relaxed) {
                        trace!(nonce, "Cycle search cancelled");
                        return Ok(None);
                    }
                }
            }

            let (u0, v0) = self.graph.edge(&self.keys, nonce);
            // Node 0 marks a root.
            if u0 == 0 {
                continue;
            }
            let u = self.cuckoo[u0 as usize];
            let v = self.cuckoo[v0 as usize];
            self.us[0] = u0;
            self.vs[0] = v0;

            let mut nu = path(&self.cuckoo, u, &mut self.us)?;
            let mut nv = path(&self.cuckoo, v, &mut self.vs)?;

            if self.us[nu] == self.vs[nv] {
                let min = nu.min(nv);
                nu -= min;
                nv -= min;
                while self.us[nu] != self.vs[nv] {
                    nu += 1;
                    nv += 1;
                }
                let length = nu + nv + 1;
                if length == cycle_len {
                    trace!(nonce, length, "Found cycle");
                    return self.recover_cycle(nu, nv, length).map(Some);
                }
                continue;
            }

            // Reverse the shorter path so its end becomes the new edge.
            if nu < nv {
                while nu > 0 {
                    nu -= 1;
                    self.cuckoo[self.us[nu + 1] as usize] = self.us[nu];
                }
                self.cuckoo[u0 as usize] = v0;
            } else {
                while nv > 0 {
                    nv -= 1;
                    self.cuckoo[self.vs[nv + 1] as usize] = self.vs[nv];
                }
                self.cuckoo[v0 as usize] = u0;
            }
        }
        Ok(None)
    }

    /// Edge indices of the cycle held in the path buffers, ascending.
    fn recover_cycle(&self, nu: usize, nv: usize, length: usize) -> SolverResult<Vec<u32>> {
        let us = &self.us;
        let vs = &self.vs;

        let mut cycle: HashSet<(u32, u32)> = HashSet::with_capacity(length);
        cycle.insert((us[0], vs[0]));
        // U nodes sit at even positions of `us` and odd positions of `vs`.
        for i in (0..nu).rev() {
            cycle.insert((us[(i + 1) & !1], us[i | 1]));
        }
        for i in (0..nv).rev() {
            cycle.insert((vs[i | 1], vs[(i + 1) & !1]));
        }

        let mut nonces = Vec::with_capacity(length);
        for nonce in 0..self.graph.easiness {
            let edge = self.graph.edge(&self.keys, nonce);
            if cycle.remove(&edge) {
                nonces.push(nonce);
                if nonces.len() == length {
                    return Ok(nonces);
                }
            }
        }

        warn!(found = nonces.len(), length, "Cycle edges missing from edge space");
        Err(SolverError::IncompleteCycle {
            found: nonces.len(),
        })
    }
}

fn into_proof(cycle: Vec<u32>) -> Proof {
    let mut proof = [0u32; PROOF_SIZE];
    proof.copy_from_slice(&cycle);
    proof
}

/// Follow back-pointers from `u`, recording the path into `us[1..]`.
///
/// `us[0]` holds the starting edge endpoint. Returns the index of the root.
fn path(cuckoo: &[u32], mut u: u32, us: &mut [u32]) -> SolverResult<usize> {
    let mut nu = 0usize;
    while u != 0 {
        nu += 1;
        if nu >= MAX_PATH_LEN {
            return Err(match us[..nu].iter().rposition(|&node| node == u) {
                Some(revisit) => SolverError::IllegalCycle {
                    length: MAX_PATH_LEN - revisit,
                },
                None => SolverError::PathTooLong,
            });
        }
        us[nu] = u;
        u = cuckoo[u as usize];
    }
    Ok(nu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use thought_consensus::cuckoo::verify;
    use thought_consensus::CycleError;

    /// Find a header nonce whose graph holds a 42-cycle.
    fn solve_small(graph_size: u32) -> (BlockHeader, Proof) {
        let mut solver = CuckooSolver::new(graph_size);
        let mut header = BlockHeader {
            bits: 0x2100efff,
            time: 1_521_040_440,
            ..Default::default()
        };
        header.set_cuckoo_pow(true);
        for nonce in 0..1024 {
            header.nonce = nonce;
            solver.set_header(&header);
            if let Some(proof) = solver.next_solution().unwrap() {
                return (header, proof);
            }
        }
        panic!("no 42-cycle in 1024 graphs of size {}", graph_size);
    }

    #[test]
    fn test_solution_verifies() {
        let (header, proof) = solve_small(14);
        assert_eq!(verify(&proof, &derive_key(&header), 14), Ok(()));
        assert!(proof.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_solution_rejected_on_other_graph_size() {
        let (header, proof) = solve_small(14);
        assert!(verify(&proof, &derive_key(&header), 15).is_err());
    }

    #[test]
    fn test_swapped_solution_not_ascending() {
        let (header, mut proof) = solve_small(13);
        proof.swap(0, 1);
        assert_eq!(
            verify(&proof, &derive_key(&header), 13),
            Err(CycleError::ProofNotAscending)
        );
    }

    #[test]
    fn test_short_cycles_are_closed() {
        let mut solver = CuckooSolver::new(12);
        let graph = *solver.graph();
        let mut header = BlockHeader::default();
        for nonce in 0..64 {
            header.nonce = nonce;
            solver.set_header(&header);
            if let Some(cycle) = solver.next_cycle(8).unwrap() {
                assert_eq!(cycle.len(), 8);
                let keys = derive_key(&header);
                // Every endpoint appears exactly twice.
                let mut nodes: Vec<u32> = cycle
                    .iter()
                    .flat_map(|&n| {
                        let (u, v) = graph.edge(&keys, n);
                        [u, v]
                    })
                    .collect();
                nodes.sort_unstable();
                for pair in nodes.chunks(2) {
                    assert_eq!(pair[0], pair[1]);
                }
                return;
            }
        }
        panic!("no 8-cycle in 64 graphs");
    }

    #[test]
    fn test_set_header_resets_state() {
        let mut solver = CuckooSolver::new(12);
        let header = BlockHeader::default();
        solver.set_header(&header);
        let first = solver.next_solution().unwrap();
        assert!(solver.nonce_cursor() > 0);

        solver.set_header(&header);
        assert_eq!(solver.nonce_cursor(), 0);
        assert_eq!(solver.next_solution().unwrap(), first);
    }

    #[test]
    fn test_exhausts_edge_space() {
        let mut solver = CuckooSolver::new(10);
        solver.set_header(&BlockHeader::default());
        while solver.next_solution().unwrap().is_some() {}
        assert_eq!(solver.nonce_cursor(), solver.graph().easiness);
        assert_eq!(solver.next_solution().unwrap(), None);
    }

    #[test]
    fn test_cancellation() {
        let mut solver = CuckooSolver::new(16);
        solver.set_header(&BlockHeader::default());
        let stop = AtomicBool::new(true);
        assert_eq!(solver.next_solution_cancellable(&stop).unwrap(), None);
        assert_eq!(solver.nonce_cursor(), 1);
    }

    #[test]
    fn test_path_follows_back_pointers() {
        // 4 -> 7 -> 2 -> root
        let mut cuckoo = vec![0u32; 9];
        cuckoo[4] = 7;
        cuckoo[7] = 2;
        let mut us = vec![0u32; MAX_PATH_LEN];
        us[0] = 9;
        assert_eq!(path(&cuckoo, 4, &mut us).unwrap(), 3);
        assert_eq!(&us[..4], &[9, 4, 7, 2]);
    }

    #[test]
    fn test_path_reports_illegal_cycle() {
        // 2 -> 4 -> 6 -> 2 loops forever.
        let mut cuckoo = vec![0u32; 8];
        cuckoo[2] = 4;
        cuckoo[4] = 6;
        cuckoo[6] = 2;
        let mut us = vec![0u32; MAX_PATH_LEN];
        match path(&cuckoo, 2, &mut us) {
            Err(SolverError::IllegalCycle { length }) => assert_eq!(length, 3),
            other => panic!("unexpected {:?}", other),
        }
    }
}
