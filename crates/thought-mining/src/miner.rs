//! Header-nonce mining loop and the block miner.
//!
//! A single graph may hold no 42-cycle, or one whose proof hash misses the
//! target, so mining walks header nonces and solves one graph per nonce.

use crate::error::{MiningError, MiningResult};
use crate::solver::CuckooSolver;
use crate::worker::{FoundSolution, MiningTask, WorkerPool};
use parking_lot::RwLock;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thought_consensus::{check_pow, check_pow_at_height, BlockHeader, ConsensusParams, PowError};
use tracing::{debug, info, warn};

/// How often the miner checks for stop requests and worker faults.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Limits on a header-nonce search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    /// Step between consecutive header nonces.
    pub stride: u32,
    /// Header nonces to try before giving up. `None` runs until the nonce
    /// space is exhausted.
    pub max_attempts: Option<u64>,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            stride: 1,
            max_attempts: None,
        }
    }
}

/// Solve `header` in place, starting from its current nonce.
///
/// On success the header carries the cuckoo version bit, the winning nonce and
/// a proof that passes [`check_pow`] against its own `bits`; the number of
/// header nonces tried is returned. On [`MiningError::NoSolution`] the header
/// nonce is left at the next untried value so the search can be resumed.
pub fn solve_header(
    solver: &mut CuckooSolver,
    header: &mut BlockHeader,
    params: &ConsensusParams,
    limits: SearchLimits,
    stop: &AtomicBool,
) -> MiningResult<u64> {
    header.set_cuckoo_pow(true);
    let stride = limits.stride.max(1);
    let mut attempts: u64 = 0;

    loop {
        if limits.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(MiningError::NoSolution { attempts });
        }
        if stop.load(Ordering::Relaxed) {
            return Err(MiningError::Cancelled);
        }

        solver.set_header(header);
        attempts += 1;

        while let Some(proof) = solver.next_solution_cancellable(stop)? {
            header.cuckoo_proof = proof;
            match check_pow(header, &header.hash(), header.bits, params) {
                Ok(()) => {
                    debug!(nonce = header.nonce, attempts, "Header solved");
                    return Ok(attempts);
                }
                Err(PowError::ProofHashExceedsTarget { .. }) => {
                    debug!(nonce = header.nonce, "Proof hash over target, searching on");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if stop.load(Ordering::Relaxed) {
            return Err(MiningError::Cancelled);
        }

        header.nonce = match header.nonce.checked_add(stride) {
            Some(next) => next,
            None => return Err(MiningError::NoSolution { attempts }),
        };
    }
}

/// Solve `header` on the current thread with no attempt limit.
pub fn solve(header: &mut BlockHeader, params: &ConsensusParams) -> MiningResult<u64> {
    let mut solver = CuckooSolver::new(params.cuckoo_graph_size());
    solve_header(
        &mut solver,
        header,
        params,
        SearchLimits::default(),
        &AtomicBool::new(false),
    )
}

/// A random starting header nonce.
pub fn random_start_nonce() -> u32 {
    rand::thread_rng().gen()
}

/// Miner configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinerOptions {
    /// Number of worker threads.
    pub threads: usize,
    /// First header nonce. Random when `None`.
    pub start_nonce: Option<u32>,
}

impl Default for MinerOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            start_nonce: None,
        }
    }
}

/// Mining statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MiningStats {
    /// Headers handed to the miner.
    pub headers_submitted: u64,
    /// Graphs solved across all headers.
    pub graphs_searched: u64,
    /// Proofs rejected on re-validation.
    pub invalid_solutions: u64,
    /// Headers solved.
    pub blocks_mined: u64,
}

/// Block miner.
pub struct Miner {
    /// Configuration.
    options: MinerOptions,
    /// Consensus parameters shared with workers.
    params: Arc<ConsensusParams>,
    /// Mining enabled flag.
    enabled: AtomicBool,
    /// Mining statistics.
    stats: RwLock<MiningStats>,
}

impl Miner {
    /// Create a new miner. Mining starts disabled.
    pub fn new(options: MinerOptions, params: Arc<ConsensusParams>) -> Self {
        Self {
            options,
            params,
            enabled: AtomicBool::new(false),
            stats: RwLock::new(MiningStats::default()),
        }
    }

    /// Enable mining.
    pub fn start(&self) {
        self.enabled.store(true, Ordering::SeqCst);
        info!("Mining enabled");
    }

    /// Disable mining. A running [`Miner::mine`] returns `Cancelled` shortly
    /// after.
    pub fn stop(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        info!("Mining disabled");
    }

    /// Check if mining is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Consensus parameters in use.
    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Get mining statistics.
    pub fn stats(&self) -> MiningStats {
        self.stats.read().clone()
    }

    /// Mine `header` for block `height` on the worker pool.
    ///
    /// Returns the solved header once a worker finds a proof that re-validates
    /// at `height`.
    pub async fn mine(&self, header: BlockHeader, height: u32) -> MiningResult<FoundSolution> {
        if !self.is_enabled() {
            return Err(MiningError::Cancelled);
        }
        if !self.params.is_cuckoo_fork_active(height) {
            return Err(PowError::PrimitiveNotAllowed {
                height,
                cuckoo: true,
            }
            .into());
        }
        self.stats.write().headers_submitted += 1;

        let mut header = header;
        header.nonce = self.options.start_nonce.unwrap_or_else(random_start_nonce);
        let task = MiningTask::new(header, height);

        let mut pool = WorkerPool::new(self.options.threads.max(1), Arc::clone(&self.params));
        info!(
            height,
            threads = pool.num_workers(),
            start_nonce = task.header.nonce,
            "Mining started"
        );
        pool.broadcast_task(task);

        let result = loop {
            tokio::select! {
                found = pool.recv_solution() => {
                    let Some(found) = found else {
                        break Err(MiningError::WorkerPool("solution channel closed".to_string()));
                    };
                    let header = &found.header;
                    match check_pow_at_height(header, &header.hash(), header.bits, height, &self.params) {
                        Ok(()) => break Ok(found),
                        Err(e) => {
                            warn!(worker_id = found.worker_id, error = %e, "Worker solution rejected");
                            self.stats.write().invalid_solutions += 1;
                        }
                    }
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    if !self.is_enabled() {
                        break Err(MiningError::Cancelled);
                    }
                    if let Some((worker_id, fault)) = pool.take_fault() {
                        warn!(worker_id, error = %fault, "Worker stopped on solver fault");
                        break Err(fault.into());
                    }
                    if !pool.any_running() {
                        break Err(MiningError::WorkerPool("all workers stopped".to_string()));
                    }
                }
            }
        };

        let graphs = pool.total_graph_count();
        pool.shutdown();

        let mut stats = self.stats.write();
        stats.graphs_searched += graphs;
        if let Ok(found) = &result {
            stats.blocks_mined += 1;
            info!(
                height,
                nonce = found.header.nonce,
                hash = %found.header.hash_hex(),
                graphs,
                "Block mined"
            );
        }
        result
    }

    /// Mine `header` on the calling thread.
    pub fn mine_blocking(&self, header: &mut BlockHeader) -> MiningResult<u64> {
        if !self.is_enabled() {
            return Err(MiningError::Cancelled);
        }
        self.stats.write().headers_submitted += 1;
        if let Some(start) = self.options.start_nonce {
            header.nonce = start;
        }

        let mut solver = CuckooSolver::new(self.params.cuckoo_graph_size());
        let cancel = AtomicBool::new(false);
        let result = solve_header(&mut solver, header, &self.params, SearchLimits::default(), &cancel);

        let mut stats = self.stats.write();
        match &result {
            Ok(attempts) => {
                stats.graphs_searched += attempts;
                stats.blocks_mined += 1;
            }
            Err(MiningError::NoSolution { attempts }) => stats.graphs_searched += attempts,
            Err(_) => {}
        }
        result
    }
}
