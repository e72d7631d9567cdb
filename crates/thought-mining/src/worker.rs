//! Mining worker thread implementation.
//!
//! Each `MiningWorker` runs its own `CuckooSolver` on a dedicated thread.
//! Worker `k` of `n` tries header nonces `start + k, start + k + n, ...`, so
//! workers never solve the same graph. Tasks arrive over a watch channel and
//! solutions go back over an mpsc channel.

use crate::error::{MiningError, SolverError};
use crate::miner::{solve_header, SearchLimits};
use crate::solver::CuckooSolver;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thought_consensus::{BlockHeader, ConsensusParams};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Header nonces tried between checks for new work.
const BATCH_SIZE: u64 = 1;

/// Idle sleep while there is no work.
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// A mining task describing the work to be done.
#[derive(Clone, Debug)]
pub struct MiningTask {
    /// Header to solve. Its nonce is the start of the search.
    pub header: BlockHeader,
    /// Block height.
    pub height: u32,
    /// Task generation timestamp (for staleness detection).
    pub created_at: u64,
}

impl MiningTask {
    /// Create a task stamped with the current time.
    pub fn new(header: BlockHeader, height: u32) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            header,
            height,
            created_at,
        }
    }
}

/// A solution found by a worker.
#[derive(Debug)]
pub struct FoundSolution {
    /// Solved header: cuckoo version bit, winning nonce and proof set.
    pub header: BlockHeader,
    /// The task this solution is for.
    pub task: MiningTask,
    /// Worker ID that found the solution.
    pub worker_id: usize,
    /// Graphs searched on this task by the worker.
    pub graphs_searched: u64,
}

type FaultSlot = Arc<Mutex<Option<SolverError>>>;

/// A mining worker that runs in its own thread.
pub struct MiningWorker {
    /// Worker ID.
    id: usize,
    /// Handle to the worker thread.
    handle: Option<JoinHandle<()>>,
    /// Cleared to stop the worker.
    running: Arc<AtomicBool>,
    /// Set alongside clearing `running`; interrupts an in-progress graph.
    cancel: Arc<AtomicBool>,
    /// Graphs searched, for statistics.
    graph_count: Arc<AtomicU64>,
    /// Solver fault that stopped the worker, if any.
    fault: FaultSlot,
}

impl MiningWorker {
    /// Spawn a new mining worker.
    ///
    /// # Arguments
    /// * `id` - Worker index, also its header-nonce residue
    /// * `num_workers` - Header-nonce stride
    /// * `params` - Consensus parameters (graph size and target ceilings)
    /// * `task_rx` - Receiver for mining tasks
    /// * `solution_tx` - Sender for found solutions
    pub fn spawn(
        id: usize,
        num_workers: usize,
        params: Arc<ConsensusParams>,
        task_rx: watch::Receiver<Option<MiningTask>>,
        solution_tx: mpsc::Sender<FoundSolution>,
    ) -> Result<Self, MiningError> {
        let running = Arc::new(AtomicBool::new(true));
        let cancel = Arc::new(AtomicBool::new(false));
        let graph_count = Arc::new(AtomicU64::new(0));
        let fault: FaultSlot = Arc::new(Mutex::new(None));

        let ctx = WorkerContext {
            id,
            stride: num_workers.max(1) as u32,
            params,
            running: Arc::clone(&running),
            cancel: Arc::clone(&cancel),
            graph_count: Arc::clone(&graph_count),
            fault: Arc::clone(&fault),
        };

        let handle = thread::Builder::new()
            .name(format!("mining-worker-{}", id))
            .spawn(move || ctx.run(task_rx, solution_tx))
            .map_err(|e| MiningError::WorkerPool(format!("failed to spawn worker {}: {}", id, e)))?;

        debug!(worker_id = id, "Mining worker spawned");

        Ok(Self {
            id,
            handle: Some(handle),
            running,
            cancel,
            graph_count,
            fault,
        })
    }

    /// Stop the worker.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Check if the worker is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Get the worker ID.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Graphs searched so far.
    pub fn graph_count(&self) -> u64 {
        self.graph_count.load(Ordering::Relaxed)
    }

    /// Reset the graph counter and return the previous value.
    pub fn reset_graph_count(&self) -> u64 {
        self.graph_count.swap(0, Ordering::Relaxed)
    }

    /// Take the solver fault that stopped this worker, if any.
    pub fn take_fault(&self) -> Option<SolverError> {
        self.fault.lock().take()
    }

    /// Wait for the worker thread to finish.
    pub fn join(mut self) -> thread::Result<()> {
        self.stop();
        if let Some(handle) = self.handle.take() {
            handle.join()
        } else {
            Ok(())
        }
    }
}

impl Drop for MiningWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State moved into the worker thread.
struct WorkerContext {
    id: usize,
    stride: u32,
    params: Arc<ConsensusParams>,
    running: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    graph_count: Arc<AtomicU64>,
    fault: FaultSlot,
}

impl WorkerContext {
    fn run(
        self,
        mut task_rx: watch::Receiver<Option<MiningTask>>,
        solution_tx: mpsc::Sender<FoundSolution>,
    ) {
        let id = self.id;
        let mut solver = CuckooSolver::new(self.params.cuckoo_graph_size());

        while self.running.load(Ordering::Relaxed) {
            // Mark current value as seen so has_changed() works correctly
            let task = task_rx.borrow_and_update().clone();

            let Some(task) = task else {
                trace!(worker_id = id, "No work available, waiting...");
                thread::sleep(IDLE_WAIT);
                continue;
            };

            let mut header = task.header.clone();
            header.nonce = header.nonce.wrapping_add(id as u32);
            let mut task_graphs: u64 = 0;
            let limits = SearchLimits {
                stride: self.stride,
                max_attempts: Some(BATCH_SIZE),
            };

            loop {
                if !self.running.load(Ordering::Relaxed) {
                    break;
                }
                if task_rx.has_changed().unwrap_or(false) {
                    trace!(worker_id = id, "New work received, switching tasks");
                    break;
                }

                let nonce_before = header.nonce;
                match solve_header(&mut solver, &mut header, &self.params, limits, &self.cancel) {
                    Ok(graphs) => {
                        task_graphs += graphs;
                        self.graph_count.fetch_add(graphs, Ordering::Relaxed);
                        info!(
                            worker_id = id,
                            height = task.height,
                            nonce = header.nonce,
                            graphs = task_graphs,
                            "Found valid solution!"
                        );

                        let found = FoundSolution {
                            header: header.clone(),
                            task: task.clone(),
                            worker_id: id,
                            graphs_searched: task_graphs,
                        };
                        // Blocking send since we're in a non-async thread
                        if solution_tx.blocking_send(found).is_err() {
                            warn!(worker_id = id, "Failed to send solution, channel closed");
                            self.running.store(false, Ordering::Relaxed);
                            return;
                        }
                        self.wait_for_new_task(&task_rx);
                        break;
                    }
                    Err(MiningError::NoSolution { attempts }) => {
                        task_graphs += attempts;
                        self.graph_count.fetch_add(attempts, Ordering::Relaxed);
                        // The nonce only stays put when it cannot advance.
                        if header.nonce == nonce_before {
                            debug!(worker_id = id, "Header nonce space exhausted");
                            self.wait_for_new_task(&task_rx);
                            break;
                        }
                    }
                    Err(MiningError::Cancelled) => break,
                    Err(MiningError::Solver(fault)) => {
                        warn!(worker_id = id, nonce = header.nonce, error = %fault, "Solver fault");
                        *self.fault.lock() = Some(fault);
                        self.running.store(false, Ordering::Relaxed);
                        return;
                    }
                    Err(e) => {
                        warn!(worker_id = id, error = %e, "Task cannot be mined");
                        self.wait_for_new_task(&task_rx);
                        break;
                    }
                }
            }
        }

        info!(
            worker_id = id,
            graphs = self.graph_count.load(Ordering::Relaxed),
            "Worker shutting down"
        );
    }

    fn wait_for_new_task(&self, task_rx: &watch::Receiver<Option<MiningTask>>) {
        while self.running.load(Ordering::Relaxed) && !task_rx.has_changed().unwrap_or(true) {
            thread::sleep(IDLE_WAIT);
        }
    }
}

/// A pool of mining workers.
pub struct WorkerPool {
    /// Workers in the pool.
    workers: Vec<MiningWorker>,
    /// Task sender to broadcast work to all workers.
    task_tx: watch::Sender<Option<MiningTask>>,
    /// Solution receiver.
    solution_rx: mpsc::Receiver<FoundSolution>,
    /// Running flag.
    running: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Create a new worker pool with the specified number of workers.
    ///
    /// Workers that fail to spawn are logged and left out of the pool.
    pub fn new(num_workers: usize, params: Arc<ConsensusParams>) -> Self {
        let (task_tx, task_rx) = watch::channel(None);
        let (solution_tx, solution_rx) = mpsc::channel(num_workers.max(1) * 2);
        let running = Arc::new(AtomicBool::new(true));

        let mut workers = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            match MiningWorker::spawn(
                id,
                num_workers,
                Arc::clone(&params),
                task_rx.clone(),
                solution_tx.clone(),
            ) {
                Ok(worker) => workers.push(worker),
                Err(e) => warn!(worker_id = id, error = %e, "Worker not started"),
            }
        }

        info!(
            num_workers = workers.len(),
            graph_size = params.cuckoo_graph_size(),
            "Worker pool created"
        );

        Self {
            workers,
            task_tx,
            solution_rx,
            running,
        }
    }

    /// Broadcast a new mining task to all workers.
    pub fn broadcast_task(&self, task: MiningTask) {
        if self.task_tx.send(Some(task)).is_err() {
            warn!("Failed to broadcast task, no workers subscribed");
        }
    }

    /// Clear the current task (workers will idle).
    pub fn clear_task(&self) {
        let _ = self.task_tx.send(None);
    }

    /// Try to receive a solution (non-blocking).
    pub fn try_recv_solution(&mut self) -> Option<FoundSolution> {
        self.solution_rx.try_recv().ok()
    }

    /// Receive a solution (async).
    pub async fn recv_solution(&mut self) -> Option<FoundSolution> {
        self.solution_rx.recv().await
    }

    /// Take the first recorded solver fault along with its worker ID.
    pub fn take_fault(&self) -> Option<(usize, SolverError)> {
        self.workers
            .iter()
            .find_map(|w| w.take_fault().map(|fault| (w.id(), fault)))
    }

    /// Total graphs searched across all workers.
    pub fn total_graph_count(&self) -> u64 {
        self.workers.iter().map(|w| w.graph_count()).sum()
    }

    /// Reset all graph counters and return the total.
    pub fn reset_graph_counts(&self) -> u64 {
        self.workers.iter().map(|w| w.reset_graph_count()).sum()
    }

    /// Get the number of workers.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Check if the pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Whether any worker is still running.
    pub fn any_running(&self) -> bool {
        self.workers.iter().any(|w| w.is_running())
    }

    /// Stop all workers.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        for worker in &self.workers {
            worker.stop();
        }
    }

    /// Shutdown the pool and wait for all workers to finish.
    pub fn shutdown(self) {
        self.stop();
        for worker in self.workers {
            let _ = worker.join();
        }
        info!("Worker pool shutdown complete");
    }
}
