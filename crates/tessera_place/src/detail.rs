//! Detailed placement: per-cluster simulated annealing.
//!
//! Each cluster is placed independently inside its squeezed cell set. The
//! other clusters appear only as centroid pseudo-blocks and fixed blocks at
//! their pinned positions; both participate in cost, never as swap
//! candidates. Tasks are serializable ([`DetailedTask`]) and run through a
//! [`TaskExecutor`] — the local thread-pool executor ships here, remote
//! transports implement the same contract elsewhere.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_arch::Device;
use tessera_common::{derive_seed, BlockId, CancelToken, ClusterId, Position};

use crate::anneal::{anneal, refine, Annealer, Deadline, Schedule};
use crate::cost::total_hpwl;
use crate::data::{reduce_cluster_graph, ClusterCells, Clusters, FixedPositions, Netlist, Placement};
use crate::error::PlaceError;

/// Steps of the constant-temperature polish after the main anneal.
const REFINE_STEPS: u64 = 1_000;
/// Temperature of the polish.
const REFINE_TEMPERATURE: f64 = 0.01;

/// One cluster's detailed-placement task.
///
/// Self-contained and serializable, so an executor can ship it to another
/// process unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedTask {
    /// The cluster being placed.
    pub cluster: ClusterId,
    /// The cluster's blocks, sorted.
    pub blocks: Vec<BlockId>,
    /// The cluster's cells, sorted.
    pub cells: Vec<Position>,
    /// The netlist reduced to this cluster's point of view.
    pub netlist: Netlist,
    /// Context positions: fixed blocks and other-cluster centroids.
    pub context: Placement,
    /// RNG seed for this task, derived from the cluster id.
    pub seed: u64,
}

/// Builds one task per cluster.
pub fn build_tasks(
    netlist: &Netlist,
    clusters: &Clusters,
    cluster_cells: &ClusterCells,
    centroids: &BTreeMap<ClusterId, Position>,
    fixed: &FixedPositions,
    seed: u64,
) -> Vec<DetailedTask> {
    clusters
        .iter()
        .map(|(&cid, members)| {
            let mut context = fixed.clone();
            for (&other, &pos) in centroids {
                if other != cid {
                    context.insert(BlockId::cluster(other), pos);
                }
            }
            DetailedTask {
                cluster: cid,
                blocks: members.iter().copied().collect(),
                cells: cluster_cells[&cid].iter().copied().collect(),
                netlist: reduce_cluster_graph(netlist, clusters, fixed, Some(cid)),
                context,
                seed: derive_seed(seed, "detail", u64::from(cid.as_raw())),
            }
        })
        .collect()
}

/// The per-cluster annealer: a bijection between blocks and cells.
pub struct DetailedPlacer<'d> {
    device: &'d Device,
    task: &'d DetailedTask,
    state: Placement,
    undo: Option<(BlockId, BlockId)>,
    best: Placement,
}

impl<'d> DetailedPlacer<'d> {
    /// Builds the initial bijection: blocks and cells are grouped by the cell
    /// type they require and zipped in sorted order within each group.
    pub fn new(device: &'d Device, task: &'d DetailedTask) -> Result<Self, PlaceError> {
        if task.blocks.len() != task.cells.len() {
            return Err(PlaceError::Internal(format!(
                "cluster {} has {} blocks for {} cells",
                task.cluster,
                task.blocks.len(),
                task.cells.len()
            )));
        }
        let mut state = Placement::new();
        let mut cells_by_type: BTreeMap<tessera_common::BlockKind, Vec<Position>> =
            BTreeMap::new();
        for &cell in &task.cells {
            let Some(cell_type) = device.cell(cell) else {
                return Err(PlaceError::Internal(format!(
                    "cluster {} cell {cell} is outside the device",
                    task.cluster
                )));
            };
            cells_by_type.entry(cell_type).or_default().push(cell);
        }
        // pools pop from the back; reverse so blocks zip with ascending cells
        for pool in cells_by_type.values_mut() {
            pool.reverse();
        }
        for &block in &task.blocks {
            let Some(required) = device.required_cell(block.kind) else {
                return Err(PlaceError::Internal(format!(
                    "cluster {} contains pseudo-block {block}",
                    task.cluster
                )));
            };
            let pool = cells_by_type.entry(required).or_default();
            let Some(cell) = pool.pop() else {
                return Err(PlaceError::Internal(format!(
                    "cluster {} has no {required:?} cell left for {block}",
                    task.cluster
                )));
            };
            state.insert(block, cell);
        }
        let best = state.clone();
        Ok(Self {
            device,
            task,
            state,
            undo: None,
            best,
        })
    }

    /// Anneals on a calibrated schedule, then polishes near-greedily.
    pub fn run(
        &mut self,
        rng: &mut StdRng,
        deadline: Deadline,
        cancel: &CancelToken,
    ) -> Result<bool, PlaceError> {
        if self.task.blocks.len() < 2 {
            return Ok(false);
        }
        let steps = (100 * self.task.blocks.len() as u64).max(1_000);
        let schedule = Schedule::calibrate(self, steps, rng);
        let outcome = anneal(self, &schedule, rng, deadline, cancel)?;
        let polish = refine(
            self,
            REFINE_STEPS,
            REFINE_TEMPERATURE,
            rng,
            deadline,
            cancel,
        )?;
        Ok(outcome.timed_out || polish.timed_out)
    }

    /// The final block positions for this cluster (context excluded).
    pub fn realize(self) -> Placement {
        self.state
    }
}

impl Annealer for DetailedPlacer<'_> {
    fn propose(&mut self, rng: &mut StdRng) -> bool {
        self.undo = None;
        let blocks = &self.task.blocks;
        if blocks.len() < 2 {
            return false;
        }
        let a = blocks[rng.gen_range(0..blocks.len())];
        let b = blocks[rng.gen_range(0..blocks.len())];
        if a == b {
            return false;
        }
        let pos_a = self.state[&a];
        let pos_b = self.state[&b];
        if !self.device.is_cell_legal(pos_b, a.kind) || !self.device.is_cell_legal(pos_a, b.kind) {
            return false;
        }
        self.state.insert(a, pos_b);
        self.state.insert(b, pos_a);
        self.undo = Some((a, b));
        true
    }

    fn revert(&mut self) {
        if let Some((a, b)) = self.undo.take() {
            let pos_a = self.state[&a];
            let pos_b = self.state[&b];
            self.state.insert(a, pos_b);
            self.state.insert(b, pos_a);
        }
    }

    fn energy(&self) -> f64 {
        let mut positions = self.task.context.clone();
        for (&block, &pos) in &self.state {
            positions.insert(block, pos);
        }
        total_hpwl(&self.task.netlist, &positions)
    }

    fn save_best(&mut self) {
        self.best = self.state.clone();
    }

    fn load_best(&mut self) {
        self.state = self.best.clone();
    }
}

/// Executes a batch of detailed-placement tasks.
///
/// Implementations must collect results in ascending task order and must not
/// let the worker count influence per-task RNG streams.
pub trait TaskExecutor {
    /// Runs every task, returning the per-cluster placements in task order
    /// and whether any task hit its deadline.
    fn execute(
        &self,
        device: &Device,
        tasks: &[DetailedTask],
        deadline: Deadline,
        cancel: &CancelToken,
    ) -> Result<(Vec<Placement>, bool), PlaceError>;
}

/// The local executor: one rayon task per cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExecutor;

impl TaskExecutor for LocalExecutor {
    fn execute(
        &self,
        device: &Device,
        tasks: &[DetailedTask],
        deadline: Deadline,
        cancel: &CancelToken,
    ) -> Result<(Vec<Placement>, bool), PlaceError> {
        let results: Result<Vec<(Placement, bool)>, PlaceError> = tasks
            .par_iter()
            .map(|task| {
                if cancel.is_cancelled() {
                    return Err(PlaceError::Cancelled);
                }
                let mut rng = StdRng::seed_from_u64(task.seed);
                let mut placer = DetailedPlacer::new(device, task)?;
                let timed_out = placer.run(&mut rng, deadline, cancel)?;
                Ok((placer.realize(), timed_out))
            })
            .collect();
        let results = results?;
        let timed_out = results.iter().any(|(_, t)| *t);
        Ok((results.into_iter().map(|(p, _)| p).collect(), timed_out))
    }
}
