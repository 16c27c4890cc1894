//! Global refinement: one more SA pass over the full placement.
//!
//! After per-cluster placement, every CLB-kind, non-fixed block is freed onto
//! the whole CLB fabric and annealed against the full netlist (no cluster
//! reduction). The state is keyed by position so blocks can both swap and
//! relocate into empty cells. I/O, memory, and generic blocks stay where the
//! earlier phases put them.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet};
use tessera_arch::Device;
use tessera_common::{derive_seed, BlockId, BlockKind, CancelToken, Position};

use crate::anneal::{anneal, refine, Annealer, Deadline, Schedule};
use crate::cost::total_hpwl;
use crate::data::{FixedPositions, Netlist, Placement};
use crate::error::PlaceError;

/// Block kinds the refiner never moves, on top of fixed blocks.
const EXCLUDED_KINDS: [BlockKind; 3] = [BlockKind::Io, BlockKind::Mem, BlockKind::Gen];

/// Temperature of the near-greedy refinement pass.
const REFINE_TEMPERATURE: f64 = 0.01;

/// The board-level annealer over the full placement.
pub struct BoardRefiner<'d> {
    device: &'d Device,
    netlist: &'d Netlist,
    state: BTreeMap<Position, BlockId>,
    context: Placement,
    available: Vec<Position>,
    undo: Option<Undo>,
    best: BTreeMap<Position, BlockId>,
}

enum Undo {
    Swap(Position, Position),
    Relocate { from: Position, to: Position },
}

impl<'d> BoardRefiner<'d> {
    /// Splits the placement into movable state and immovable context, and
    /// collects the free CLB cells the movable blocks may roam over.
    pub fn new(
        device: &'d Device,
        netlist: &'d Netlist,
        placement: &Placement,
        fixed: &FixedPositions,
    ) -> Result<Self, PlaceError> {
        let mut state: BTreeMap<Position, BlockId> = BTreeMap::new();
        let mut context = Placement::new();
        for (&block, &pos) in placement {
            let movable = !fixed.contains_key(&block)
                && !block.is_pseudo()
                && !EXCLUDED_KINDS.contains(&block.kind);
            if movable {
                if let Some(previous) = state.insert(pos, block) {
                    return Err(PlaceError::Internal(format!(
                        "blocks {previous} and {block} share cell {pos} before refinement"
                    )));
                }
            } else {
                context.insert(block, pos);
            }
        }

        let blocked: BTreeSet<Position> = context.values().copied().collect();
        let available: Vec<Position> = device
            .legal_cells(device.clb_type())
            .into_iter()
            .filter(|pos| device.in_core(*pos) && !blocked.contains(pos))
            .collect();
        if available.len() < state.len() {
            return Err(PlaceError::Internal(format!(
                "{} movable blocks but only {} free cells",
                state.len(),
                available.len()
            )));
        }
        let best = state.clone();
        Ok(Self {
            device,
            netlist,
            state,
            context,
            available,
            undo: None,
            best,
        })
    }

    /// Number of movable blocks.
    pub fn movable_count(&self) -> usize {
        self.state.len()
    }

    /// The refined positions: context plus the annealed state.
    pub fn into_positions(self) -> Placement {
        let mut placement = self.context;
        for (pos, block) in self.state {
            placement.insert(block, pos);
        }
        placement
    }
}

impl Annealer for BoardRefiner<'_> {
    fn propose(&mut self, rng: &mut StdRng) -> bool {
        self.undo = None;
        if self.available.len() < 2 {
            return false;
        }
        let i = rng.gen_range(0..self.available.len());
        let mut j = rng.gen_range(0..self.available.len());
        while j == i {
            j = rng.gen_range(0..self.available.len());
        }
        let pos1 = self.available[i];
        let pos2 = self.available[j];

        match (self.state.get(&pos1).copied(), self.state.get(&pos2).copied()) {
            (Some(blk1), Some(blk2)) => {
                if self.device.is_cell_legal(pos2, blk1.kind)
                    && self.device.is_cell_legal(pos1, blk2.kind)
                {
                    self.state.insert(pos1, blk2);
                    self.state.insert(pos2, blk1);
                    self.undo = Some(Undo::Swap(pos1, pos2));
                    return true;
                }
                false
            }
            (Some(blk1), None) => {
                if self.device.is_cell_legal(pos2, blk1.kind) {
                    self.state.remove(&pos1);
                    self.state.insert(pos2, blk1);
                    self.undo = Some(Undo::Relocate {
                        from: pos1,
                        to: pos2,
                    });
                    return true;
                }
                false
            }
            (None, Some(blk2)) => {
                if self.device.is_cell_legal(pos1, blk2.kind) {
                    self.state.remove(&pos2);
                    self.state.insert(pos1, blk2);
                    self.undo = Some(Undo::Relocate {
                        from: pos2,
                        to: pos1,
                    });
                    return true;
                }
                false
            }
            (None, None) => false,
        }
    }

    fn revert(&mut self) {
        match self.undo.take() {
            Some(Undo::Swap(pos1, pos2)) => {
                let blk1 = self.state[&pos1];
                let blk2 = self.state[&pos2];
                self.state.insert(pos1, blk2);
                self.state.insert(pos2, blk1);
            }
            Some(Undo::Relocate { from, to }) => {
                if let Some(block) = self.state.remove(&to) {
                    self.state.insert(from, block);
                }
            }
            None => {}
        }
    }

    fn energy(&self) -> f64 {
        let mut positions = self.context.clone();
        for (&pos, &block) in &self.state {
            positions.insert(block, pos);
        }
        total_hpwl(self.netlist, &positions)
    }

    fn save_best(&mut self) {
        self.best = self.state.clone();
    }

    fn load_best(&mut self) {
        self.state = self.best.clone();
    }
}

/// Runs the global refinement pass in place.
///
/// Step count scales as `10 * n^1.33` over the placement size. Setting the
/// `TRAVIS` environment variable skips the pass (CI carve-out). Returns
/// whether the pass hit its deadline.
pub fn refine_placement(
    device: &Device,
    netlist: &Netlist,
    placement: &mut Placement,
    fixed: &FixedPositions,
    seed: u64,
    aggressive: bool,
    deadline: Deadline,
    cancel: &CancelToken,
) -> Result<bool, PlaceError> {
    if std::env::var_os("TRAVIS").is_some() {
        log::info!("TRAVIS is set, skipping global refinement");
        return Ok(false);
    }
    let mut refiner = BoardRefiner::new(device, netlist, placement, fixed)?;
    if refiner.movable_count() < 2 {
        return Ok(false);
    }

    let steps = (10.0 * (placement.len() as f64).powf(1.33)).ceil() as u64;
    let mut rng = StdRng::seed_from_u64(derive_seed(seed, "refine", 0));
    let outcome = if aggressive {
        let schedule = Schedule::calibrate(&mut refiner, steps, &mut rng).aggressive();
        anneal(&mut refiner, &schedule, &mut rng, deadline, cancel)?
    } else {
        refine(
            &mut refiner,
            steps,
            REFINE_TEMPERATURE,
            &mut rng,
            deadline,
            cancel,
        )?
    };
    log::debug!(
        "global refinement over {} blocks finished at hpwl {:.0}",
        placement.len(),
        outcome.best_energy
    );

    *placement = refiner.into_positions();
    Ok(outcome.timed_out)
}
