//! The Tessera placement core.
//!
//! Given a packed netlist, a device grid, pre-fixed I/O positions, and the
//! caller-supplied block embeddings, [`place`] assigns every remaining block
//! to a legal cell while minimizing half-perimeter wirelength (HPWL).
//!
//! # Pipeline
//!
//! 1. **Seed** — I/O blocks take fixed perimeter cells
//! 2. **Cluster** — k-means over the netlist embeddings
//! 3. **Global** — annealed cluster-box packing, squeezed to concrete cells
//! 4. **Detail** — per-cluster simulated annealing, one parallel task each
//! 5. **Refine** — one more SA pass over the full placement
//! 6. **Fold** — registers co-locate with their driving PEs (CGRA only)
//!
//! Embeddings come from an external trainer fed with the walk corpus of
//! [`walk::generate_walks`]; the core defines the corpus format only.
//!
//! # Usage
//!
//! ```ignore
//! use tessera_place::{place, PlaceOptions};
//!
//! let placement = place(&netlist, &embeddings, &device, &fixed, &options)?;
//! let text = tessera_place::output::placement_to_string(&placement, None);
//! ```

#![warn(missing_docs)]

pub mod alias;
pub mod anneal;
pub mod cluster;
pub mod cost;
pub mod data;
pub mod detail;
pub mod error;
pub mod global;
pub mod graph;
pub mod options;
pub mod output;
pub mod refine;
pub mod seeder;
pub mod walk;

use std::collections::{BTreeMap, BTreeSet};
use tessera_arch::Device;
use tessera_common::{derive_seed, BlockId, BlockKind, CancelToken, Position};

pub use data::{
    fold_pairs, reduce_cluster_graph, ClusterCells, Clusters, EmbeddingMap, FixedPositions, Net,
    Netlist, Pin, Placement,
};
pub use error::PlaceError;
pub use options::PlaceOptions;
pub use walk::WalkParams;

use crate::detail::{LocalExecutor, TaskExecutor};
use crate::global::ClusterPlacer;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Places every block of the netlist onto the device.
///
/// Fixed positions are preserved bit-identical; every other block ends on a
/// cell legal for its type, one block per cell (registers may share their
/// driver PE's cell when folding is enabled). The result is deterministic
/// for a given seed, independent of the worker count.
pub fn place(
    netlist: &Netlist,
    embeddings: &EmbeddingMap,
    device: &Device,
    fixed: &FixedPositions,
    options: &PlaceOptions,
) -> Result<Placement, PlaceError> {
    place_with_cancel(netlist, embeddings, device, fixed, options, &CancelToken::new())
}

/// [`place`] with a caller-held cancellation token.
pub fn place_with_cancel(
    netlist: &Netlist,
    embeddings: &EmbeddingMap,
    device: &Device,
    fixed: &FixedPositions,
    options: &PlaceOptions,
    cancel: &CancelToken,
) -> Result<Placement, PlaceError> {
    options.validate()?;
    match options.workers {
        Some(workers) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| PlaceError::Internal(format!("failed to build worker pool: {e}")))?;
            pool.install(|| place_inner(netlist, embeddings, device, fixed, options, cancel))
        }
        None => place_inner(netlist, embeddings, device, fixed, options, cancel),
    }
}

fn place_inner(
    netlist: &Netlist,
    embeddings: &EmbeddingMap,
    device: &Device,
    fixed: &FixedPositions,
    options: &PlaceOptions,
    cancel: &CancelToken,
) -> Result<Placement, PlaceError> {
    netlist.validate()?;
    validate_fixed(device, fixed)?;
    let fold_reg = options.effective_fold_reg();
    let mut folded = if fold_reg {
        data::fold_pairs(netlist, device)
    } else {
        BTreeMap::new()
    };
    // a pinned register keeps its pin; it never folds
    folded.retain(|reg, _| !fixed.contains_key(reg));

    // the block universe: everything the netlist, the embeddings, or the
    // fixed table mentions
    let mut universe: BTreeSet<BlockId> = netlist.blocks();
    universe.extend(embeddings.keys().copied());
    universe.extend(fixed.keys().copied());
    for block in &universe {
        if block.is_pseudo() {
            return Err(PlaceError::InvalidInput(format!(
                "input references cluster pseudo-block {block}"
            )));
        }
    }
    check_capacity(device, &universe, fixed, &folded)?;

    // I/O seeding: pads not already fixed take perimeter cells
    let mut anchored = fixed.clone();
    let io_blocks: BTreeSet<BlockId> = universe
        .iter()
        .copied()
        .filter(|b| b.kind == BlockKind::Io && !fixed.contains_key(b))
        .collect();
    seeder::seed_io_blocks(netlist, &io_blocks, device, &mut anchored)?;

    // everything left is clustered by embedding; foldable registers take
    // their driver's cell at the end instead of a slot of their own, so they
    // stay out of clustering and every downstream cell accounting
    let clusterable: BTreeSet<BlockId> = universe
        .iter()
        .copied()
        .filter(|b| {
            b.kind != BlockKind::Io && !anchored.contains_key(b) && !folded.contains_key(b)
        })
        .collect();
    if clusterable.is_empty() {
        let mut placement = anchored;
        if fold_reg {
            for (reg, pe) in &folded {
                if let Some(&pos) = placement.get(pe) {
                    placement.insert(*reg, pos);
                }
            }
        }
        audit(device, &placement, &universe, fixed, &folded, fold_reg)?;
        return Ok(placement);
    }
    let mut clusterable_emb = EmbeddingMap::new();
    for block in &clusterable {
        let vector = embeddings.get(block).ok_or_else(|| {
            PlaceError::InvalidInput(format!("block {block} has no embedding"))
        })?;
        clusterable_emb.insert(*block, vector.clone());
    }

    let base_k = options
        .num_clusters
        .unwrap_or_else(|| cluster::default_num_clusters(clusterable.len(), options.is_fpga))
        .clamp(1, clusterable.len());

    // global placement, retrying with an adjusted cluster count when the
    // anchor packing fails
    let mut timed_out = false;
    let mut attempted: BTreeSet<usize> = BTreeSet::new();
    let mut last_err = PlaceError::ClusterCapacity {
        num_clusters: base_k,
    };
    let mut global_result = None;
    for delta in [0i64, 1, -1] {
        let k = base_k as i64 + delta;
        if k < 1 || k > clusterable.len() as i64 || !attempted.insert(k as usize) {
            continue;
        }
        let k = k as usize;
        log::info!("global placement attempt with {k} clusters");
        let clusters = cluster::cluster_embeddings(&clusterable_emb, &anchored, k, options.seed)?;
        let mut rng = StdRng::seed_from_u64(derive_seed(options.seed, "global", k as u64));
        let mut placer = match ClusterPlacer::new(
            device,
            &clusters,
            netlist,
            &anchored,
            options.place_factor,
            options.squeeze_iter,
            &mut rng,
        ) {
            Ok(placer) => placer,
            Err(err @ PlaceError::ClusterCapacity { .. }) => {
                last_err = err;
                continue;
            }
            Err(err) => return Err(err),
        };
        let outcome = placer.run(&mut rng, options.phase_deadline(), cancel)?;
        match placer.squeeze() {
            Ok((cells, centroids)) => {
                timed_out |= outcome.timed_out;
                global_result = Some((clusters, cells, centroids));
                break;
            }
            Err(err @ PlaceError::ClusterCapacity { .. }) => {
                last_err = err;
                continue;
            }
            Err(err) => return Err(err),
        }
    }
    let Some((clusters, cluster_cells, centroids)) = global_result else {
        return Err(last_err);
    };

    // detailed placement, one task per cluster
    let tasks = detail::build_tasks(
        netlist,
        &clusters,
        &cluster_cells,
        &centroids,
        &anchored,
        options.seed,
    );
    let (parts, detail_timed) =
        LocalExecutor.execute(device, &tasks, options.phase_deadline(), cancel)?;
    timed_out |= detail_timed;

    let mut placement = anchored.clone();
    for part in parts {
        placement.extend(part);
    }

    // global refinement over the full netlist
    timed_out |= refine::refine_placement(
        device,
        netlist,
        &mut placement,
        &anchored,
        options.seed,
        options.aggressive_refine,
        options.phase_deadline(),
        cancel,
    )?;

    // folded registers were held out of the pipeline; each now takes its
    // driving PE's final cell
    if fold_reg {
        for (reg, pe) in &folded {
            if let Some(&pos) = placement.get(pe) {
                placement.insert(*reg, pos);
            }
        }
    }

    audit(device, &placement, &universe, fixed, &folded, fold_reg)?;
    if timed_out {
        return Err(PlaceError::TimedOut {
            partial: Box::new(placement),
        });
    }
    Ok(placement)
}

fn validate_fixed(device: &Device, fixed: &FixedPositions) -> Result<(), PlaceError> {
    for (block, &pos) in fixed {
        if block.is_pseudo() {
            return Err(PlaceError::InvalidInput(format!(
                "fixed table references cluster pseudo-block {block}"
            )));
        }
        if !device.is_cell_legal(pos, block.kind) {
            return Err(PlaceError::InvalidInput(format!(
                "fixed block {block} pinned to illegal cell {pos}"
            )));
        }
    }
    Ok(())
}

/// Rejects inputs with more blocks of some type than legal cells.
fn check_capacity(
    device: &Device,
    universe: &BTreeSet<BlockId>,
    fixed: &FixedPositions,
    folded: &BTreeMap<BlockId, BlockId>,
) -> Result<(), PlaceError> {
    let fixed_cells: BTreeSet<Position> = fixed.values().copied().collect();
    let mut demand: BTreeMap<BlockKind, usize> = BTreeMap::new();
    for block in universe {
        if fixed.contains_key(block) || folded.contains_key(block) {
            continue;
        }
        if let Some(required) = device.required_cell(block.kind) {
            *demand.entry(required).or_insert(0) += 1;
        }
    }
    for (kind, needed) in demand {
        let supply = device
            .legal_cells(kind)
            .into_iter()
            .filter(|pos| !fixed_cells.contains(pos))
            .count();
        if needed > supply {
            return Err(PlaceError::DeviceCapacity(format!(
                "{needed} blocks need {kind:?} cells, device has {supply}"
            )));
        }
    }
    Ok(())
}

/// Verifies the end-of-pipeline invariants: completeness, legality, fixity,
/// and one block per cell (modulo folded register/PE pairs).
fn audit(
    device: &Device,
    placement: &Placement,
    universe: &BTreeSet<BlockId>,
    fixed: &FixedPositions,
    folded: &BTreeMap<BlockId, BlockId>,
    fold_reg: bool,
) -> Result<(), PlaceError> {
    for block in universe {
        if !placement.contains_key(block) {
            return Err(PlaceError::Internal(format!("block {block} was not placed")));
        }
    }
    for (block, &pos) in placement {
        if block.is_pseudo() {
            return Err(PlaceError::Internal(format!(
                "pseudo-block {block} leaked into the placement"
            )));
        }
        if !device.is_cell_legal(pos, block.kind) {
            return Err(PlaceError::Internal(format!(
                "block {block} placed on illegal cell {pos}"
            )));
        }
    }
    for (block, &pos) in fixed {
        if placement.get(block) != Some(&pos) {
            return Err(PlaceError::Internal(format!(
                "fixed block {block} moved away from {pos}"
            )));
        }
    }

    let mut by_cell: BTreeMap<Position, Vec<BlockId>> = BTreeMap::new();
    for (&block, &pos) in placement {
        by_cell.entry(pos).or_default().push(block);
    }
    for (pos, blocks) in by_cell {
        if blocks.len() == 1 {
            continue;
        }
        let fold_pair_ok = fold_reg
            && blocks.len() == 2
            && blocks.iter().any(|b| {
                b.kind == BlockKind::Reg
                    && folded.get(b).is_some_and(|pe| blocks.contains(pe))
            });
        if !fold_pair_ok {
            return Err(PlaceError::Internal(format!(
                "cell {pos} hosts {} blocks",
                blocks.len()
            )));
        }
    }
    Ok(())
}
