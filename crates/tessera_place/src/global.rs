//! Global placement: annealed cluster-box packing and the squeeze.
//!
//! Each cluster is modeled as a square box of side `ceil(sqrt(|cluster|))`.
//! Boxes are row-packed inside the board margin, annealed against the
//! cluster-reduced netlist with each box's centroid standing in for its
//! blocks, and finally *squeezed*: boxes materialize into concrete cell sets
//! via a zig-zag fill, overlapping cells are pushed into exterior cells
//! (center-first), and a few compaction passes pull every cluster toward the
//! board center.

use rand::rngs::StdRng;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use tessera_arch::Device;
use tessera_common::{manhattan_distance, BlockId, BlockKind, CancelToken, ClusterId, Position};

use crate::anneal::{anneal, AnnealOutcome, Annealer, Deadline, Schedule};
use crate::cost::total_hpwl;
use crate::data::{reduce_cluster_graph, ClusterCells, Clusters, FixedPositions, Netlist};
use crate::error::PlaceError;

/// Maximum cell moves per cluster in one compaction pass.
const MAX_COMPACTION_MOVES: u32 = 15;
/// De-overlap attempts per cluster before falling back to `find_space`.
const MAX_DEOVERLAP_EFFORT: u32 = 5;

type Board = Vec<Vec<bool>>;

fn occupied(board: &Board, pos: Position) -> bool {
    board[pos.y as usize][pos.x as usize]
}

/// The annealed cluster-box placer.
#[derive(Debug)]
pub struct ClusterPlacer<'a> {
    device: &'a Device,
    clusters: &'a Clusters,
    reduced: Netlist,
    fixed: &'a FixedPositions,
    place_factor: u32,
    squeeze_iter: u32,
    square_sizes: BTreeMap<ClusterId, u32>,
    state: BTreeMap<ClusterId, Position>,
    undo: Option<Undo>,
    best: BTreeMap<ClusterId, Position>,
    center: Position,
}

#[derive(Debug)]
enum Undo {
    Swap(ClusterId, ClusterId),
    Jitter(ClusterId, Position),
}

impl<'a> ClusterPlacer<'a> {
    /// Builds the placer and row-packs an initial legal anchor per cluster.
    ///
    /// Fails with [`PlaceError::ClusterCapacity`] when some cluster has no
    /// legal anchor anywhere on the board.
    pub fn new(
        device: &'a Device,
        clusters: &'a Clusters,
        netlist: &Netlist,
        fixed: &'a FixedPositions,
        place_factor: u32,
        squeeze_iter: u32,
        rng: &mut StdRng,
    ) -> Result<Self, PlaceError> {
        let square_sizes = clusters
            .iter()
            .map(|(&cid, members)| {
                (cid, (members.len() as f64).sqrt().ceil().max(1.0) as u32)
            })
            .collect();
        let mut placer = Self {
            device,
            clusters,
            reduced: reduce_cluster_graph(netlist, clusters, fixed, None),
            fixed,
            place_factor,
            squeeze_iter,
            square_sizes,
            state: BTreeMap::new(),
            undo: None,
            best: BTreeMap::new(),
            center: device.center(),
        };
        placer.init_placement(rng)?;
        placer.best = placer.state.clone();
        Ok(placer)
    }

    /// The box span at `pos`: columns are scanned rightward, skipping cells
    /// that are not CLB-legal, until `square` usable columns accumulate.
    /// Returns `(span_x, square)` or `None` when the scan runs off the board.
    fn compute_bbox(&self, pos: Position, square: u32) -> Option<(u32, u32)> {
        let clb = self.device.clb_type();
        let mut width = 0u32;
        let mut search = 0u32;
        while width < square {
            let x = pos.x + search;
            if x >= self.device.width() {
                return None;
            }
            if !self.device.is_cell_legal(Position::new(x, pos.y), clb) {
                search += 1;
                continue;
            }
            width += 1;
            search += 1;
        }
        Some((search, square))
    }

    fn overlap_area(pos1: Position, bbox1: (u32, u32), pos2: Position, bbox2: (u32, u32)) -> u64 {
        let x = if pos2.x >= pos1.x {
            i64::from(pos1.x) + i64::from(bbox1.0) - i64::from(pos2.x)
        } else {
            i64::from(pos2.x) + i64::from(bbox2.0) - i64::from(pos1.x)
        };
        let y = if pos2.y >= pos1.y {
            i64::from(pos1.y) + i64::from(bbox1.1) - i64::from(pos2.y)
        } else {
            i64::from(pos2.y) + i64::from(bbox2.1) - i64::from(pos1.y)
        };
        if x <= 0 || y <= 0 {
            0
        } else {
            (x * y) as u64
        }
    }

    /// Anchor legality: the box stays inside `[margin, dim - margin)` and its
    /// pairwise overlap with the other boxes totals at most
    /// `|cluster| / place_factor` cells.
    ///
    /// `cid`'s own entry in the current state is ignored, so the check works
    /// both for hypothetical moves and during initial packing.
    fn anchor_legal(&self, pos: Position, cid: ClusterId) -> bool {
        let margin = self.device.margin();
        if pos.x < margin || pos.y < margin {
            return false;
        }
        let Some(bbox1) = self.compute_bbox(pos, self.square_sizes[&cid]) else {
            return false;
        };
        // the box's last cell is anchor + span - 1, so the box may end flush
        // with the margin boundary
        let xx = pos.x + bbox1.0;
        let yy = pos.y + bbox1.1;
        if xx > self.device.width() - margin || yy > self.device.height() - margin {
            return false;
        }
        let budget = (self.clusters[&cid].len() as u64) / u64::from(self.place_factor);
        let mut overlap = 0u64;
        for (&other, &pos2) in &self.state {
            if other == cid {
                continue;
            }
            let Some(bbox2) = self.compute_bbox(pos2, self.square_sizes[&other]) else {
                return false;
            };
            overlap += Self::overlap_area(pos, bbox1, pos2, bbox2);
            if overlap > budget {
                return false;
            }
        }
        true
    }

    /// Left-to-right row packing with a random horizontal stride.
    fn init_placement(&mut self, rng: &mut StdRng) -> Result<(), PlaceError> {
        let margin = self.device.margin();
        let initial_x = margin;
        let mut x = initial_x;
        let mut rows: Vec<u32> = Vec::new();
        let mut current_rows: Vec<u32> = Vec::new();
        let mut col = 0usize;

        let ids: Vec<ClusterId> = self.clusters.keys().copied().collect();
        for cid in ids {
            let square = self.square_sizes[&cid];
            let mut visited: BTreeSet<Position> = BTreeSet::new();
            loop {
                if x >= self.device.width() {
                    x = initial_x;
                    rows = std::mem::take(&mut current_rows);
                    col = 0;
                }
                let y = if rows.is_empty() {
                    margin
                } else if col < rows.len() {
                    rows[col]
                } else {
                    rows[rows.len() - 1]
                };
                let pos = Position::new(x, y);
                if !visited.insert(pos) {
                    // wrapped around the whole board without a legal anchor
                    return Err(PlaceError::ClusterCapacity {
                        num_clusters: self.clusters.len(),
                    });
                }
                if self.anchor_legal(pos, cid) {
                    self.state.insert(cid, pos);
                    x += rng.gen_range(square..square + 3);
                    current_rows.push(square + y);
                    col += 1;
                    break;
                }
                x += 1;
            }
        }
        Ok(())
    }

    /// The current anchor positions, keyed by cluster.
    pub fn anchors(&self) -> &BTreeMap<ClusterId, Position> {
        &self.state
    }

    /// Box centers for the current anchors, used as pseudo-block positions.
    pub fn box_centers(&self) -> Result<BTreeMap<ClusterId, Position>, PlaceError> {
        let mut centers = BTreeMap::new();
        for (&cid, &pos) in &self.state {
            let bbox = self
                .compute_bbox(pos, self.square_sizes[&cid])
                .ok_or_else(|| {
                    PlaceError::Internal(format!("cluster {cid} anchor {pos} has no bounding box"))
                })?;
            centers.insert(cid, Position::new(pos.x + bbox.0 / 2, pos.y + bbox.1 / 2));
        }
        Ok(centers)
    }

    /// Calibrates a schedule and anneals the anchor assignment.
    pub fn run(
        &mut self,
        rng: &mut StdRng,
        deadline: Deadline,
        cancel: &CancelToken,
    ) -> Result<AnnealOutcome, PlaceError> {
        let steps = (200 * self.clusters.len() as u64).max(1_000);
        let schedule = Schedule::calibrate(self, steps, rng);
        log::debug!(
            "global placement: {} clusters, tmax {:.2}, {} steps",
            self.clusters.len(),
            schedule.tmax,
            schedule.steps
        );
        anneal(self, &schedule, rng, deadline, cancel)
    }

    // --- squeeze -----------------------------------------------------------

    fn build_board(
        &self,
        cells: &ClusterCells,
        fixed_cells: &BTreeSet<Position>,
        check: bool,
    ) -> Result<Board, PlaceError> {
        let mut board =
            vec![vec![false; self.device.width() as usize]; self.device.height() as usize];
        for (cid, set) in cells {
            for pos in set {
                let slot = &mut board[pos.y as usize][pos.x as usize];
                if check && *slot {
                    return Err(PlaceError::Internal(format!(
                        "cluster {cid} cell {pos} is assigned twice"
                    )));
                }
                *slot = true;
            }
        }
        for pos in fixed_cells {
            if pos.y < self.device.height() && pos.x < self.device.width() {
                board[pos.y as usize][pos.x as usize] = true;
            }
        }
        Ok(board)
    }

    /// Free, CLB-legal core cells within `max_dist` Manhattan of the
    /// cluster's current footprint.
    fn exterior_set(
        &self,
        own: &BTreeSet<Position>,
        board: &Board,
        max_dist: i64,
    ) -> BTreeSet<Position> {
        let clb = self.device.clb_type();
        let mut result = BTreeSet::new();
        for &cell in own {
            for di in -max_dist..=max_dist {
                for dj in -max_dist..=max_dist {
                    if di.abs() + dj.abs() > max_dist {
                        continue;
                    }
                    let Some(p) = cell.offset(dj, di) else {
                        continue;
                    };
                    if p.x >= self.device.width() || p.y >= self.device.height() {
                        continue;
                    }
                    if !self.device.in_core(p)
                        || !self.device.is_cell_legal(p, clb)
                        || occupied(board, p)
                    {
                        continue;
                    }
                    result.insert(p);
                }
            }
        }
        result
    }

    /// Pushes `overlap` cells of `cid` into its exterior, center-first.
    fn deoverlap(
        &self,
        cells: &mut ClusterCells,
        cid: ClusterId,
        overlap: &mut BTreeSet<Position>,
        fixed_cells: &BTreeSet<Position>,
    ) -> Result<(), PlaceError> {
        let mut effort = 0u32;
        let mut last_len = overlap.len();
        while !overlap.is_empty() && effort < MAX_DEOVERLAP_EFFORT {
            let board = self.build_board(cells, fixed_cells, false)?;
            let mut ext: Vec<Position> = self
                .exterior_set(&cells[&cid], &board, 1)
                .into_iter()
                .collect();
            ext.sort_by_key(|p| (manhattan_distance(*p, self.center), p.x, p.y));
            for e in ext {
                let Some(cell) = overlap.pop_first() else {
                    break;
                };
                let set = cells
                    .get_mut(&cid)
                    .ok_or_else(|| PlaceError::Internal(format!("unknown cluster {cid}")))?;
                set.remove(&cell);
                set.insert(e);
            }
            if overlap.len() == last_len {
                effort += 1;
            } else {
                effort = 0;
            }
            last_len = overlap.len();
        }
        Ok(())
    }

    /// Scans for a free rectangle from the bottom-right corner upward;
    /// falls back to any free legal cells.
    fn find_space(&self, board: &Board, num: usize) -> Result<BTreeSet<Position>, PlaceError> {
        let clb = self.device.clb_type();
        let w = self.device.width();
        let h = self.device.height();
        let square = (num as f64).sqrt().ceil() as u32;

        if h > square && w > square {
            for i in (0..=h - square - 1).rev() {
                for j in (0..=w - square - 1).rev() {
                    let pos = Position::new(j, i);
                    let Some(bbox) = self.compute_bbox(pos, square) else {
                        continue;
                    };
                    let mut found: Vec<Position> = Vec::new();
                    for y in 0..bbox.1 {
                        for x in 0..bbox.0 {
                            let cell = Position::new(j + x, i + y);
                            if cell.x >= w || cell.y >= h {
                                continue;
                            }
                            if !occupied(board, cell)
                                && self.device.in_core(cell)
                                && self.device.is_cell_legal(cell, clb)
                            {
                                found.push(cell);
                            }
                        }
                    }
                    if found.len() > num {
                        return Ok(found.into_iter().take(num).collect());
                    }
                }
            }
        }

        let mut result = BTreeSet::new();
        for y in 0..h {
            for x in 0..w {
                let pos = Position::new(x, y);
                if !occupied(board, pos)
                    && self.device.in_core(pos)
                    && self.device.is_cell_legal(pos, clb)
                {
                    result.insert(pos);
                    if result.len() == num {
                        return Ok(result);
                    }
                }
            }
        }
        Err(PlaceError::DeviceCapacity(
            "no free cells left for overlap resolution".to_string(),
        ))
    }

    /// One compaction pass: swap up to 15 own cells for exterior cells
    /// strictly closer to the board center. Returns the move count.
    fn squeeze_cluster(
        &self,
        cells: &mut ClusterCells,
        cid: ClusterId,
        fixed_cells: &BTreeSet<Position>,
    ) -> Result<u32, PlaceError> {
        let board = self.build_board(cells, fixed_cells, true)?;
        let mut ext: Vec<Position> = self
            .exterior_set(&cells[&cid], &board, 1)
            .into_iter()
            .collect();
        ext.sort_by_key(|p| (manhattan_distance(*p, self.center), p.x, p.y));
        let mut own: Vec<Position> = cells[&cid].iter().copied().collect();
        own.sort_by_key(|p| (std::cmp::Reverse(manhattan_distance(*p, self.center)), p.x, p.y));

        let set = cells
            .get_mut(&cid)
            .ok_or_else(|| PlaceError::Internal(format!("unknown cluster {cid}")))?;
        let mut moves = 0u32;
        for (new_cell, old_cell) in ext.into_iter().zip(own) {
            if moves > MAX_COMPACTION_MOVES {
                break;
            }
            moves += 1;
            if manhattan_distance(new_cell, self.center) >= manhattan_distance(old_cell, self.center)
            {
                break;
            }
            set.remove(&old_cell);
            set.insert(new_cell);
        }
        Ok(moves)
    }

    /// Materializes `cluster_cells` from the annealed anchors.
    ///
    /// Returns the disjoint cell sets and the cluster centroids. Each cluster
    /// receives exactly `|cluster|` cells, CLB demand through the zig-zag
    /// fill and special-kind demand (memory blocks inside a cluster) from the
    /// nearest free legal cells of that kind.
    pub fn squeeze(
        &self,
    ) -> Result<(ClusterCells, BTreeMap<ClusterId, Position>), PlaceError> {
        let clb = self.device.clb_type();
        let fixed_cells: BTreeSet<Position> = self.fixed.values().copied().collect();
        let box_centers = self.box_centers()?;
        let mut cluster_cells = ClusterCells::new();

        // zig-zag fill toward the box corner nearest the board center
        for (&cid, members) in self.clusters {
            let n_clb = members.iter().filter(|b| b.kind.is_clb()).count();
            let pos = self.state[&cid];
            let bbox = self
                .compute_bbox(pos, self.square_sizes[&cid])
                .ok_or_else(|| {
                    PlaceError::Internal(format!("cluster {cid} anchor {pos} has no bounding box"))
                })?;
            let corners = [
                Position::new(pos.x, pos.y),
                Position::new(pos.x + bbox.0, pos.y),
                Position::new(pos.x + bbox.0, pos.y + bbox.1),
                Position::new(pos.x, pos.y + bbox.1),
            ];
            let corner = corners
                .into_iter()
                .min_by_key(|c| manhattan_distance(*c, self.center))
                .unwrap_or(pos);

            let mut order: Vec<(u32, u32)> = (0..bbox.0)
                .flat_map(|dx| (0..bbox.1).map(move |dy| (dx, dy)))
                .collect();
            order.sort_by_key(|&(dx, dy)| {
                manhattan_distance(Position::new(pos.x + dx, pos.y + dy), corner)
            });

            let mut cells: BTreeSet<Position> = BTreeSet::new();
            for (dx, dy) in order {
                if cells.len() >= n_clb {
                    break;
                }
                let cell = Position::new(pos.x + dx, pos.y + dy);
                if !self.device.is_cell_legal(cell, clb) || fixed_cells.contains(&cell) {
                    continue;
                }
                cells.insert(cell);
            }
            if cells.len() < n_clb {
                return Err(PlaceError::ClusterCapacity {
                    num_clusters: self.clusters.len(),
                });
            }
            cluster_cells.insert(cid, cells);
        }

        // de-overlap, innermost clusters first
        let mut order: Vec<ClusterId> = self.state.keys().copied().collect();
        order.sort_by_key(|cid| (manhattan_distance(self.state[cid], self.center), cid.0));
        let mut special_set: BTreeSet<ClusterId> = BTreeSet::new();
        for &cid in &order {
            let mut overlap: BTreeSet<Position> = BTreeSet::new();
            for (&other, other_cells) in &cluster_cells {
                if other == cid {
                    continue;
                }
                overlap.extend(cluster_cells[&cid].intersection(other_cells).copied());
            }
            if overlap.is_empty() {
                continue;
            }
            self.deoverlap(&mut cluster_cells, cid, &mut overlap, &fixed_cells)?;
            if !overlap.is_empty() {
                log::warn!(
                    "failed to de-overlap cluster {cid}, placing {} cells by scan",
                    overlap.len()
                );
                special_set.insert(cid);
                let board = self.build_board(&cluster_cells, &fixed_cells, false)?;
                let extra = self.find_space(&board, overlap.len())?;
                let set = cluster_cells
                    .get_mut(&cid)
                    .ok_or_else(|| PlaceError::Internal(format!("unknown cluster {cid}")))?;
                for cell in extra {
                    if let Some(old) = overlap.pop_first() {
                        set.remove(&old);
                    }
                    set.insert(cell);
                }
            }
        }
        // disjointness audit before compaction
        self.build_board(&cluster_cells, &fixed_cells, true)?;

        // compaction toward the board center
        for _ in 0..self.squeeze_iter {
            for &cid in &order {
                self.squeeze_cluster(&mut cluster_cells, cid, &fixed_cells)?;
            }
        }
        for &cid in &special_set {
            loop {
                let moves = self.squeeze_cluster(&mut cluster_cells, cid, &fixed_cells)?;
                if moves <= 5 {
                    break;
                }
            }
        }

        // special-kind demand takes the nearest free cells of its own kind
        let mut taken: BTreeSet<Position> = fixed_cells.clone();
        for set in cluster_cells.values() {
            taken.extend(set.iter().copied());
        }
        for &cid in &order {
            let mut demand: BTreeMap<BlockKind, usize> = BTreeMap::new();
            for block in &self.clusters[&cid] {
                if !block.kind.is_clb() {
                    *demand.entry(block.kind).or_insert(0) += 1;
                }
            }
            let anchor = box_centers.get(&cid).copied().unwrap_or(self.center);
            for (kind, count) in demand {
                let mut candidates: Vec<Position> = self
                    .device
                    .legal_cells(kind)
                    .into_iter()
                    .filter(|pos| !taken.contains(pos))
                    .collect();
                candidates.sort_by_key(|p| (manhattan_distance(*p, anchor), p.x, p.y));
                if candidates.len() < count {
                    return Err(PlaceError::DeviceCapacity(format!(
                        "cluster {cid} needs {count} {kind:?} cells, {} free",
                        candidates.len()
                    )));
                }
                let set = cluster_cells
                    .get_mut(&cid)
                    .ok_or_else(|| PlaceError::Internal(format!("unknown cluster {cid}")))?;
                for pos in candidates.into_iter().take(count) {
                    set.insert(pos);
                    taken.insert(pos);
                }
            }
        }

        // post-conditions: exact cardinality and a defined centroid
        let mut centroids = BTreeMap::new();
        for (&cid, members) in self.clusters {
            let cells = &cluster_cells[&cid];
            if cells.len() != members.len() {
                return Err(PlaceError::Internal(format!(
                    "cluster {cid} has {} cells for {} blocks",
                    cells.len(),
                    members.len()
                )));
            }
            let centroid = tessera_common::centroid(cells.iter()).ok_or_else(|| {
                PlaceError::Internal(format!("cluster {cid} squeezed to an empty cell set"))
            })?;
            centroids.insert(cid, centroid);
        }
        Ok((cluster_cells, centroids))
    }
}

impl Annealer for ClusterPlacer<'_> {
    fn propose(&mut self, rng: &mut StdRng) -> bool {
        self.undo = None;
        let ids: Vec<ClusterId> = self.state.keys().copied().collect();
        if ids.is_empty() {
            return false;
        }
        let a = ids[rng.gen_range(0..ids.len())];
        if ids.len() >= 2 {
            let mut b = ids[rng.gen_range(0..ids.len())];
            while b == a {
                b = ids[rng.gen_range(0..ids.len())];
            }
            let pos_a = self.state[&a];
            let pos_b = self.state[&b];
            // apply the swap, then check both placements in the swapped state
            self.state.insert(a, pos_b);
            self.state.insert(b, pos_a);
            if self.anchor_legal(pos_b, a) && self.anchor_legal(pos_a, b) {
                self.undo = Some(Undo::Swap(a, b));
                return true;
            }
            self.state.insert(a, pos_a);
            self.state.insert(b, pos_b);
        }

        // fall back to jittering the first cluster
        let pos_a = self.state[&a];
        let dx = rng.gen_range(-2i64..=2);
        let dy = rng.gen_range(-2i64..=2);
        if let Some(new_pos) = pos_a.offset(dx, dy) {
            self.state.insert(a, new_pos);
            if self.anchor_legal(new_pos, a) {
                self.undo = Some(Undo::Jitter(a, pos_a));
                return true;
            }
            self.state.insert(a, pos_a);
        }
        false
    }

    fn revert(&mut self) {
        match self.undo.take() {
            Some(Undo::Swap(a, b)) => {
                let pos_a = self.state[&a];
                let pos_b = self.state[&b];
                self.state.insert(a, pos_b);
                self.state.insert(b, pos_a);
            }
            Some(Undo::Jitter(a, old)) => {
                self.state.insert(a, old);
            }
            None => {}
        }
    }

    fn energy(&self) -> f64 {
        let mut positions = self.fixed.clone();
        for (&cid, &pos) in &self.state {
            let centroid = match self.compute_bbox(pos, self.square_sizes[&cid]) {
                Some(bbox) => Position::new(pos.x + bbox.0 / 2, pos.y + bbox.1 / 2),
                None => pos,
            };
            positions.insert(BlockId::cluster(cid), centroid);
        }
        total_hpwl(&self.reduced, &positions)
    }

    fn save_best(&mut self) {
        self.best = self.state.clone();
    }

    fn load_best(&mut self) {
        self.state = self.best.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Net, Pin};
    use rand::SeedableRng;
    use tessera_arch::{mock_cgra, mock_cgra_with_mem};
    use tessera_common::NetId;

    fn blk(s: &str) -> BlockId {
        s.parse().unwrap()
    }

    fn pe_clusters(sizes: &[usize]) -> Clusters {
        let mut clusters = Clusters::new();
        let mut index = 0u32;
        for (c, &size) in sizes.iter().enumerate() {
            let members: BTreeSet<BlockId> = (0..size)
                .map(|_| {
                    let b = BlockId::new(BlockKind::Pe, index);
                    index += 1;
                    b
                })
                .collect();
            clusters.insert(ClusterId(c as u32), members);
        }
        clusters
    }

    fn bridge_netlist(clusters: &Clusters) -> Netlist {
        // one net chaining the first block of each cluster
        let mut nl = Netlist::new();
        let pins: Vec<Pin> = clusters
            .values()
            .filter_map(|m| m.iter().next())
            .map(|&b| Pin::new(b, "in"))
            .collect();
        if pins.len() >= 2 {
            nl.insert(NetId(0), Net::new(pins));
        }
        nl
    }

    #[test]
    fn initial_anchors_are_legal() {
        let device = mock_cgra(20);
        let clusters = pe_clusters(&[9, 9, 4]);
        let nl = bridge_netlist(&clusters);
        let fixed = FixedPositions::new();
        let mut rng = StdRng::seed_from_u64(0);
        let placer =
            ClusterPlacer::new(&device, &clusters, &nl, &fixed, 6, 4, &mut rng).unwrap();
        for (&cid, &pos) in placer.anchors() {
            assert!(placer.anchor_legal(pos, cid), "anchor {pos} illegal");
        }
    }

    #[test]
    fn tiny_board_overflows() {
        let device = mock_cgra(6);
        // 4 clusters of 9 blocks cannot fit a 4x4 core
        let clusters = pe_clusters(&[9, 9, 9, 9]);
        let nl = bridge_netlist(&clusters);
        let fixed = FixedPositions::new();
        let mut rng = StdRng::seed_from_u64(0);
        let err = ClusterPlacer::new(&device, &clusters, &nl, &fixed, 6, 4, &mut rng).unwrap_err();
        assert!(matches!(err, PlaceError::ClusterCapacity { num_clusters: 4 }));
    }

    #[test]
    fn propose_and_revert_restore_energy() {
        let device = mock_cgra(20);
        let clusters = pe_clusters(&[6, 6, 6]);
        let nl = bridge_netlist(&clusters);
        let fixed = FixedPositions::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut placer =
            ClusterPlacer::new(&device, &clusters, &nl, &fixed, 6, 4, &mut rng).unwrap();
        let before = placer.energy();
        for _ in 0..50 {
            if placer.propose(&mut rng) {
                placer.revert();
            }
            assert_eq!(placer.energy(), before);
        }
    }

    #[test]
    fn squeeze_postconditions() {
        let device = mock_cgra(20);
        let clusters = pe_clusters(&[10, 7, 5]);
        let nl = bridge_netlist(&clusters);
        let fixed = FixedPositions::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut placer =
            ClusterPlacer::new(&device, &clusters, &nl, &fixed, 6, 4, &mut rng).unwrap();
        placer
            .run(&mut rng, Deadline::none(), &CancelToken::new())
            .unwrap();
        let (cells, centroids) = placer.squeeze().unwrap();

        let mut seen: BTreeSet<Position> = BTreeSet::new();
        for (cid, members) in &clusters {
            let set = &cells[cid];
            assert_eq!(set.len(), members.len());
            for &pos in set {
                assert!(device.is_cell_legal(pos, BlockKind::Pe));
                assert!(seen.insert(pos), "cell {pos} assigned twice");
            }
            assert!(centroids.contains_key(cid));
        }
    }

    #[test]
    fn squeeze_serves_memory_demand() {
        let device = mock_cgra_with_mem(14);
        let mut clusters = pe_clusters(&[6]);
        clusters
            .get_mut(&ClusterId(0))
            .unwrap()
            .extend([blk("m0"), blk("m1")]);
        let nl = bridge_netlist(&clusters);
        let fixed = FixedPositions::new();
        let mut rng = StdRng::seed_from_u64(3);
        let placer =
            ClusterPlacer::new(&device, &clusters, &nl, &fixed, 6, 4, &mut rng).unwrap();
        let (cells, _) = placer.squeeze().unwrap();
        let set = &cells[&ClusterId(0)];
        assert_eq!(set.len(), 8);
        let mem_cells = set
            .iter()
            .filter(|p| device.is_cell_legal(**p, BlockKind::Mem))
            .count();
        assert_eq!(mem_cells, 2);
    }

    #[test]
    fn squeeze_avoids_fixed_cells() {
        let device = mock_cgra(12);
        let clusters = pe_clusters(&[9]);
        let nl = bridge_netlist(&clusters);
        let mut fixed = FixedPositions::new();
        // a fixed block parked in the middle of the core
        fixed.insert(blk("u0"), Position::new(5, 5));
        let mut rng = StdRng::seed_from_u64(4);
        let placer =
            ClusterPlacer::new(&device, &clusters, &nl, &fixed, 6, 4, &mut rng).unwrap();
        let (cells, _) = placer.squeeze().unwrap();
        assert!(!cells[&ClusterId(0)].contains(&Position::new(5, 5)));
    }

    #[test]
    fn annealing_does_not_worsen_cost() {
        let device = mock_cgra(24);
        let clusters = pe_clusters(&[8, 8, 8, 8]);
        let nl = bridge_netlist(&clusters);
        let fixed = FixedPositions::new();
        let mut rng = StdRng::seed_from_u64(5);
        let mut placer =
            ClusterPlacer::new(&device, &clusters, &nl, &fixed, 6, 4, &mut rng).unwrap();
        let initial = placer.energy();
        let outcome = placer
            .run(&mut rng, Deadline::none(), &CancelToken::new())
            .unwrap();
        assert!(outcome.best_energy <= initial);
        assert_eq!(placer.energy(), outcome.best_energy);
    }
}
