//! The shared simulated-annealing engine.
//!
//! The three placers (cluster boxes, per-cluster detail, board refinement)
//! differ only in state representation, move set, and energy; they implement
//! [`Annealer`] and share one Metropolis loop with geometric cooling. The
//! engine tracks the best state seen, honors wall-clock deadlines by
//! returning that best state, and polls a [`CancelToken`] at checkpoints.

use rand::rngs::StdRng;
use rand::Rng;
use std::time::{Duration, Instant};
use tessera_common::CancelToken;

use crate::error::PlaceError;

/// How often (in steps) the engine polls for cancellation and deadlines.
const CHECKPOINT_INTERVAL: u64 = 256;

/// A state that can be annealed: random moves with undo, an energy, and a
/// best-state snapshot.
pub trait Annealer {
    /// Proposes one random state change. Returns `false` when no move was
    /// possible (the engine then skips the step).
    fn propose(&mut self, rng: &mut StdRng) -> bool;

    /// Reverts the most recent proposed move.
    fn revert(&mut self);

    /// The current state's energy (lower is better).
    fn energy(&self) -> f64;

    /// Snapshots the current state as the best seen.
    fn save_best(&mut self);

    /// Restores the best-seen snapshot.
    fn load_best(&mut self);
}

/// An annealing schedule: geometric cooling from `tmax` to `tmin` over `steps`.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    /// Starting temperature.
    pub tmax: f64,
    /// Final temperature.
    pub tmin: f64,
    /// Number of move attempts.
    pub steps: u64,
}

impl Schedule {
    /// Creates a schedule from explicit bounds.
    pub fn new(tmax: f64, tmin: f64, steps: u64) -> Self {
        Self { tmax, tmin, steps }
    }

    /// The aggressive variant: a narrow temperature band just above `tmin`
    /// and a tenth of the steps.
    pub fn aggressive(&self) -> Self {
        Self {
            tmax: self.tmin + 3.0,
            tmin: self.tmin,
            steps: (self.steps / 10).max(1),
        }
    }

    /// Calibrates a schedule by sampling random moves.
    ///
    /// Proposes and reverts a handful of moves to estimate the deviation of
    /// move energies; `tmax` is set high enough that early moves of that
    /// magnitude are routinely accepted, `tmin` low enough that the final
    /// phase is effectively greedy.
    pub fn calibrate<A: Annealer>(annealer: &mut A, steps: u64, rng: &mut StdRng) -> Self {
        const SAMPLES: usize = 64;
        let base = annealer.energy();
        let mut deltas: Vec<f64> = Vec::with_capacity(SAMPLES);
        for _ in 0..SAMPLES {
            if annealer.propose(rng) {
                deltas.push((annealer.energy() - base).abs());
                annealer.revert();
            }
        }
        let sigma = if deltas.is_empty() {
            0.0
        } else {
            let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
            let var = deltas
                .iter()
                .map(|d| (d - mean) * (d - mean))
                .sum::<f64>()
                / deltas.len() as f64;
            var.sqrt().max(mean)
        };
        let tmax = (20.0 * sigma).max(1.0);
        Self::new(tmax, 0.01, steps)
    }
}

/// An optional wall-clock budget for one SA phase.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline.
    pub fn none() -> Self {
        Self(None)
    }

    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self(Some(Instant::now() + budget))
    }

    /// A deadline from an optional seconds budget.
    pub fn from_secs(budget: Option<f64>) -> Self {
        match budget {
            Some(secs) => Self::after(Duration::from_secs_f64(secs)),
            None => Self::none(),
        }
    }

    /// Returns whether the deadline has passed.
    pub fn expired(&self) -> bool {
        matches!(self.0, Some(at) if Instant::now() >= at)
    }
}

/// The result of one annealing or refinement run.
#[derive(Debug, Clone, Copy)]
pub struct AnnealOutcome {
    /// Energy of the state the annealer was left in (the best seen).
    pub best_energy: f64,
    /// Whether the run stopped early on its deadline.
    pub timed_out: bool,
}

fn checkpoint(
    step: u64,
    deadline: Deadline,
    cancel: &CancelToken,
) -> Result<bool, PlaceError> {
    if step % CHECKPOINT_INTERVAL != 0 {
        return Ok(false);
    }
    if cancel.is_cancelled() {
        return Err(PlaceError::Cancelled);
    }
    Ok(deadline.expired())
}

/// Runs the Metropolis loop with geometric cooling.
///
/// The annealer is left in the best state seen, also when the deadline
/// expires mid-run.
pub fn anneal<A: Annealer>(
    annealer: &mut A,
    schedule: &Schedule,
    rng: &mut StdRng,
    deadline: Deadline,
    cancel: &CancelToken,
) -> Result<AnnealOutcome, PlaceError> {
    if schedule.tmin <= 0.0 || schedule.tmax < schedule.tmin {
        return Err(PlaceError::Internal(format!(
            "invalid schedule: tmax {} tmin {}",
            schedule.tmax, schedule.tmin
        )));
    }

    let mut energy = annealer.energy();
    let mut best = energy;
    annealer.save_best();
    let tfactor = -(schedule.tmax / schedule.tmin).ln();
    let mut timed_out = false;

    for step in 0..schedule.steps {
        if checkpoint(step, deadline, cancel)? {
            timed_out = true;
            break;
        }
        let temperature =
            schedule.tmax * (tfactor * step as f64 / schedule.steps as f64).exp();
        if !annealer.propose(rng) {
            continue;
        }
        let new_energy = annealer.energy();
        let delta = new_energy - energy;
        if delta > 0.0 && rng.gen::<f64>() >= (-delta / temperature).exp() {
            annealer.revert();
        } else {
            energy = new_energy;
            if energy < best {
                best = energy;
                annealer.save_best();
            }
        }
    }

    annealer.load_best();
    Ok(AnnealOutcome {
        best_energy: best,
        timed_out,
    })
}

/// Runs a constant-temperature polish: `steps` moves at `temperature`.
///
/// With a low temperature this is a near-greedy descent that still escapes
/// shallow plateaus.
pub fn refine<A: Annealer>(
    annealer: &mut A,
    steps: u64,
    temperature: f64,
    rng: &mut StdRng,
    deadline: Deadline,
    cancel: &CancelToken,
) -> Result<AnnealOutcome, PlaceError> {
    let mut energy = annealer.energy();
    let mut best = energy;
    annealer.save_best();
    let mut timed_out = false;

    for step in 0..steps {
        if checkpoint(step, deadline, cancel)? {
            timed_out = true;
            break;
        }
        if !annealer.propose(rng) {
            continue;
        }
        let new_energy = annealer.energy();
        let delta = new_energy - energy;
        if delta > 0.0 && rng.gen::<f64>() >= (-delta / temperature).exp() {
            annealer.revert();
        } else {
            energy = new_energy;
            if energy < best {
                best = energy;
                annealer.save_best();
            }
        }
    }

    annealer.load_best();
    Ok(AnnealOutcome {
        best_energy: best,
        timed_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    /// A toy annealer: an integer walking a number line toward 17.
    struct LineWalker {
        value: i64,
        prev: i64,
        best: i64,
    }

    impl LineWalker {
        fn new(start: i64) -> Self {
            Self {
                value: start,
                prev: start,
                best: start,
            }
        }
    }

    impl Annealer for LineWalker {
        fn propose(&mut self, rng: &mut StdRng) -> bool {
            self.prev = self.value;
            self.value += rng.gen_range(-3i64..=3);
            true
        }
        fn revert(&mut self) {
            self.value = self.prev;
        }
        fn energy(&self) -> f64 {
            (self.value - 17).abs() as f64
        }
        fn save_best(&mut self) {
            self.best = self.value;
        }
        fn load_best(&mut self) {
            self.value = self.best;
        }
    }

    #[test]
    fn anneal_descends() {
        let mut walker = LineWalker::new(100);
        let mut rng = StdRng::seed_from_u64(1);
        let schedule = Schedule::new(30.0, 0.01, 5_000);
        let outcome = anneal(
            &mut walker,
            &schedule,
            &mut rng,
            Deadline::none(),
            &CancelToken::new(),
        )
        .unwrap();
        assert!(outcome.best_energy <= 2.0, "got {}", outcome.best_energy);
        assert!(!outcome.timed_out);
        assert_eq!(walker.energy(), outcome.best_energy);
    }

    #[test]
    fn refine_is_near_greedy() {
        let mut walker = LineWalker::new(40);
        let mut rng = StdRng::seed_from_u64(2);
        let outcome = refine(
            &mut walker,
            2_000,
            0.01,
            &mut rng,
            Deadline::none(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.best_energy, 0.0);
    }

    #[test]
    fn cancellation_aborts() {
        let mut walker = LineWalker::new(0);
        let mut rng = StdRng::seed_from_u64(3);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = anneal(
            &mut walker,
            &Schedule::new(10.0, 0.01, 100),
            &mut rng,
            Deadline::none(),
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, PlaceError::Cancelled));
    }

    #[test]
    fn expired_deadline_returns_best() {
        let mut walker = LineWalker::new(5);
        let mut rng = StdRng::seed_from_u64(4);
        let deadline = Deadline::after(Duration::from_secs(0));
        let outcome = anneal(
            &mut walker,
            &Schedule::new(10.0, 0.01, 1_000_000),
            &mut rng,
            deadline,
            &CancelToken::new(),
        )
        .unwrap();
        assert!(outcome.timed_out);
        assert_eq!(walker.energy(), outcome.best_energy);
    }

    #[test]
    fn invalid_schedule_rejected() {
        let mut walker = LineWalker::new(0);
        let mut rng = StdRng::seed_from_u64(5);
        let err = anneal(
            &mut walker,
            &Schedule::new(1.0, 0.0, 10),
            &mut rng,
            Deadline::none(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PlaceError::Internal(_)));
    }

    #[test]
    fn aggressive_narrows_the_schedule() {
        let base = Schedule::new(1000.0, 2.5, 50_000);
        let aggressive = base.aggressive();
        assert_eq!(aggressive.tmax, 5.5);
        assert_eq!(aggressive.steps, 5_000);
    }

    #[test]
    fn calibration_leaves_state_unchanged() {
        let mut walker = LineWalker::new(9);
        let mut rng = StdRng::seed_from_u64(6);
        let schedule = Schedule::calibrate(&mut walker, 1234, &mut rng);
        assert_eq!(walker.value, 9);
        assert_eq!(schedule.steps, 1234);
        assert!(schedule.tmax >= 1.0);
        assert!(schedule.tmax > schedule.tmin);
    }
}
