//! The live-points reducer external interface (spec §4.3) and its two named
//! policies. The reducer needs read access to the sampler's run state but
//! must not own (or be owned by) the sampler — the cyclic reference is
//! broken by handing it a read-only snapshot at call time (Design Notes §9).

/// Read-only view of run state passed to a reducer at each iteration. Exists
/// purely to avoid a sampler <-> reducer ownership cycle.
#[derive(Debug, Clone, Copy)]
pub struct RunStateSnapshot {
    pub log_z: f64,
    pub log_w: f64,
    pub n_live: usize,
    pub n_live_min: usize,
    pub iteration: usize,
    pub termination_factor: f64,
}

pub trait LivePointsReducer: Sync {
    /// Number of live points to remove at this iteration (>= 0). Must never
    /// reduce `n_live` below `n_live_min`, and the sequence of returned
    /// counts must keep `N_live` monotonically non-increasing.
    fn next_removal_count(&self, snapshot: &RunStateSnapshot) -> usize;
}

/// Removal count grows with `n^exponent`, scaled by `tolerance`; removal
/// only begins once the estimated remaining-evidence ratio drops below
/// `termination_factor`.
#[derive(Debug, Clone, Copy)]
pub struct PowerlawReducer {
    pub exponent: f64,
    pub tolerance: f64,
}

impl LivePointsReducer for PowerlawReducer {
    fn next_removal_count(&self, s: &RunStateSnapshot) -> usize {
        if s.n_live <= s.n_live_min {
            return 0;
        }
        // log(Z_remaining / Z) estimated as log_w (current prior-mass width,
        // already in log-evidence units relative to Z accumulated so far).
        let remaining_ratio = s.log_w - s.log_z;
        if remaining_ratio >= -s.termination_factor {
            return 0;
        }
        let raw = self.tolerance * (s.iteration as f64).powf(self.exponent);
        let count = raw.floor().max(1.0) as usize;
        count.min(s.n_live - s.n_live_min)
    }
}

/// Removal proportional to the expected remaining evidence fraction: the
/// smaller the remaining prior mass, the larger the fraction of the live set
/// retired per step, so the run winds down without overshooting `n_live_min`.
#[derive(Debug, Clone, Copy)]
pub struct FerozReducer {
    pub fraction: f64,
}

impl LivePointsReducer for FerozReducer {
    fn next_removal_count(&self, s: &RunStateSnapshot) -> usize {
        if s.n_live <= s.n_live_min {
            return 0;
        }
        let remaining_ratio = s.log_w - s.log_z;
        if remaining_ratio >= -s.termination_factor {
            return 0;
        }
        let x_remaining = s.log_w.exp().min(1.0);
        let raw = self.fraction * x_remaining * s.n_live as f64;
        let count = raw.floor() as usize;
        count.min(s.n_live - s.n_live_min)
    }
}

/// Fixed-`N_live` policy used by scenarios/tests that do not want reduction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReducer;

impl LivePointsReducer for NoReducer {
    fn next_removal_count(&self, _s: &RunStateSnapshot) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(n_live: usize, n_live_min: usize, iteration: usize) -> RunStateSnapshot {
        RunStateSnapshot {
            log_z: -10.0,
            log_w: -0.001,
            n_live,
            n_live_min,
            iteration,
            termination_factor: 0.01,
        }
    }

    #[test]
    fn powerlaw_never_reduces_below_floor() {
        let reducer = PowerlawReducer {
            exponent: 2.0,
            tolerance: 1.0,
        };
        let s = snapshot(10, 10, 500);
        assert_eq!(reducer.next_removal_count(&s), 0);
    }

    #[test]
    fn powerlaw_is_inactive_before_threshold_crossed() {
        let reducer = PowerlawReducer {
            exponent: 1.0,
            tolerance: 1.0,
        };
        let s = RunStateSnapshot {
            log_z: -1.0,
            log_w: -0.5,
            n_live: 100,
            n_live_min: 10,
            iteration: 5,
            termination_factor: 0.01,
        };
        assert_eq!(reducer.next_removal_count(&s), 0);
    }

    #[test]
    fn feroz_respects_floor() {
        let reducer = FerozReducer { fraction: 0.9 };
        let s = snapshot(10, 10, 1000);
        assert_eq!(reducer.next_removal_count(&s), 0);
    }

    #[test]
    fn no_reducer_never_removes() {
        let reducer = NoReducer;
        let s = snapshot(500, 50, 100);
        assert_eq!(reducer.next_removal_count(&s), 0);
    }
}
