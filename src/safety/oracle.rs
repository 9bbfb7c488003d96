//! Safety queries against the precomputed value function and the analytic region.

use crate::core::Result;
use crate::reachability::{Grid, ValueFunctionStore};
use crate::safety::region::UnsafeRegion;
use crate::state::{STATE_DIM, State};

/// A way of deciding whether a state is unsafe.
pub trait StateClassifier {
    fn is_unsafe(&self, state: &State) -> bool;

    fn is_safe(&self, state: &State) -> bool { !self.is_unsafe(state) }
}

impl StateClassifier for UnsafeRegion {
    fn is_unsafe(&self, state: &State) -> bool { UnsafeRegion::is_unsafe(self, state) }
}

/// Owns the lattice, the value-function snapshots and the unsafe region of one task.
#[derive(Clone, Debug)]
pub struct SafetyOracle {
    grid: Grid,
    store: ValueFunctionStore,
    region: UnsafeRegion,
}

impl SafetyOracle {
    /// Fails when the grid is not 4-d or the store was computed on another lattice.
    pub fn new(grid: Grid, store: ValueFunctionStore, region: UnsafeRegion) -> Result<Self> {
        if grid.ndim() != STATE_DIM {
            return Err(crate::core::GymError::Config(format!(
                "safety oracle needs a {STATE_DIM}-d grid, got {}-d",
                grid.ndim()
            )));
        }
        grid.check_shape(store.lattice_shape())?;
        region.validate()?;
        Ok(Self { grid, store, region })
    }

    pub fn grid(&self) -> &Grid { &self.grid }
    pub fn store(&self) -> &ValueFunctionStore { &self.store }
    pub fn region(&self) -> &UnsafeRegion { &self.region }

    /// Interpolated terminal value at `state`; `>= 0` means certified safe.
    pub fn certified_value(&self, state: &State) -> f64 {
        self.grid.interpolate(&self.store.terminal_value(), &state.to_array())
    }

    pub fn is_certified_safe(&self, state: &State) -> bool { self.certified_value(state) >= 0.0 }

    /// Analytic check against the unsafe region, without touching the value function.
    pub fn is_unsafe_fast(&self, state: &State) -> bool { self.region.is_unsafe(state) }

    /// Classifier backed by the interpolated value function.
    pub fn certified(&self) -> Certified<'_> { Certified(self) }

    /// Classifier backed by the analytic region.
    pub fn analytic(&self) -> &UnsafeRegion { &self.region }
}

/// [`StateClassifier`] that treats negative interpolated values as unsafe.
#[derive(Clone, Copy, Debug)]
pub struct Certified<'a>(&'a SafetyOracle);

impl StateClassifier for Certified<'_> {
    fn is_unsafe(&self, state: &State) -> bool { !self.0.is_certified_safe(state) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GymError;
    use crate::reachability::Dimension;
    use ndarray::{ArrayD, IxDyn};
    use std::f64::consts::PI;

    fn grid() -> Grid {
        Grid::new(vec![
            Dimension::new(-2.0, 2.0, 9),
            Dimension::periodic(-PI, PI, 16),
            Dimension::new(-4.0, 4.0, 5),
            Dimension::new(-4.0, 4.0, 5),
        ])
        .unwrap()
    }

    fn oracle_from_margin(region: UnsafeRegion) -> SafetyOracle {
        let g = grid();
        let terminal = g.map_nodes(|s| region.margin(&State::new(s[0], s[1], s[2], s[3])));
        let store = ValueFunctionStore::from_snapshots(&g, vec![0.0], vec![terminal]).unwrap();
        SafetyOracle::new(g, store, region).unwrap()
    }

    #[test]
    fn classifiers_agree_away_from_the_boundary() {
        let oracle = oracle_from_margin(UnsafeRegion::default());
        for s in [State::upright(), State::new(0.3, 0.1, -0.5, 0.5)] {
            assert!(oracle.certified().is_safe(&s));
            assert!(oracle.analytic().is_safe(&s));
        }
        for s in [State::hanging(), State::new(1.9, 0.0, 0.0, 0.0), State::new(0.0, 2.0, 0.0, 0.0)] {
            assert!(oracle.certified().is_unsafe(&s));
            assert!(oracle.analytic().is_unsafe(&s));
        }
    }

    #[test]
    fn certified_value_is_deterministic() {
        let oracle = oracle_from_margin(UnsafeRegion::default());
        let s = State::new(0.123, -0.2, 0.7, -1.1);
        assert_eq!(oracle.certified_value(&s).to_bits(), oracle.certified_value(&s).to_bits());
    }

    #[test]
    fn rejects_store_from_another_lattice() {
        let g = grid();
        let other = ArrayD::from_elem(IxDyn(&[9, 16, 5, 4]), 1.0);
        let store = ValueFunctionStore::from_snapshots(
            &Grid::new(vec![
                Dimension::new(-2.0, 2.0, 9),
                Dimension::periodic(-PI, PI, 16),
                Dimension::new(-4.0, 4.0, 5),
                Dimension::new(-4.0, 4.0, 4),
            ])
            .unwrap(),
            vec![0.0],
            vec![other],
        )
        .unwrap();
        assert!(matches!(
            SafetyOracle::new(g, store, UnsafeRegion::default()),
            Err(GymError::ShapeMismatch { .. })
        ));
    }
}
