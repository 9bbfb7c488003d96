//! Rectangular state-space lattice with optional periodic axes.

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::core::{GymError, Result};

/// One axis of the lattice.
///
/// A periodic axis identifies `max` with `min`: its `resolution` nodes sit at
/// `min + i * (max - min) / resolution` and `max` itself is not a node. A
/// non-periodic axis places nodes at `linspace(min, max, resolution)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub min: f64,
    pub max: f64,
    pub resolution: usize,
    #[serde(default)]
    pub periodic: bool,
}

impl Dimension {
    pub fn new(min: f64, max: f64, resolution: usize) -> Self {
        Self { min, max, resolution, periodic: false }
    }

    pub fn periodic(min: f64, max: f64, resolution: usize) -> Self {
        Self { min, max, resolution, periodic: true }
    }

    fn spacing(&self) -> f64 {
        if self.periodic {
            (self.max - self.min) / self.resolution as f64
        } else {
            (self.max - self.min) / (self.resolution - 1) as f64
        }
    }

    /// Lower node index and weight of the upper neighbor for a coordinate.
    /// The upper neighbor is `lo + 1`, wrapped modulo `resolution` when periodic.
    #[inline]
    fn locate(&self, p: f64, spacing: f64) -> (usize, usize, f64) {
        let n = self.resolution;
        if self.periodic {
            let span = self.max - self.min;
            let u = (p - self.min).rem_euclid(span) / spacing;
            let f = u.floor();
            let (lo, w) = if (f as usize) >= n { (0, 0.0) } else { (f as usize, u - f) };
            (lo, (lo + 1) % n, w.clamp(0.0, 1.0))
        } else {
            let u = (p.clamp(self.min, self.max) - self.min) / spacing;
            let lo = (u.floor() as usize).min(n - 2);
            (lo, lo + 1, (u - lo as f64).clamp(0.0, 1.0))
        }
    }
}

/// An immutable lattice over the continuous state space.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    dims: Vec<Dimension>,
    spacing: Vec<f64>,
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl Grid {
    pub fn new(dims: Vec<Dimension>) -> Result<Self> {
        if dims.is_empty() {
            return Err(GymError::Config("grid needs at least one dimension".into()));
        }
        for (i, d) in dims.iter().enumerate() {
            if !(d.min.is_finite() && d.max.is_finite() && d.min < d.max) {
                return Err(GymError::Config(format!(
                    "grid dimension {i}: need finite min < max, got [{}, {}]",
                    d.min, d.max
                )));
            }
            if d.resolution < 2 {
                return Err(GymError::Config(format!(
                    "grid dimension {i}: resolution must be >= 2, got {}",
                    d.resolution
                )));
            }
        }
        let shape: Vec<usize> = dims.iter().map(|d| d.resolution).collect();
        let mut strides = vec![1usize; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        let spacing = dims.iter().map(Dimension::spacing).collect();
        Ok(Self { dims, spacing, shape, strides })
    }

    /// Build from box bounds, per-axis resolutions and the indices of periodic axes.
    pub fn from_lattice(lo: &[f64], hi: &[f64], resolution: &[usize], periodic_dims: &[usize]) -> Result<Self> {
        if lo.len() != hi.len() || lo.len() != resolution.len() {
            return Err(GymError::Config(format!(
                "grid bounds/resolution lengths differ: {} / {} / {}",
                lo.len(),
                hi.len(),
                resolution.len()
            )));
        }
        if let Some(&bad) = periodic_dims.iter().find(|&&p| p >= lo.len()) {
            return Err(GymError::Config(format!("periodic dimension {bad} out of range for {}-d grid", lo.len())));
        }
        let dims = (0..lo.len())
            .map(|i| Dimension {
                min: lo[i],
                max: hi[i],
                resolution: resolution[i],
                periodic: periodic_dims.contains(&i),
            })
            .collect();
        Self::new(dims)
    }

    pub fn ndim(&self) -> usize { self.dims.len() }
    pub fn shape(&self) -> &[usize] { &self.shape }
    pub fn spacing(&self, dim: usize) -> f64 { self.spacing[dim] }
    pub fn is_periodic(&self, dim: usize) -> bool { self.dims[dim].periodic }

    /// Total number of lattice nodes.
    pub fn len(&self) -> usize { self.shape.iter().product() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Row-major stride of `dim` in a flat node buffer.
    pub fn stride(&self, dim: usize) -> usize { self.strides[dim] }

    /// Coordinate of node `idx` along `dim`.
    #[inline]
    pub fn coordinate(&self, dim: usize, idx: usize) -> f64 {
        self.dims[dim].min + idx as f64 * self.spacing[dim]
    }

    /// Index of `flat` along `dim`.
    #[inline]
    pub fn axis_index(&self, flat: usize, dim: usize) -> usize {
        (flat / self.strides[dim]) % self.shape[dim]
    }

    /// Write the multi-index of `flat` into `out`.
    pub fn unravel(&self, flat: usize, out: &mut [usize]) {
        for (d, o) in out.iter_mut().enumerate().take(self.ndim()) {
            *o = self.axis_index(flat, d);
        }
    }

    pub fn flat_index(&self, idx: &[usize]) -> usize {
        idx.iter().zip(&self.strides).map(|(i, s)| i * s).sum()
    }

    /// Write the coordinates of node `flat` into `out`.
    pub fn point(&self, flat: usize, out: &mut [f64]) {
        for (d, o) in out.iter_mut().enumerate().take(self.ndim()) {
            *o = self.coordinate(d, self.axis_index(flat, d));
        }
    }

    /// Evaluate `f` at every node, producing an array shaped like the lattice.
    pub fn map_nodes<F: FnMut(&[f64]) -> f64>(&self, mut f: F) -> ArrayD<f64> {
        let nd = self.ndim();
        let mut p = vec![0.0; nd];
        ArrayD::from_shape_fn(IxDyn(&self.shape), |ix| {
            for (d, c) in p.iter_mut().enumerate() {
                *c = self.coordinate(d, ix[d]);
            }
            f(&p)
        })
    }

    /// Fail unless `shape` is exactly this lattice's shape.
    pub fn check_shape(&self, shape: &[usize]) -> Result<()> {
        if shape != self.shape.as_slice() {
            return Err(GymError::ShapeMismatch { expected: self.shape.clone(), found: shape.to_vec() });
        }
        Ok(())
    }

    /// Multilinear interpolation of `values` at `point`.
    ///
    /// Periodic coordinates wrap into the domain; others clamp to the boundary,
    /// so every query is defined. `values` must be shaped like the lattice and
    /// `point` must have `ndim()` components.
    pub fn interpolate(&self, values: &ArrayViewD<'_, f64>, point: &[f64]) -> f64 {
        debug_assert_eq!(values.shape(), self.shape.as_slice());
        debug_assert_eq!(point.len(), self.ndim());
        let nd = self.ndim();
        let mut lo = vec![0usize; nd];
        let mut hi = vec![0usize; nd];
        let mut t = vec![0.0f64; nd];
        for d in 0..nd {
            let (l, h, w) = self.dims[d].locate(point[d], self.spacing[d]);
            lo[d] = l;
            hi[d] = h;
            t[d] = w;
        }

        let mut idx = vec![0usize; nd];
        let mut acc = 0.0;
        for corner in 0..(1usize << nd) {
            let mut weight = 1.0;
            for d in 0..nd {
                if corner & (1 << d) != 0 {
                    idx[d] = hi[d];
                    weight *= t[d];
                } else {
                    idx[d] = lo[d];
                    weight *= 1.0 - t[d];
                }
            }
            if weight != 0.0 {
                acc += weight * values[idx.as_slice()];
            }
        }
        acc
    }
}
