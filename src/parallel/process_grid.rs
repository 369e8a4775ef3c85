use crate::errors::{CellMdError, Result};
use crate::math::prime_factors;
use crate::simulation_box::SimulationBox;

/// Cartesian arrangement of ranks over the global box. Along every axis the
/// subdomains are separated by `planes`, which start at 0 and end at the box
/// length.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessGrid {
    dims: [usize; 3],
    coords: [usize; 3],
    planes: [Vec<f64>; 3],
}

impl ProcessGrid {
    /// Splits the box for `size` ranks: each prime factor of `size` goes to
    /// the axis whose subdomains are currently the longest.
    pub fn new(sim_box: &SimulationBox, size: usize, rank: usize) -> Result<Self> {
        if size == 0 {
            return Err(CellMdError::NotTileable { ranks: size });
        }
        let mut extent = sim_box.lengths();
        let mut dims = [1usize; 3];
        for factor in prime_factors(size).into_iter().rev() {
            let mut longest = 0;
            for d in 1..3 {
                if extent[d] > extent[longest] {
                    longest = d;
                }
            }
            extent[longest] /= factor as f64;
            dims[longest] *= factor;
        }
        Self::with_dims(sim_box, dims, rank)
    }

    /// Equal-width subdomains with a given number of ranks per axis.
    pub fn with_dims(sim_box: &SimulationBox, dims: [usize; 3], rank: usize) -> Result<Self> {
        let size = dims[0] * dims[1] * dims[2];
        if size == 0 || rank >= size {
            return Err(CellMdError::NotTileable { ranks: size });
        }
        let planes = [0, 1, 2].map(|d| {
            let width = sim_box.length(d) / dims[d] as f64;
            let mut p: Vec<f64> = (0..=dims[d]).map(|i| i as f64 * width).collect();
            p[dims[d]] = sim_box.length(d);
            p
        });
        Ok(Self {
            dims,
            coords: Self::coords_of(dims, rank),
            planes,
        })
    }

    fn coords_of(dims: [usize; 3], rank: usize) -> [usize; 3] {
        [
            rank % dims[0],
            (rank / dims[0]) % dims[1],
            rank / (dims[0] * dims[1]),
        ]
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn coords(&self) -> [usize; 3] {
        self.coords
    }

    pub fn size(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    pub fn planes(&self, d: usize) -> &[f64] {
        &self.planes[d]
    }

    pub fn rank_of(&self, c: [usize; 3]) -> usize {
        (c[2] * self.dims[1] + c[1]) * self.dims[0] + c[0]
    }

    pub fn bounding_box_of(&self, rank: usize) -> ([f64; 3], [f64; 3]) {
        let c = Self::coords_of(self.dims, rank);
        let mut lo = [0.0; 3];
        let mut hi = [0.0; 3];
        for d in 0..3 {
            lo[d] = self.planes[d][c[d]];
            hi[d] = self.planes[d][c[d] + 1];
        }
        (lo, hi)
    }

    pub fn bounding_box(&self) -> ([f64; 3], [f64; 3]) {
        self.bounding_box_of(self.rank_of(self.coords))
    }

    /// Rank owning a position inside the global box.
    pub fn owner_of(&self, r: &[f64; 3]) -> usize {
        let mut c = [0usize; 3];
        for d in 0..3 {
            let above = self.planes[d][1..self.dims[d]].partition_point(|p| *p <= r[d]);
            c[d] = above;
        }
        self.rank_of(c)
    }

    /// Moves the planes so that every slab along an axis holds about the
    /// same number of molecules, assuming molecules spread evenly inside
    /// each old slab. No slab becomes narrower than `min_width` (or an equal
    /// share of the axis, if that is smaller).
    pub fn rebalanced(&self, counts_per_rank: &[u64], min_width: f64) -> ProcessGrid {
        let mut planes = self.planes.clone();
        for d in 0..3 {
            let n = self.dims[d];
            if n == 1 {
                continue;
            }
            let mut load = vec![0.0; n];
            for (rank, count) in counts_per_rank.iter().enumerate() {
                load[Self::coords_of(self.dims, rank)[d]] += *count as f64;
            }
            let total: f64 = load.iter().sum();
            if total == 0.0 {
                continue;
            }
            let old = &self.planes[d];
            let length = old[n];
            let mut new = vec![0.0; n + 1];
            new[n] = length;
            let mut slab = 0;
            let mut below = 0.0;
            for (i, plane) in new.iter_mut().enumerate().take(n).skip(1) {
                let target = total * i as f64 / n as f64;
                while slab < n - 1 && below + load[slab] < target {
                    below += load[slab];
                    slab += 1;
                }
                let fraction = if load[slab] > 0.0 {
                    ((target - below) / load[slab]).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                *plane = old[slab] + fraction * (old[slab + 1] - old[slab]);
            }
            let width = min_width.min(length / n as f64);
            for i in 1..n {
                new[i] = new[i].max(new[i - 1] + width);
            }
            for i in (1..n).rev() {
                new[i] = new[i].min(new[i + 1] - width);
            }
            planes[d] = new;
        }
        ProcessGrid {
            dims: self.dims,
            coords: self.coords,
            planes,
        }
    }
}
