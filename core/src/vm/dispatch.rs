//! Compute-style dispatch: replays a kernel once per logical thread of a
//! grid of thread groups, injecting the built-in system values before each
//! invocation.

use std::fmt;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::bundle::{Bundle, INPUT0_REGISTER};
use crate::resource::{BufferKind, MemoryView};

use super::engine::{InputFile, run_thread};
use super::registers::RegisterBank;

/// Input slots that receive the system values.
pub const SV_GROUP_ID_SLOT: u32 = INPUT0_REGISTER;
pub const SV_GROUP_INDEX_SLOT: u32 = INPUT0_REGISTER + 1;
pub const SV_GROUP_THREAD_ID_SLOT: u32 = INPUT0_REGISTER + 2;
pub const SV_DISPATCH_THREAD_ID_SLOT: u32 = INPUT0_REGISTER + 3;

/// Three-dimensional extent of a dispatch: groups or threads per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Extent3 {
    pub const ONE: Extent3 = Extent3::new(1, 1, 1);

    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Number of cells; zero if any axis is zero, `None` if it overflows `u64`.
    pub fn volume(&self) -> Option<u64> {
        (self.x as u64)
            .checked_mul(self.y as u64)?
            .checked_mul(self.z as u64)
    }
}

impl Default for Extent3 {
    fn default() -> Self {
        Extent3::ONE
    }
}

impl From<[u32; 3]> for Extent3 {
    fn from([x, y, z]: [u32; 3]) -> Self {
        Extent3::new(x, y, z)
    }
}

impl From<(u32, u32, u32)> for Extent3 {
    fn from((x, y, z): (u32, u32, u32)) -> Self {
        Extent3::new(x, y, z)
    }
}

impl fmt::Display for Extent3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

/// Built-in inputs of one logical thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SystemValues {
    pub group_id: [u32; 3],
    pub group_index: u32,
    pub group_thread_id: [u32; 3],
    pub dispatch_thread_id: [u32; 3],
}

impl SystemValues {
    /// Words needed to hold all four values back to back.
    pub const WORDS: usize = 10;

    pub fn compute(group: [u32; 3], thread: [u32; 3], num_threads: Extent3) -> Self {
        let [gx, gy, gz] = group;
        let [tx, ty, tz] = thread;
        let Extent3 { x: nx, y: ny, z: nz } = num_threads;
        SystemValues {
            group_id: group,
            group_index: tz.wrapping_mul(nx).wrapping_mul(ny).wrapping_add(ty.wrapping_mul(nx)).wrapping_add(tx),
            group_thread_id: thread,
            dispatch_thread_id: [
                gx.wrapping_mul(nx).wrapping_add(tx),
                gy.wrapping_mul(ny).wrapping_add(ty),
                gz.wrapping_mul(nz).wrapping_add(tz),
            ],
        }
    }

    /// Layout: GroupID (3), GroupIndex (1), GroupThreadID (3), DispatchThreadID (3).
    pub fn write_to(&self, words: &mut [u32]) {
        words[0..3].copy_from_slice(&self.group_id);
        words[3] = self.group_index;
        words[4..7].copy_from_slice(&self.group_thread_id);
        words[7..10].copy_from_slice(&self.dispatch_thread_id);
    }
}

/// Iterates every logical thread of a dispatch in execution order:
/// groups z, y, x outermost, then threads z, y, x with x innermost.
#[derive(Debug, Clone)]
pub struct ThreadGrid {
    num_groups: Extent3,
    num_threads: Extent3,
    per_group: u64,
    next: u64,
    total: u64,
}

impl ThreadGrid {
    /// Fails when the thread count does not fit in a `u64`.
    pub fn new(num_groups: Extent3, num_threads: Extent3) -> Result<Self> {
        let per_group = num_threads.volume();
        let total = num_groups
            .volume()
            .zip(per_group)
            .and_then(|(groups, threads)| groups.checked_mul(threads))
            .ok_or_else(|| anyhow!("dispatch of {} groups x {} threads has too many threads", num_groups, num_threads))?;
        Ok(Self {
            num_groups,
            num_threads,
            per_group: per_group.unwrap_or(0),
            next: 0,
            total,
        })
    }

    fn unflatten(linear: u64, extent: Extent3) -> [u32; 3] {
        let (nx, ny) = (extent.x as u64, extent.y as u64);
        [
            (linear % nx) as u32,
            (linear / nx % ny) as u32,
            (linear / (nx * ny)) as u32,
        ]
    }
}

impl Iterator for ThreadGrid {
    type Item = SystemValues;

    fn next(&mut self) -> Option<SystemValues> {
        if self.next >= self.total {
            return None;
        }
        let thread = Self::unflatten(self.next % self.per_group, self.num_threads);
        let group = Self::unflatten(self.next / self.per_group, self.num_groups);
        self.next += 1;
        Some(SystemValues::compute(group, thread, self.num_threads))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for ThreadGrid {}

/// Summary of a finished dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DispatchStats {
    pub threads: u64,
    /// Threads whose `Ret` value was non-zero.
    pub nonzero_returns: u64,
}

impl Bundle {
    /// Runs the kernel once per thread of `num_groups` x `num_threads`.
    pub fn dispatch(&mut self, num_groups: impl Into<Extent3>, num_threads: impl Into<Extent3>) -> Result<DispatchStats> {
        self.dispatch_observed(num_groups, num_threads, |_, _| {})
    }

    /// Like [`Bundle::dispatch`], reporting each thread's system values and
    /// return value to `observer` in execution order.
    pub fn dispatch_observed<F>(
        &mut self,
        num_groups: impl Into<Extent3>,
        num_threads: impl Into<Extent3>,
        mut observer: F,
    ) -> Result<DispatchStats>
    where
        F: FnMut(&SystemValues, i32),
    {
        let num_groups = num_groups.into();
        let num_threads = num_threads.into();
        let grid = ThreadGrid::new(num_groups, num_threads)
            .with_context(|| format!("bundle '{}' cannot dispatch", self.name))?;
        let options = self.options;
        let sv_view = self.bind_system_values();
        tracing::debug!(
            target: "fxvm::dispatch",
            bundle = %self.name,
            groups = %num_groups,
            threads = %num_threads,
            validated = options.is_validated(),
            "dispatch started"
        );

        let sv_at = self.resources.resolve(sv_view)?;
        let mut inputs = InputFile::resolve(&mut self.resources, &self.inputs)?;
        let mut regs = RegisterBank::new();
        let mut stats = DispatchStats::default();

        for values in grid {
            values.write_to(inputs.words_mut(sv_at));
            regs.reset();
            let ret = run_thread(&self.code, &mut regs, &mut inputs, &options).map_err(|err| {
                anyhow::Error::new(err).context(format!(
                    "bundle '{}' faulted on dispatch thread {:?}",
                    self.name, values.dispatch_thread_id
                ))
            })?;
            tracing::trace!(target: "fxvm::dispatch", thread = ?values.dispatch_thread_id, ret, "thread finished");
            stats.threads += 1;
            if ret != 0 {
                stats.nonzero_returns += 1;
            }
            observer(&values, ret);
        }

        tracing::debug!(target: "fxvm::dispatch", bundle = %self.name, threads = stats.threads, "dispatch finished");
        Ok(stats)
    }

    /// System-value storage is allocated on first dispatch and reused; the
    /// four subviews are rebound every time so a caller cannot leave stale
    /// bindings in slots 1..=4.
    fn bind_system_values(&mut self) -> MemoryView {
        let view = match self.system_values {
            Some(view) if self.resources.is_live(view.handle()) => view,
            _ => {
                let view = self.resources.alloc(
                    BufferKind::SystemValues,
                    "$system_values",
                    vec![0; SystemValues::WORDS],
                );
                self.system_values = Some(view);
                view
            }
        };
        self.inputs[SV_GROUP_ID_SLOT as usize] = view.subview(0, 3);
        self.inputs[SV_GROUP_INDEX_SLOT as usize] = view.subview(3, 1);
        self.inputs[SV_GROUP_THREAD_ID_SLOT as usize] = view.subview(4, 3);
        self.inputs[SV_DISPATCH_THREAD_ID_SLOT as usize] = view.subview(7, 3);
        view
    }
}
