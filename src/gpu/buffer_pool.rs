//! Exact-length pooled GPU buffer allocator.
//!
//! Dust items need a storage block sized to their exact particle count, and
//! dissolve bursts (selecting and deleting many messages at once) create and
//! retire many same-sized blocks in quick succession. The pool keeps retired
//! blocks on per-length free-lists instead of handing them back to the
//! driver, so a new item of a common size reuses a warm allocation.
//!
//! The pool is a thread-safe service shared by every layer instance; reuse
//! and budget policy live here, not in the layer. The layer only asks for an
//! exact byte length and gets a block or `None` ("skip this item this frame,
//! ask again next frame").

use std::sync::{Arc, Mutex, OnceLock, Weak};

use rustc_hash::FxHashMap;

use crate::util::lock;

#[derive(Default)]
struct PoolInner {
    /// Retired blocks, keyed by exact byte length.
    free: FxHashMap<u64, Vec<wgpu::Buffer>>,
    /// Total bytes in blocks created by this pool (live + free).
    allocated: u64,
}

/// Shared allocator of exact-length GPU storage blocks.
pub struct BufferPool {
    inner: Mutex<PoolInner>,
    budget: u64,
}

impl BufferPool {
    /// Default allocation budget: 256 MiB of particle storage.
    pub const DEFAULT_BUDGET: u64 = 256 << 20;

    /// A new pool with the given allocation budget in bytes.
    #[must_use]
    pub fn new(budget: u64) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(PoolInner::default()),
            budget,
        })
    }

    /// The process-wide shared pool.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<BufferPool>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| BufferPool::new(Self::DEFAULT_BUDGET)))
    }

    /// Request a block of exactly `byte_len` bytes.
    ///
    /// Returns a recycled block when one of that length is free, otherwise a
    /// fresh allocation. Returns `None` for zero-length requests or when a
    /// fresh allocation would exceed the pool's budget; a later request can
    /// succeed once blocks are released.
    #[must_use]
    pub fn acquire(
        self: &Arc<Self>,
        device: &wgpu::Device,
        byte_len: u64,
    ) -> Option<PooledBuffer> {
        if byte_len == 0 {
            return None;
        }

        let buffer = {
            let mut inner = lock(&self.inner);
            match inner.free.get_mut(&byte_len).and_then(Vec::pop) {
                Some(recycled) => recycled,
                None => {
                    if inner.allocated + byte_len > self.budget {
                        log::debug!(
                            "buffer pool budget exhausted ({} of {} bytes)",
                            inner.allocated,
                            self.budget
                        );
                        return None;
                    }
                    inner.allocated += byte_len;
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("Dust Particle Buffer"),
                        size: byte_len,
                        usage: wgpu::BufferUsages::STORAGE
                            | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    })
                }
            }
        };

        Some(PooledBuffer {
            buffer: Some(buffer),
            byte_len,
            pool: Arc::downgrade(self),
        })
    }

    /// Total bytes in blocks created by this pool (live + free).
    #[must_use]
    pub fn allocated_bytes(&self) -> u64 {
        lock(&self.inner).allocated
    }

    fn release(&self, buffer: wgpu::Buffer, byte_len: u64) {
        lock(&self.inner)
            .free
            .entry(byte_len)
            .or_default()
            .push(buffer);
    }
}

/// An exact-length GPU block leased from a [`BufferPool`].
///
/// Dropping the lease returns the block to its pool's free-list (or frees it
/// outright if the pool is gone).
pub struct PooledBuffer {
    buffer: Option<wgpu::Buffer>,
    byte_len: u64,
    pool: Weak<BufferPool>,
}

impl PooledBuffer {
    /// The underlying GPU buffer.
    #[must_use]
    pub fn buffer(&self) -> &wgpu::Buffer {
        // Populated from acquire until drop.
        self.buffer
            .as_ref()
            .unwrap_or_else(|| unreachable!("pooled buffer taken before drop"))
    }

    /// Length of the block in bytes.
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            if let Some(pool) = self.pool.upgrade() {
                pool.release(buffer, self.byte_len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_support::shared_device;

    #[test]
    fn test_zero_length_request_yields_none() {
        let Some((device, _)) = shared_device() else {
            return;
        };
        let pool = BufferPool::new(1 << 20);
        assert!(pool.acquire(device, 0).is_none());
    }

    #[test]
    fn test_released_block_is_reused_for_equal_length() {
        let Some((device, _)) = shared_device() else {
            return;
        };
        let pool = BufferPool::new(1 << 20);

        let first = pool.acquire(device, 4096);
        assert!(first.is_some());
        assert_eq!(pool.allocated_bytes(), 4096);
        drop(first);

        // Same length comes from the free-list: no new allocation.
        let second = pool.acquire(device, 4096);
        assert!(second.is_some());
        assert_eq!(pool.allocated_bytes(), 4096);

        // A different length is a fresh allocation.
        let third = pool.acquire(device, 2048);
        assert!(third.is_some());
        assert_eq!(pool.allocated_bytes(), 4096 + 2048);
    }

    #[test]
    fn test_budget_exhaustion_yields_none_and_recovers() {
        let Some((device, _)) = shared_device() else {
            return;
        };
        let pool = BufferPool::new(1024);

        let held = pool.acquire(device, 1024);
        assert!(held.is_some());
        assert!(pool.acquire(device, 512).is_none());

        // Releasing makes the same length reusable despite the budget.
        drop(held);
        assert!(pool.acquire(device, 1024).is_some());
    }

    #[test]
    fn test_lease_reports_length() {
        let Some((device, _)) = shared_device() else {
            return;
        };
        let pool = BufferPool::new(1 << 20);
        if let Some(lease) = pool.acquire(device, 640) {
            assert_eq!(lease.byte_len(), 640);
            assert_eq!(lease.buffer().size(), 640);
        }
    }
}
