use super::config::ConfigError;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable listing the devices visible to this process.
pub const VISIBLE_DEVICES_VAR: &str = "CUDA_VISIBLE_DEVICES";

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PoolError {
    #[error("The device pool was never populated")]
    Unpopulated,
}

/// The shared set of compute devices available to concurrently running windows.
///
/// Devices are identified by logical ids `0..k`, assigned by position in the list the
/// pool was created from, so nothing downstream depends on raw hardware numbering. A
/// device is either in the pool or held by exactly one caller. `acquire` blocks until a
/// device is free; `release` returns it and wakes one waiter. Ids are handed out in
/// FIFO order.
#[derive(Debug)]
pub struct DevicePool {
    available: Mutex<VecDeque<usize>>,
    freed: Condvar,
    capacity: usize,
}

impl DevicePool {
    pub fn new(ids: impl IntoIterator<Item = usize>) -> Self {
        let available: VecDeque<usize> = ids.into_iter().collect();
        let capacity = available.len();
        Self {
            available: Mutex::new(available),
            freed: Condvar::new(),
            capacity,
        }
    }

    /// Builds a pool from raw device identifiers, keeping at most `max_devices` of them
    /// and renumbering the survivors to `0..k` by position.
    pub fn from_visible_devices(raw: &[String], max_devices: Option<usize>) -> Self {
        let kept = max_devices.map_or(raw.len(), |max| max.min(raw.len()));
        let pool = Self::new(0..kept);
        info!(
            raw_devices = ?&raw[..kept],
            logical_devices = kept,
            "Device pool initialized."
        );
        pool
    }

    /// Total number of devices managed by the pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of devices currently free.
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    /// Takes a device out of the pool, blocking until one is free.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Unpopulated`] if the pool was created empty, since waiting
    /// would never succeed.
    pub fn acquire(&self) -> Result<usize, PoolError> {
        if self.capacity == 0 {
            return Err(PoolError::Unpopulated);
        }
        let mut available = self.lock();
        loop {
            if let Some(id) = available.pop_front() {
                debug!(device = id, "Device acquired.");
                return Ok(id);
            }
            available = self
                .freed
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Returns a device to the pool. Releasing an id that is not held is a caller bug.
    pub fn release(&self, id: usize) {
        debug_assert!(id < self.capacity);
        self.lock().push_back(id);
        debug!(device = id, "Device released.");
        self.freed.notify_one();
    }

    /// Acquires a device wrapped in a guard that releases it when dropped, on every exit
    /// path including unwinding.
    pub fn lease(&self) -> Result<DeviceLease<'_>, PoolError> {
        let id = self.acquire()?;
        Ok(DeviceLease { pool: self, id })
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<usize>> {
        self.available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A device held from a [`DevicePool`]; released on drop.
#[derive(Debug)]
pub struct DeviceLease<'a> {
    pool: &'a DevicePool,
    id: usize,
}

impl DeviceLease<'_> {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Drop for DeviceLease<'_> {
    fn drop(&mut self) {
        self.pool.release(self.id);
    }
}

/// Splits a comma-separated device list, dropping empty entries.
pub fn parse_visible_devices(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads the visible device list from [`VISIBLE_DEVICES_VAR`].
pub fn visible_devices_from_env() -> Result<Vec<String>, ConfigError> {
    let value = std::env::var(VISIBLE_DEVICES_VAR).map_err(|_| ConfigError::MissingDeviceList {
        variable: VISIBLE_DEVICES_VAR,
    })?;
    let devices = parse_visible_devices(&value);
    info!(visible = ?devices, count = devices.len(), "Visible devices read from environment.");
    Ok(devices)
}
