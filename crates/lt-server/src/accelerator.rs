//! Ownership token for the single shared accelerator.

/// Exclusive claim on the accelerator a sweep runs against.
///
/// Not `Clone`. A [`crate::PoolHandle`] borrows the token mutably, so two
/// live pools cannot coexist.
#[derive(Debug)]
pub struct AcceleratorToken {
    device: Option<String>,
    leases: u64,
}

impl AcceleratorToken {
    /// `device` is exported to spawned servers (e.g. `"0"` for the first GPU);
    /// `None` leaves device selection to the server.
    pub fn new(device: Option<String>) -> Self {
        Self { device, leases: 0 }
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Number of pools that have been granted this accelerator so far.
    pub fn leases(&self) -> u64 {
        self.leases
    }

    pub(crate) fn record_lease(&mut self) {
        self.leases += 1;
    }
}

impl Default for AcceleratorToken {
    fn default() -> Self {
        Self::new(None)
    }
}
