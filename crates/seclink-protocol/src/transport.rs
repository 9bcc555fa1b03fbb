//! Transport channel seam.
//!
//! The router never touches hardware or sockets: each [`LinkType`] is backed
//! by a [`LinkChannel`] supplied by the embedding system (USB/BLE bridge,
//! satellite modem driver, TLS client). [`RecordingChannel`] is an in-memory
//! stand-in for tests and demos.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ChannelError;
use crate::types::{LinkType, MemberId};

/// One physical delivery path.
///
/// Implementations own their own timeouts and cancellation; the router
/// calls `send` once and reports the result as-is.
#[async_trait::async_trait]
pub trait LinkChannel: Send + Sync {
    async fn send(&self, destination: &MemberId, data: &[u8]) -> Result<(), ChannelError>;
}

/// Exactly one channel per link type.
#[derive(Clone)]
pub struct ChannelSet {
    direct_cell: Arc<dyn LinkChannel>,
    secure_device: Arc<dyn LinkChannel>,
    satellite: Arc<dyn LinkChannel>,
}

impl ChannelSet {
    pub fn new(
        direct_cell: Arc<dyn LinkChannel>,
        secure_device: Arc<dyn LinkChannel>,
        satellite: Arc<dyn LinkChannel>,
    ) -> Self {
        Self {
            direct_cell,
            secure_device,
            satellite,
        }
    }

    pub fn channel(&self, link: LinkType) -> &dyn LinkChannel {
        match link {
            LinkType::DirectCell => self.direct_cell.as_ref(),
            LinkType::SecureDevice => self.secure_device.as_ref(),
            LinkType::Satellite => self.satellite.as_ref(),
        }
    }
}

impl std::fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSet").finish_non_exhaustive()
    }
}

// ── RecordingChannel ───────────────────────────────────────────────────

/// In-memory channel that records every hand-off.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    sent: Arc<Mutex<Vec<(MemberId, Vec<u8>)>>>,
    fail_with: Arc<Mutex<Option<String>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<(MemberId, Vec<u8>)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Make subsequent sends fail with `reason` (`None` to recover).
    pub fn set_failure(&self, reason: Option<&str>) {
        *self.fail_with.lock().unwrap_or_else(PoisonError::into_inner) =
            reason.map(str::to_string);
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// A full [`ChannelSet`] of fresh recording channels, returned alongside
    /// handles to each (direct, secure device, satellite).
    pub fn set() -> (ChannelSet, [RecordingChannel; 3]) {
        let direct = RecordingChannel::new();
        let device = RecordingChannel::new();
        let satellite = RecordingChannel::new();
        let set = ChannelSet::new(
            Arc::new(direct.clone()),
            Arc::new(device.clone()),
            Arc::new(satellite.clone()),
        );
        (set, [direct, device, satellite])
    }
}

#[async_trait::async_trait]
impl LinkChannel for RecordingChannel {
    async fn send(&self, destination: &MemberId, data: &[u8]) -> Result<(), ChannelError> {
        if let Some(reason) = self
            .fail_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(ChannelError::new(reason));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((destination.clone(), data.to_vec()));
        Ok(())
    }
}
