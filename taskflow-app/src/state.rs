/// Shared clients handed to the session root and the gesture layer.

use std::sync::Arc;
use std::time::Duration;

use taskflow_core::clock::{Clock, SystemClock};
use taskflow_core::storage::memory::MemoryStore;
use taskflow_core::storage::RemoteStore;

use crate::auth::{AuthProvider, MemoryAuth};
use crate::config::TaskflowConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RemoteStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub clock: Arc<dyn Clock>,
    pub timer_tick: Duration,
}

impl AppState {
    /// In-process store and accounts, sized from the config.
    pub fn in_memory(config: &TaskflowConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = MemoryStore::with_clock(clock.clone()).with_channel_capacity(config.snapshot_buffer);
        Self {
            store: Arc::new(store),
            auth: Arc::new(MemoryAuth::new()),
            clock,
            timer_tick: Duration::from_millis(config.timer_tick_ms.max(1)),
        }
    }
}
