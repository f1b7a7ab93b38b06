//! Upload lifecycle tracking: keep-alive counters and the background monitor.

pub mod keep_alive;
pub mod monitor;

pub use keep_alive::{CollectingLifecycle, HostLifecycle, KeepAlive, KeepAliveState};
pub use monitor::{
    IDLE_CONFIRMATIONS, MonitorAction, MonitorDeps, MonitorEvent, MonitorState, POLL_INTERVAL,
    UploadMonitor,
};
