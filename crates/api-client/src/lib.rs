pub mod client;
pub mod connectivity;

pub use client::ApiClient;
pub use connectivity::{
    ConnectivityMonitor, ConnectivityState, ConnectivityStatus, DeviceEvent, PollIntervals,
    ProbeTicket, ServerProbe, run_connectivity_monitor,
};
pub use gantt_api;
