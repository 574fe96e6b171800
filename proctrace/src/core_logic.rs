use crate::{
    channel::{ChannelManager, NetlinkTransport},
    config::AppConfig,
    event_loop::{EventLoop, LoopStats},
    report::Reporter,
    resolver::ProcResolver,
    signal_handler::SignalHandler,
};
use anyhow::Result;
use tracing::{debug, info};

/// Wires the netlink channel, resolver and `reporter` together and blocks
/// until SIGINT/SIGTERM. Connection failures come back as
/// [`LoopError`](crate::event_loop::LoopError) inside the `anyhow::Error`.
pub fn run_monitor<R: Reporter>(config: &AppConfig, reporter: R) -> Result<LoopStats> {
    info!("Application Core Logic: Starting up the process monitor...");

    // handlers first, so a signal during connect is not lost
    let stop = SignalHandler::install()?;

    let transport = NetlinkTransport::new(config.receive_buffer_bytes);
    let channel = ChannelManager::new(transport);
    let resolver = ProcResolver::new(&config.proc_root);
    debug!(
        "Resolving process metadata under {}",
        resolver.root().display()
    );

    let mut event_loop = EventLoop::new(channel, resolver, reporter, stop)
        .report_exits(config.output.report_exits);
    let stats = event_loop.run()?;

    info!("Application Core Logic: Shutdown completed.");
    Ok(stats)
}
