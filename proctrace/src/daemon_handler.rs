use crate::logger;
use daemonize::Daemonize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("failed to daemonize: {0}")]
    Daemonize(#[from] daemonize::Error),
    #[error("failed to initialize logging: {0}")]
    Logging(anyhow::Error),
}

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub pid_file: PathBuf,
    pub log_directory: PathBuf,
    pub working_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            pid_file: PathBuf::from("/tmp/proctrace.pid"),
            log_directory: PathBuf::from("/tmp/proctrace"),
            working_dir: PathBuf::from("/"),
        }
    }
}

/// Detaches, switches logging to the daemon's log directory and runs
/// `core_logic_fn` in the child. The parent never returns from here on
/// success; `daemonize` exits it.
pub fn run_as_daemon<F, R>(
    daemon_config: &DaemonConfig,
    log_level: Option<&str>,
    core_logic_fn: F,
) -> Result<R, DaemonError>
where
    F: FnOnce() -> R,
{
    println!("Starting the daemon process");
    println!("PID file: {:?}", daemon_config.pid_file);
    println!("Log directory: {:?}", daemon_config.log_directory);

    std::fs::create_dir_all(&daemon_config.log_directory)?;
    let daemonizer = Daemonize::new()
        .pid_file(&daemon_config.pid_file)
        .chown_pid_file(false)
        .working_directory(&daemon_config.working_dir)
        .umask(0o027);

    daemonizer.start()?;

    let log_guard = logger::init_daemon_logging(&daemon_config.log_directory, log_level)
        .map_err(DaemonError::Logging)?;

    let result = core_logic_fn();

    // flush the non-blocking writer before the process goes away
    drop(log_guard);
    Ok(result)
}
