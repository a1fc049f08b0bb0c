use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use crossbeam_channel::unbounded;
use env_logger::Env;
use log::{error, info};

use script_supervisor::app::{auth::AdminList, cli};
use script_supervisor::config::Config;
use script_supervisor::manager::Supervisor;
use script_supervisor::models::message::MonitorMessage;
use script_supervisor::process::OsLauncher;
use script_supervisor::store::{JsonFileStore, StateStore};
use script_supervisor::worker::monitor::spawn_monitor_thread;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // leading \r keeps log lines aligned while the console is in raw mode
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(buf, "\r[{} {}] {}", record.level(), record.target(), record.args())
        })
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    let backend = JsonFileStore::new(&config.state_file);
    info!("Using state file {}", backend.path().display());

    let store = StateStore::new(backend);
    let launcher = Arc::new(OsLauncher::new(&config.interpreter));
    let supervisor = Arc::new(Supervisor::new(store, launcher));
    supervisor.reconcile().context("failed to reconcile stored scripts")?;

    let (sender, receiver) = unbounded();
    let monitor = spawn_monitor_thread(Arc::clone(&supervisor), receiver, config.sweep_interval);

    let console = cli::Console::new(
        Arc::clone(&supervisor),
        Box::new(AdminList::new(config.admins.clone())),
        &config.scripts_dir,
        config.tenant.clone(),
    )
    .with_monitor(sender.clone());
    let result = cli::run_cli(console);

    if sender.send(MonitorMessage::Shutdown).is_ok() && monitor.join().is_err() {
        error!("Monitor thread panicked.");
    }
    result.context("console failed")
}
