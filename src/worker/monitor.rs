use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{select, tick, Receiver};
use log::{debug, error, info};

use crate::manager::Supervisor;
use crate::models::message::MonitorMessage;

/// Reaps scripts whose process exited on its own, every `interval` and on
/// `MonitorMessage::Sweep`. Stops on `Shutdown` or when all senders are gone.
pub fn spawn_monitor_thread(
    supervisor: Arc<Supervisor>,
    receiver: Receiver<MonitorMessage>,
    interval: Duration) -> JoinHandle<()>
{
    thread::spawn(move || {
        let ticker = tick(interval);
        info!("Monitor started, sweeping every {:?}.", interval);
        loop {
            select! {
                recv(receiver) -> message => match message {
                    Ok(MonitorMessage::Sweep) => handle_sweep(&supervisor),
                    Ok(MonitorMessage::Shutdown) => {
                        info!("Monitor shutting down.");
                        break;
                    }
                    Err(e) => {
                        error!("Monitor channel closed: {}", e);
                        break;
                    }
                },
                recv(ticker) -> _ => handle_sweep(&supervisor),
            }
        }
    })
}

fn handle_sweep(supervisor: &Supervisor) {
    let reaped = supervisor.reap_exited();
    if reaped > 0 {
        info!("Sweep reaped {} exited scripts.", reaped);
    } else {
        debug!("Sweep found no exited scripts.");
    }
}
