//! The sync worker.
//!
//! One dedicated thread drives pulls at the configured cadence and applies
//! remote-URL changes. A tick is structurally an ordinary write operation:
//! the serializer does the pull, the merge, and any required notification.
//! Shutdown drains the in-flight tick for up to the grace window.

use std::sync::Weak;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, bounded, select, tick, unbounded};

use crate::store::GitDataStore;

enum Command {
    UrlChanged(String),
    Shutdown,
}

pub(crate) struct SyncWorker {
    commands: Sender<Command>,
    done: Receiver<()>,
}

impl SyncWorker {
    /// Spawn the worker thread. It holds only a weak reference to the store
    /// and exits on its own once the store is gone.
    pub(crate) fn spawn(store: Weak<GitDataStore>, period: Duration) -> Self {
        let (command_tx, command_rx) = unbounded::<Command>();
        let (done_tx, done_rx) = bounded::<()>(1);
        std::thread::Builder::new()
            .name("fabric-git-sync".to_string())
            .spawn(move || {
                run_sync_loop(store, period, command_rx);
                let _ = done_tx.send(());
            })
            .expect("spawn sync worker");
        Self {
            commands: command_tx,
            done: done_rx,
        }
    }

    pub(crate) fn url_changed(&self, url: String) {
        let _ = self.commands.send(Command::UrlChanged(url));
    }

    /// Stop the worker, waiting up to `grace` for an in-flight tick.
    pub(crate) fn shutdown(self, grace: Duration) {
        let _ = self.commands.send(Command::Shutdown);
        if self.done.recv_timeout(grace).is_err() {
            tracing::warn!("sync worker did not drain within the grace window");
        }
    }
}

fn run_sync_loop(store: Weak<GitDataStore>, period: Duration, commands: Receiver<Command>) {
    let ticker = tick(period);
    loop {
        select! {
            recv(ticker) -> _ => {
                let Some(store) = store.upgrade() else { break };
                tracing::debug!("performing timed pull");
                store.pull();
            }
            recv(commands) -> message => match message {
                Ok(Command::UrlChanged(url)) => {
                    let Some(store) = store.upgrade() else { break };
                    store.apply_remote_url(&url);
                }
                Ok(Command::Shutdown) | Err(_) => break,
            }
        }
    }
}
