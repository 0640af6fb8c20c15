use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread::JoinHandle;

use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::events::CoreEvent;
use crate::models::{CreateMessageRequest, Message};
use crate::route::ConversationKey;
use crate::stats::SharedSyncStats;
use crate::store::ChatStore;
use crate::sync::{DataChange, SyncCommand, SyncWorker};

#[derive(Clone)]
pub struct CoreHandle {
    command_tx: UnboundedSender<SyncCommand>,
}

impl CoreHandle {
    pub fn send(&self, command: SyncCommand) -> Result<(), CoreError> {
        self.command_tx
            .send(command)
            .map_err(|_| CoreError::ChannelClosed)
    }
}

/// Apply one worker-produced change to the store.
pub fn apply_change(store: &mut ChatStore, change: DataChange) {
    match change {
        DataChange::Listing { target, records } => store.apply_listing(&target, &records),
        DataChange::Record(record) => store.ingest_record(&record),
        DataChange::SendFailed { provisional_id } => store.fail_send(&provisional_id),
        DataChange::Identity(snapshot) => store.set_identity(snapshot),
    }
}

/// Session root: owns the store, the worker thread and the channels
/// between them. All store access happens on the thread that owns this
/// runtime; the worker only ever talks to it through `DataChange`s.
pub struct CoreRuntime {
    store: Rc<RefCell<ChatStore>>,
    handle: CoreHandle,
    data_rx: Receiver<DataChange>,
    worker_handle: Option<JoinHandle<()>>,
    stats: SharedSyncStats,
    direct_watches: BTreeSet<String>,
}

impl CoreRuntime {
    pub fn new(config: CoreConfig) -> Self {
        let store = Rc::new(RefCell::new(ChatStore::new(
            &config.username,
            config.match_window.as_millis() as u64,
        )));
        let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();
        let (data_tx, data_rx) = std::sync::mpsc::channel();

        let stats = SharedSyncStats::new();
        let worker = SyncWorker::new(&config, command_rx, data_tx, stats.clone());
        let worker_handle = std::thread::spawn(move || worker.run());

        Self {
            store,
            handle: CoreHandle { command_tx },
            data_rx,
            worker_handle: Some(worker_handle),
            stats,
            direct_watches: BTreeSet::new(),
        }
    }

    pub fn handle(&self) -> CoreHandle {
        self.handle.clone()
    }

    pub fn store(&self) -> Rc<RefCell<ChatStore>> {
        self.store.clone()
    }

    pub fn stats(&self) -> SharedSyncStats {
        self.stats.clone()
    }

    /// Drain pending worker changes into the store and return the
    /// notifications they produced.
    pub fn process_pending(&mut self) -> Vec<CoreEvent> {
        let mut store = self.store.borrow_mut();
        loop {
            match self.data_rx.try_recv() {
                Ok(change) => apply_change(&mut store, change),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("sync worker channel closed");
                    break;
                }
            }
        }
        store.drain_events()
    }

    /// Optimistically append the message and queue the server create.
    pub fn send_message(
        &self,
        to: &str,
        input: &str,
        reply_to: Option<String>,
    ) -> Result<Message, CoreError> {
        let message = self.store.borrow_mut().begin_send(to, input, reply_to)?;
        let request = CreateMessageRequest::from_message(&message);
        self.handle.send(SyncCommand::SendMessage {
            provisional_id: message.id.clone(),
            request,
        })?;
        Ok(message)
    }

    /// Remove a message. Confirmed entries are also deleted on the
    /// server; provisional ones never left this client.
    pub fn delete_message(&self, key: &ConversationKey, id: &str) -> Result<bool, CoreError> {
        match self.store.borrow_mut().delete_message(key, id) {
            Some(message) if !message.is_provisional() => {
                self.handle
                    .send(SyncCommand::DeleteMessage { id: message.id })?;
                Ok(true)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    /// Switch the active conversation. Opening a direct conversation
    /// registers its peer as a poll target and triggers a prompt fetch.
    pub fn activate(&mut self, key: ConversationKey) -> Result<(), CoreError> {
        if let ConversationKey::Direct(peer) = &key {
            if self.direct_watches.insert(peer.clone()) {
                self.push_watch_targets()?;
                self.handle.send(SyncCommand::TriggerSync)?;
            }
        }
        self.store.borrow_mut().activate(key);
        Ok(())
    }

    pub fn close_direct(&mut self, peer: &str) -> Result<(), CoreError> {
        if self.direct_watches.remove(peer) {
            self.push_watch_targets()?;
        }
        Ok(())
    }

    pub fn trigger_sync(&self) -> Result<(), CoreError> {
        self.handle.send(SyncCommand::TriggerSync)
    }

    fn push_watch_targets(&self) -> Result<(), CoreError> {
        self.handle.send(SyncCommand::SetWatchTargets(
            self.direct_watches.iter().cloned().collect(),
        ))
    }

    pub fn shutdown(&mut self) {
        let _ = self.handle.send(SyncCommand::Shutdown);
        if let Some(worker_handle) = self.worker_handle.take() {
            let _ = worker_handle.join();
        }
    }
}

impl Drop for CoreRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
