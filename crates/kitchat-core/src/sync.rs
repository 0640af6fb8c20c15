use std::sync::mpsc::Sender;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, warn};

use crate::api::ChatApi;
use crate::config::CoreConfig;
use crate::constants::{BROADCAST_KEY, GROUP_PREFIX};
use crate::models::{now_millis, CreateMessageRequest, IdentitySnapshot, MessageRecord};
use crate::stats::SharedSyncStats;

/// Instructions for the sync worker.
#[derive(Debug)]
pub enum SyncCommand {
    /// Create the message on the server; the store already holds the
    /// provisional entry under `provisional_id`.
    SendMessage {
        provisional_id: String,
        request: CreateMessageRequest,
    },
    DeleteMessage {
        id: String,
    },
    /// Replace the set of direct peers polled in addition to broadcast,
    /// groups and the session's own inbound key.
    SetWatchTargets(Vec<String>),
    TriggerSync,
    RefreshIdentity,
    Shutdown,
}

/// State shipped back to the store-owning thread. All store mutation
/// happens there; the worker only talks to the network.
#[derive(Debug)]
pub enum DataChange {
    /// Complete listing for one poll target.
    Listing {
        target: String,
        records: Vec<MessageRecord>,
    },
    /// Authoritative record for a single message (send acknowledgement).
    Record(MessageRecord),
    SendFailed {
        provisional_id: String,
    },
    Identity(IdentitySnapshot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Idle,
    Fetching,
}

/// Polling worker. Runs on its own thread with a current-thread tokio
/// runtime; one fetch cycle is in flight at most (ticks landing while
/// `Fetching` are dropped).
pub struct SyncWorker {
    api: ChatApi,
    username: String,
    poll_interval: std::time::Duration,
    identity_refresh: std::time::Duration,
    command_rx: Option<UnboundedReceiver<SyncCommand>>,
    data_tx: Sender<DataChange>,
    stats: SharedSyncStats,
    state: SyncState,
    identity: IdentitySnapshot,
    direct_watches: Vec<String>,
}

impl SyncWorker {
    pub fn new(
        config: &CoreConfig,
        command_rx: UnboundedReceiver<SyncCommand>,
        data_tx: Sender<DataChange>,
        stats: SharedSyncStats,
    ) -> Self {
        Self {
            api: ChatApi::new(config.base_url.clone()),
            username: config.username.clone(),
            poll_interval: config.poll_interval,
            identity_refresh: config.identity_refresh,
            command_rx: Some(command_rx),
            data_tx,
            stats,
            state: SyncState::Idle,
            identity: IdentitySnapshot::new(&config.username),
            direct_watches: Vec::new(),
        }
    }

    pub fn run(self) {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(err) => {
                error!("failed to build sync runtime: {err}");
                return;
            }
        };
        rt.block_on(self.run_loop());
    }

    async fn run_loop(mut self) {
        let mut command_rx = self
            .command_rx
            .take()
            .expect("run_loop called more than once");

        let mut poll_tick = tokio::time::interval(self.poll_interval);
        poll_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut identity_tick = tokio::time::interval(self.identity_refresh);

        loop {
            tokio::select! {
                _ = identity_tick.tick() => self.refresh_identity().await,
                _ = poll_tick.tick() => self.poll_once().await,
                command = command_rx.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!("sync worker stopped");
    }

    async fn handle_command(&mut self, command: SyncCommand) -> bool {
        match command {
            SyncCommand::SendMessage {
                provisional_id,
                request,
            } => self.send_message(provisional_id, request).await,
            SyncCommand::DeleteMessage { id } => self.delete_message(&id).await,
            SyncCommand::SetWatchTargets(peers) => self.direct_watches = peers,
            SyncCommand::TriggerSync => self.poll_once().await,
            SyncCommand::RefreshIdentity => self.refresh_identity().await,
            SyncCommand::Shutdown => return false,
        }
        true
    }

    /// One fetch cycle over every watch target. Failures are logged and
    /// abandoned; the next tick is the retry.
    async fn poll_once(&mut self) {
        if self.state == SyncState::Fetching {
            return;
        }
        self.state = SyncState::Fetching;

        for target in self.watch_targets() {
            match self.api.list_messages(&target).await {
                Ok(records) => {
                    self.stats.record_poll(records.len(), now_millis());
                    let _ = self.data_tx.send(DataChange::Listing { target, records });
                }
                Err(err) => {
                    self.stats.record_poll_failure();
                    warn!("message poll for '{target}' failed: {err}");
                }
            }
        }

        self.state = SyncState::Idle;
    }

    async fn send_message(&mut self, provisional_id: String, request: CreateMessageRequest) {
        match self.api.create_message(&request).await {
            Ok(response) => {
                self.stats.record_send(true);
                let record = request.into_record(response);
                let _ = self.data_tx.send(DataChange::Record(record));
            }
            Err(err) => {
                self.stats.record_send(false);
                warn!("message send failed, rolling back {provisional_id}: {err}");
                let _ = self.data_tx.send(DataChange::SendFailed { provisional_id });
            }
        }
    }

    async fn delete_message(&mut self, id: &str) {
        match self.api.delete_message(id).await {
            Ok(()) => self.stats.record_delete(),
            Err(err) => warn!("delete of message {id} failed: {err}"),
        }
    }

    async fn refresh_identity(&mut self) {
        let friends = match self.api.fetch_friends(&self.username).await {
            Ok(friends) => friends,
            Err(err) => {
                warn!("friends refresh failed: {err}");
                return;
            }
        };
        let groups = match self.api.fetch_groups(&self.username).await {
            Ok(groups) => groups,
            Err(err) => {
                warn!("groups refresh failed: {err}");
                return;
            }
        };
        let snapshot = IdentitySnapshot::from_wire(&self.username, friends, groups);
        self.identity = snapshot.clone();
        let _ = self.data_tx.send(DataChange::Identity(snapshot));
    }

    /// Poll targets for one cycle: broadcast, the session's own inbound
    /// key, every joined group, and every open direct conversation.
    fn watch_targets(&self) -> Vec<String> {
        let mut targets = vec![BROADCAST_KEY.to_string(), self.username.clone()];
        for group in &self.identity.groups {
            targets.push(format!("{GROUP_PREFIX}{group}"));
        }
        for peer in &self.direct_watches {
            if !targets.contains(peer) {
                targets.push(peer.clone());
            }
        }
        targets
    }
}
