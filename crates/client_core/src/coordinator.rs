//! Single-flight-with-cancel-and-replace orchestration of discovery sessions for one view.

use std::sync::Arc;

use shared::domain::{AccountId, DiscoveryRequest, Generation};
use thiserror::Error;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    aggregator::{AggregateOutcome, FanInAggregator},
    session::{Account, RoomDiscoverySession},
    sink::ViewModelSink,
};

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Buffer size of the service and room streams handed to accounts.
    pub channel_capacity: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("no account is selected in this room browser view")]
    NoAccount,
    #[error("room browser view is closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Finished {
        generation: Generation,
        outcome: AggregateOutcome,
    },
    /// A newer start was issued before this one acquired the update lock.
    Superseded,
}

#[derive(Default)]
struct AccountSelection {
    accounts: Vec<Arc<dyn Account>>,
    active: Option<usize>,
}

impl AccountSelection {
    fn active_account(&self) -> Option<Arc<dyn Account>> {
        self.active
            .and_then(|index| self.accounts.get(index))
            .map(Arc::clone)
    }
}

#[derive(Default)]
struct Inflight {
    ticket: u64,
    cancel: Option<CancellationToken>,
}

pub struct RequestCoordinator {
    sink: Arc<ViewModelSink>,
    config: DiscoveryConfig,
    update_lock: Arc<Mutex<()>>,
    inflight: Mutex<Inflight>,
    selection: Mutex<AccountSelection>,
    custom_service: Mutex<String>,
    closed: CancellationToken,
}

impl RequestCoordinator {
    pub fn new(sink: Arc<ViewModelSink>, config: DiscoveryConfig) -> Arc<Self> {
        Arc::new(Self {
            sink,
            config,
            update_lock: Arc::new(Mutex::new(())),
            inflight: Mutex::new(Inflight::default()),
            selection: Mutex::new(AccountSelection::default()),
            custom_service: Mutex::new(String::new()),
            closed: CancellationToken::new(),
        })
    }

    pub fn sink(&self) -> &Arc<ViewModelSink> {
        &self.sink
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Runs one discovery request to completion, replacing whatever request is in flight.
    ///
    /// The previous session is only signalled; this call then waits on the update lock, which
    /// the previous session releases as soon as its fan-in loop notices the cancellation.
    pub async fn start(&self, account: Arc<dyn Account>) -> SessionOutcome {
        let ticket = self.supersede_inflight().await;
        self.run(ticket, account).await
    }

    /// Takes a new ticket and signals the in-flight session, without waiting for it.
    async fn supersede_inflight(&self) -> u64 {
        let mut inflight = self.inflight.lock().await;
        inflight.ticket += 1;
        if let Some(previous) = inflight.cancel.take() {
            previous.cancel();
        }
        inflight.ticket
    }

    async fn run(&self, ticket: u64, account: Arc<dyn Account>) -> SessionOutcome {
        let update_guard = Arc::clone(&self.update_lock).lock_owned().await;

        let cancel = {
            let mut inflight = self.inflight.lock().await;
            if inflight.ticket != ticket {
                debug!(
                    ticket,
                    latest = inflight.ticket,
                    "discovery request superseded before it started"
                );
                return SessionOutcome::Superseded;
            }
            let cancel = self.closed.child_token();
            inflight.cancel = Some(cancel.clone());
            cancel
        };

        let generation = self.sink.begin_generation().await;
        let custom_service = self.custom_service.lock().await.clone();
        let request = DiscoveryRequest::new(account.service_host(), Some(custom_service));
        info!(
            account = %account.id(),
            host = %request.service_host,
            %generation,
            "starting public room discovery"
        );

        let session = RoomDiscoverySession::start(
            account.as_ref(),
            request,
            generation,
            cancel,
            self.config.channel_capacity,
        )
        .await;
        let outcome = FanInAggregator::new(Arc::clone(&self.sink), generation)
            .run(session)
            .await;

        {
            let mut inflight = self.inflight.lock().await;
            if inflight.ticket == ticket {
                inflight.cancel = None;
            }
        }
        drop(update_guard);

        SessionOutcome::Finished {
            generation,
            outcome,
        }
    }

    /// Trigger entry point: cancels the in-flight session right away, then runs the new one on
    /// its own task.
    async fn spawn_start(
        self: &Arc<Self>,
        account: Arc<dyn Account>,
    ) -> JoinHandle<SessionOutcome> {
        let ticket = self.supersede_inflight().await;
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run(ticket, account).await })
    }

    /// Initial view open: remembers the accounts and browses with the first one.
    pub async fn open(
        self: &Arc<Self>,
        accounts: Vec<Arc<dyn Account>>,
    ) -> Option<JoinHandle<SessionOutcome>> {
        self.replace_accounts(accounts).await;
        let account = {
            let mut selection = self.selection.lock().await;
            if selection.accounts.is_empty() {
                return None;
            }
            selection.active = Some(0);
            selection.active_account()
        }?;
        Some(self.spawn_start(account).await)
    }

    /// Account selector changed. Out-of-range or unchanged selections are ignored.
    pub async fn select_account(
        self: &Arc<Self>,
        index: usize,
    ) -> Option<JoinHandle<SessionOutcome>> {
        if self.is_closed() {
            return None;
        }
        let account = {
            let mut selection = self.selection.lock().await;
            if index >= selection.accounts.len() || selection.active == Some(index) {
                debug!(index, active = ?selection.active, "ignoring account selection");
                return None;
            }
            selection.active = Some(index);
            selection.active_account()
        }?;
        Some(self.spawn_start(account).await)
    }

    pub async fn refresh(self: &Arc<Self>) -> Result<JoinHandle<SessionOutcome>, CoordinatorError> {
        if self.is_closed() {
            return Err(CoordinatorError::Closed);
        }
        let account = self
            .selection
            .lock()
            .await
            .active_account()
            .ok_or(CoordinatorError::NoAccount)?;
        Ok(self.spawn_start(account).await)
    }

    pub async fn set_custom_service(&self, service: impl Into<String>) {
        *self.custom_service.lock().await = service.into();
    }

    /// The custom service entry was submitted: browse that service with the active account.
    pub async fn submit_custom_service(
        self: &Arc<Self>,
        service: impl Into<String>,
    ) -> Result<JoinHandle<SessionOutcome>, CoordinatorError> {
        self.set_custom_service(service).await;
        self.refresh().await
    }

    /// Re-derives the account list, keeping the active account selected when it is still present.
    /// Never starts a request by itself.
    pub async fn replace_accounts(&self, accounts: Vec<Arc<dyn Account>>) {
        let mut selection = self.selection.lock().await;
        if accounts.is_empty() {
            selection.accounts.clear();
            selection.active = None;
            drop(selection);
            self.supersede_inflight().await;
            info!("no connected accounts available for room browsing");
            self.sink.show_no_accounts().await;
            return;
        }

        let previous: Option<AccountId> = selection.active_account().map(|account| account.id());
        let active = previous
            .as_ref()
            .and_then(|id| accounts.iter().position(|account| &account.id() == id))
            .unwrap_or(0);
        debug!(
            accounts = accounts.len(),
            active,
            previous = ?previous,
            "replaced room browser accounts"
        );
        selection.accounts = accounts;
        selection.active = Some(active);
    }

    /// Follows account-set changes until the view is closed or the sender goes away.
    pub fn observe_accounts(
        self: &Arc<Self>,
        mut accounts: watch::Receiver<Vec<Arc<dyn Account>>>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = coordinator.closed.cancelled() => break,
                    changed = accounts.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let latest = accounts.borrow_and_update().clone();
                        coordinator.replace_accounts(latest).await;
                    }
                }
            }
            debug!("stopped observing connected accounts");
        })
    }

    pub async fn active_account(&self) -> Option<Arc<dyn Account>> {
        self.selection.lock().await.active_account()
    }

    pub async fn active_index(&self) -> Option<usize> {
        self.selection.lock().await.active
    }

    pub async fn account_ids(&self) -> Vec<AccountId> {
        self.selection
            .lock()
            .await
            .accounts
            .iter()
            .map(|account| account.id())
            .collect()
    }

    /// Closes the view: cancels the in-flight session and stops observing accounts.
    pub fn close(&self) {
        info!("closing room browser view");
        self.closed.cancel();
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
