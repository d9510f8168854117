pub mod cooldowns;
/// Map catalog entries, pools and candidate selection.
pub mod pool;
pub mod resolution;
/// Vote rounds and ballots.
pub mod round;

use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};

use dashmap::DashMap;
use rand::rngs::StdRng;
use tokio::sync::{Mutex, Notify};

use crate::{
    config::ConfigHandle,
    dao::vote_store::VoteStore,
    services::{game_server::GameServerClient, publisher::RoundPublisher},
    state::round::RoundId,
};

/// Handle to the application state shared across tasks.
pub type SharedState = Arc<AppState>;

/// Locks serializing read-modify-write cycles on each persisted collection.
///
/// When several are needed they are taken in declaration order, after the round lock.
#[derive(Default)]
pub struct CollectionLocks {
    /// Guards `votes.json`.
    pub rounds: Mutex<()>,
    /// Guards `cooldowns.json`.
    pub cooldowns: Mutex<()>,
    /// Guards `schedules.json`.
    pub schedules: Mutex<()>,
}

/// Central application state shared by the HTTP layer and the background tasks.
pub struct AppState {
    config: ConfigHandle,
    store: Arc<dyn VoteStore>,
    game_server: RwLock<Arc<dyn GameServerClient>>,
    publisher: Arc<dyn RoundPublisher>,
    rng: StdMutex<StdRng>,
    locks: CollectionLocks,
    round_locks: DashMap<RoundId, Arc<Mutex<()>>>,
    schedule_reload: Notify,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(
        config: ConfigHandle,
        store: Arc<dyn VoteStore>,
        game_server: Arc<dyn GameServerClient>,
        publisher: Arc<dyn RoundPublisher>,
        rng: StdRng,
    ) -> SharedState {
        Arc::new(Self {
            config,
            store,
            game_server: RwLock::new(game_server),
            publisher,
            rng: StdMutex::new(rng),
            locks: CollectionLocks::default(),
            round_locks: DashMap::new(),
            schedule_reload: Notify::new(),
        })
    }

    /// Reloadable configuration.
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Persistence backend.
    pub fn store(&self) -> Arc<dyn VoteStore> {
        self.store.clone()
    }

    /// Client used for the current operation.
    pub fn game_server(&self) -> Arc<dyn GameServerClient> {
        self.game_server
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap the game-server client used by subsequent operations.
    pub fn replace_game_server(&self, client: Arc<dyn GameServerClient>) {
        *self
            .game_server
            .write()
            .unwrap_or_else(PoisonError::into_inner) = client;
    }

    /// Chat publisher for round messages.
    pub fn publisher(&self) -> Arc<dyn RoundPublisher> {
        self.publisher.clone()
    }

    /// Per-collection locks.
    pub fn locks(&self) -> &CollectionLocks {
        &self.locks
    }

    /// Run `f` with exclusive access to the shared random source.
    pub fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *rng)
    }

    /// Lock serializing ballots and the close of one round.
    pub fn round_lock(&self, id: RoundId) -> Arc<Mutex<()>> {
        self.round_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the lock of round `id` when nobody holds a handle to it any more.
    ///
    /// Callers drop their own handle from [`AppState::round_lock`] first.
    pub fn release_round_lock(&self, id: RoundId) {
        self.round_locks
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of rounds with a live lock.
    #[cfg(test)]
    pub(crate) fn round_lock_count(&self) -> usize {
        self.round_locks.len()
    }

    /// Ask the scheduler to rebuild its jobs as soon as possible.
    pub fn request_schedule_reload(&self) {
        self.schedule_reload.notify_one();
    }

    /// Resolve once a reload has been requested.
    pub async fn schedule_reload_requested(&self) {
        self.schedule_reload.notified().await;
    }
}
