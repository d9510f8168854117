//! In-memory doubles shared by the service tests.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::future::BoxFuture;
use rand::{SeedableRng, rngs::StdRng};
use serde_json::{Value, json};

use crate::{
    config::{AppConfig, ConfigHandle},
    dao::{
        models::{MapEntity, PoolEntity, RoundEntity, ScheduleEntity, WatchEntity},
        storage::{StorageError, StorageResult},
        vote_store::{RawCooldowns, VoteStore},
    },
    services::{
        game_server::{GameServerClient, GameServerError, GameServerResult, RconCommand},
        publisher::{PublishError, RoundPublisher},
    },
    state::{AppState, SharedState, resolution::Resolution, round::VoteRound},
};

/// Vote store keeping every collection in memory.
#[derive(Default)]
pub struct MemoryStore {
    maps: Mutex<Vec<MapEntity>>,
    pools: Mutex<Vec<PoolEntity>>,
    cooldowns: Mutex<RawCooldowns>,
    rounds: Mutex<Vec<RoundEntity>>,
    schedules: Mutex<Vec<ScheduleEntity>>,
    watch: Mutex<WatchEntity>,
    offline: AtomicBool,
    failing_saves: Mutex<HashSet<&'static str>>,
}

impl MemoryStore {
    /// Store seeded with enabled maps whose display name is their code in lowercase.
    pub fn with_maps(codes: &[&str]) -> Self {
        let store = Self::default();
        *store.maps.lock().unwrap() = codes
            .iter()
            .map(|code| MapEntity {
                code: code.to_string(),
                name: code.to_lowercase(),
                enabled: true,
            })
            .collect();
        store
    }

    pub fn set_pools(&self, pools: Vec<PoolEntity>) {
        *self.pools.lock().unwrap() = pools;
    }

    pub fn set_cooldowns(&self, cooldowns: &[(&str, u32)]) {
        *self.cooldowns.lock().unwrap() = cooldowns
            .iter()
            .map(|(code, rounds)| (code.to_string(), json!(rounds)))
            .collect();
    }

    pub fn set_schedules(&self, schedules: Vec<ScheduleEntity>) {
        *self.schedules.lock().unwrap() = schedules;
    }

    pub fn set_rounds(&self, rounds: Vec<RoundEntity>) {
        *self.rounds.lock().unwrap() = rounds;
    }

    /// Make every subsequent call fail as unavailable.
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    /// Make every save of `collection` fail as unavailable; loads keep working.
    pub fn fail_saves(&self, collection: &'static str) {
        self.failing_saves.lock().unwrap().insert(collection);
    }

    pub fn cooldowns(&self) -> RawCooldowns {
        self.cooldowns.lock().unwrap().clone()
    }

    pub fn rounds(&self) -> Vec<RoundEntity> {
        self.rounds.lock().unwrap().clone()
    }

    pub fn schedules(&self) -> Vec<ScheduleEntity> {
        self.schedules.lock().unwrap().clone()
    }

    pub fn watch(&self) -> WatchEntity {
        self.watch.lock().unwrap().clone()
    }

    fn read<T: Clone + Send + 'static>(
        &self,
        slot: &Mutex<T>,
    ) -> BoxFuture<'static, StorageResult<T>> {
        let result = self.check().map(|()| slot.lock().unwrap().clone());
        Box::pin(async move { result })
    }

    fn write<T>(
        &self,
        collection: &'static str,
        slot: &Mutex<T>,
        value: T,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = self
            .check()
            .and_then(|()| self.check_save(collection))
            .map(|()| *slot.lock().unwrap() = value);
        Box::pin(async move { result })
    }

    fn check_save(&self, collection: &'static str) -> StorageResult<()> {
        if self.failing_saves.lock().unwrap().contains(collection) {
            return Err(StorageError::unavailable(
                format!("cannot save {collection}"),
                std::io::Error::other("forced failure"),
            ));
        }
        Ok(())
    }

    fn check(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "memory store offline".into(),
                std::io::Error::other("offline"),
            ));
        }
        Ok(())
    }
}

impl VoteStore for MemoryStore {
    fn load_maps(&self) -> BoxFuture<'static, StorageResult<Vec<MapEntity>>> {
        self.read(&self.maps)
    }

    fn load_pools(&self) -> BoxFuture<'static, StorageResult<Vec<PoolEntity>>> {
        self.read(&self.pools)
    }

    fn load_cooldowns(&self) -> BoxFuture<'static, StorageResult<RawCooldowns>> {
        self.read(&self.cooldowns)
    }

    fn save_cooldowns(
        &self,
        cooldowns: BTreeMap<String, u32>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let raw = cooldowns
            .into_iter()
            .map(|(code, rounds)| (code, json!(rounds)))
            .collect();
        self.write("cooldowns", &self.cooldowns, raw)
    }

    fn load_rounds(&self) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        self.read(&self.rounds)
    }

    fn save_rounds(&self, rounds: Vec<RoundEntity>) -> BoxFuture<'static, StorageResult<()>> {
        self.write("rounds", &self.rounds, rounds)
    }

    fn load_schedules(&self) -> BoxFuture<'static, StorageResult<Vec<ScheduleEntity>>> {
        self.read(&self.schedules)
    }

    fn save_schedules(
        &self,
        schedules: Vec<ScheduleEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.write("schedules", &self.schedules, schedules)
    }

    fn load_watch(&self) -> BoxFuture<'static, StorageResult<WatchEntity>> {
        self.read(&self.watch)
    }

    fn save_watch(&self, watch: WatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.write("watch", &self.watch, watch)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.check();
        Box::pin(async move { result })
    }
}

/// Game server double answering server information and recording every command.
pub struct RecordingGameServer {
    info: Mutex<Value>,
    sent: Mutex<Vec<RconCommand>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl RecordingGameServer {
    pub fn with_rotation(current: Option<&str>, rotation: &[&str]) -> Self {
        Self {
            info: Mutex::new(json!({
                "current_map": current,
                "maprotation": rotation,
                "match_start": null,
            })),
            sent: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Report `marker` as the start of the current match.
    pub fn set_match_marker(&self, marker: Option<&str>) {
        self.info.lock().unwrap()["match_start"] = json!(marker);
    }

    /// Make every `name` command fail as rejected.
    pub fn fail_command(&self, name: &'static str) {
        self.failing.lock().unwrap().insert(name);
    }

    pub fn sent(&self) -> Vec<RconCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent().into_iter().map(|command| command.name).collect()
    }

    /// Maps passed to `AddMapToRotation`, in order.
    pub fn queued_maps(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|command| command.name == "AddMapToRotation")
            .filter_map(|command| command.body["MapName"].as_str().map(str::to_string))
            .collect()
    }

    fn answer(&self, command: &RconCommand) -> GameServerResult<Value> {
        if self.failing.lock().unwrap().contains(command.name) {
            return Err(GameServerError::Rejected {
                command: command.name,
                message: "forced failure".into(),
            });
        }
        match command.name {
            "GetServerInformation" => Ok(self.info.lock().unwrap().clone()),
            _ => Ok(Value::Bool(true)),
        }
    }
}

impl GameServerClient for RecordingGameServer {
    fn execute(&self, command: RconCommand) -> BoxFuture<'static, GameServerResult<Value>> {
        let result = self.answer(&command);
        self.sent.lock().unwrap().push(command);
        Box::pin(async move { result })
    }
}

/// One publication seen by [`RecordingPublisher`].
#[derive(Debug, Clone, PartialEq)]
pub enum Published {
    Round(VoteRound),
    Summary(VoteRound, Option<Resolution>),
}

/// Publisher double collecting what would have been posted.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Published>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn record(&self, what: &'static str, entry: Published) -> Result<(), PublishError> {
        let round_id = match &entry {
            Published::Round(round) | Published::Summary(round, _) => round.id,
        };
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError {
                what,
                round_id,
                message: "forced failure".into(),
            });
        }
        self.published.lock().unwrap().push(entry);
        Ok(())
    }
}

impl RoundPublisher for RecordingPublisher {
    fn post_or_update_round(&self, round: VoteRound) -> BoxFuture<'static, Result<(), PublishError>> {
        let result = self.record("round message", Published::Round(round));
        Box::pin(async move { result })
    }

    fn post_or_update_summary(
        &self,
        round: VoteRound,
        resolution: Option<Resolution>,
    ) -> BoxFuture<'static, Result<(), PublishError>> {
        let result = self.record("summary", Published::Summary(round, resolution));
        Box::pin(async move { result })
    }
}

/// Application state wired to in-memory doubles, with a seeded random source.
pub struct Harness {
    pub state: SharedState,
    pub store: Arc<MemoryStore>,
    pub server: Arc<RecordingGameServer>,
    pub publisher: Arc<RecordingPublisher>,
}

impl Harness {
    pub fn new(maps: &[&str]) -> Self {
        Self::with_config(maps, AppConfig::default())
    }

    pub fn with_config(maps: &[&str], config: AppConfig) -> Self {
        Self::with_handle(maps, ConfigHandle::fixed(config))
    }

    pub fn with_handle(maps: &[&str], config: ConfigHandle) -> Self {
        let store = Arc::new(MemoryStore::with_maps(maps));
        let server = Arc::new(RecordingGameServer::with_rotation(
            Some("STMEREEGLISE"),
            &["STMEREEGLISE", "CARENTAN"],
        ));
        let publisher = Arc::new(RecordingPublisher::default());
        let state = AppState::new(
            config,
            store.clone(),
            server.clone(),
            publisher.clone(),
            StdRng::seed_from_u64(7),
        );
        Self {
            state,
            store,
            server,
            publisher,
        }
    }
}
