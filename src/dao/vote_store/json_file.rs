//! Vote store keeping every collection in a pretty-printed JSON file under one data directory.

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};
use tokio::fs;
use tracing::{debug, info};

use crate::dao::{
    models::{MapEntity, PoolEntity, RoundEntity, ScheduleEntity, WatchEntity},
    storage::{StorageError, StorageResult},
    vote_store::{RawCooldowns, VoteStore},
};

const MAPS: &str = "maps";
const POOLS: &str = "pools";
const COOLDOWNS: &str = "cooldowns";
const ROUNDS: &str = "votes";
const SCHEDULES: &str = "schedules";
const WATCH: &str = "watch";

/// Vote store backed by one JSON file per collection.
#[derive(Clone)]
pub struct JsonFileStore {
    root: Arc<PathBuf>,
}

impl JsonFileStore {
    /// Open the store rooted at `root`, creating the directory when missing.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|source| {
            StorageError::unavailable(
                format!("failed to create data directory `{}`", root.display()),
                source,
            )
        })?;
        info!(path = %root.display(), "using JSON data directory");
        Ok(Self {
            root: Arc::new(root),
        })
    }

    fn load<T>(&self, collection: &'static str) -> BoxFuture<'static, StorageResult<T>>
    where
        T: DeserializeOwned + Serialize + Default + Send + Sync + 'static,
    {
        let path = collection_path(&self.root, collection);
        Box::pin(async move { read_collection(&path, collection).await })
    }

    fn save<T>(&self, collection: &'static str, value: T) -> BoxFuture<'static, StorageResult<()>>
    where
        T: Serialize + Send + Sync + 'static,
    {
        let path = collection_path(&self.root, collection);
        Box::pin(async move { write_collection(&path, &value).await })
    }
}

impl VoteStore for JsonFileStore {
    fn load_maps(&self) -> BoxFuture<'static, StorageResult<Vec<MapEntity>>> {
        self.load(MAPS)
    }

    fn load_pools(&self) -> BoxFuture<'static, StorageResult<Vec<PoolEntity>>> {
        self.load(POOLS)
    }

    fn load_cooldowns(&self) -> BoxFuture<'static, StorageResult<RawCooldowns>> {
        self.load(COOLDOWNS)
    }

    fn save_cooldowns(
        &self,
        cooldowns: BTreeMap<String, u32>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.save(COOLDOWNS, cooldowns)
    }

    fn load_rounds(&self) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        self.load(ROUNDS)
    }

    fn save_rounds(&self, rounds: Vec<RoundEntity>) -> BoxFuture<'static, StorageResult<()>> {
        self.save(ROUNDS, rounds)
    }

    fn load_schedules(&self) -> BoxFuture<'static, StorageResult<Vec<ScheduleEntity>>> {
        self.load(SCHEDULES)
    }

    fn save_schedules(
        &self,
        schedules: Vec<ScheduleEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.save(SCHEDULES, schedules)
    }

    fn load_watch(&self) -> BoxFuture<'static, StorageResult<WatchEntity>> {
        self.load(WATCH)
    }

    fn save_watch(&self, watch: WatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.save(WATCH, watch)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let root = self.root.clone();
        Box::pin(async move {
            let metadata = fs::metadata(root.as_path()).await.map_err(|source| {
                StorageError::unavailable(
                    format!("data directory `{}` is not reachable", root.display()),
                    source,
                )
            })?;
            if metadata.permissions().readonly() {
                return Err(StorageError::unavailable(
                    format!("data directory `{}` is read-only", root.display()),
                    std::io::Error::from(ErrorKind::PermissionDenied),
                ));
            }
            Ok(())
        })
    }
}

fn collection_path(root: &Path, collection: &str) -> PathBuf {
    root.join(format!("{collection}.json"))
}

/// Read a collection, seeding the file with `T::default()` when it does not exist yet.
async fn read_collection<T>(path: &Path, collection: &'static str) -> StorageResult<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|source| StorageError::Corrupt { collection, source }),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "collection missing; seeding default");
            let value = T::default();
            write_collection(path, &value).await?;
            Ok(value)
        }
        Err(err) => Err(StorageError::unavailable(
            format!("failed to read `{}`", path.display()),
            err,
        )),
    }
}

/// Replace a collection atomically by writing a sibling temp file and renaming it.
async fn write_collection<T>(path: &Path, value: &T) -> StorageResult<()>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec_pretty(value).map_err(|source| {
        StorageError::unavailable(format!("failed to encode `{}`", path.display()), source)
    })?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, payload).await.map_err(|source| {
        StorageError::unavailable(format!("failed to write `{}`", tmp.display()), source)
    })?;
    fs::rename(&tmp, path).await.map_err(|source| {
        StorageError::unavailable(format!("failed to replace `{}`", path.display()), source)
    })?;

    Ok(())
}
