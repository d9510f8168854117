/// Persisted record definitions.
pub mod models;
/// Storage error types shared by every backend.
pub mod storage;
/// Collection storage for maps, pools, cooldowns, rounds and schedules.
pub mod vote_store;
