/// Admin operations on configuration and the scheduler.
pub(crate) mod admin_service;
/// Remote game-server administration client and rotation helpers.
pub mod game_server;
/// Health check service.
pub(crate) mod health_service;
/// Starts a vote when the game server reports a new match.
pub mod match_watch;
/// Chat publication of round messages and summaries.
pub mod publisher;
/// Round lifecycle: start, ballots, close and direct map queueing.
pub mod round_service;
/// Timers closing rounds at their end time.
pub mod round_timer;
/// Schedule storage operations.
pub mod schedule_service;
/// Cron-driven round starts.
pub mod scheduler;
