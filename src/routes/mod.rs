use axum::Router;

use crate::state::SharedState;

mod admin;
mod health;
mod rounds;

/// Compose all route trees and wire in the shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(rounds::router())
        .merge(admin::router(state.clone()))
        .with_state(state)
}
