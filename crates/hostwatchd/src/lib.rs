//! hostwatchd — HTTP surface of the hostwatch daemon.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/up?host=&path=` | Probe a host now and record the sample |
//! | GET | `/hosts` | Status of every monitored host |
//! | GET | `/roster` | Hosts promoted onto the roster |
//! | GET | `/events?since=&limit=` | Persisted transition events, paged by sequence |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use hostwatch_monitor::QueryService;
use hostwatch_state::EventLog;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub query: QueryService,
    pub events: EventLog,
}

/// Build the API router.
pub fn build_router(query: QueryService, events: EventLog) -> Router {
    Router::new()
        .route("/up", get(handlers::probe_host))
        .route("/hosts", get(handlers::list_hosts))
        .route("/roster", get(handlers::list_roster))
        .route("/events", get(handlers::list_events))
        .with_state(ApiState { query, events })
}
