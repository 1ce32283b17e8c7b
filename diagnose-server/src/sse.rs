//! Server-Sent Events stream of diagnostic snapshots.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use diagnose::io::repo::RepoLocator;
use futures::stream::Stream;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// GET /api/repoDiagnostic?org=..&name=.. - stream one diagnosis.
///
/// Every `data:` unit is a full JSON `DiagnosticState`. The stream ends after
/// the unit carrying `"complete": true`.
pub async fn repo_diagnostic_handler(
    State(state): State<AppState>,
    Query(locator): Query<RepoLocator>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(org = %locator.org, name = %locator.name, "diagnosis requested");
    let mut rx = state.start_session(locator);

    let stream = async_stream::stream! {
        while let Some(snapshot) = rx.recv().await {
            let terminal = snapshot.complete;
            match serde_json::to_string(&snapshot) {
                Ok(json) => yield Ok(Event::default().data(json)),
                Err(err) => warn!(error = %err, "failed to encode diagnostic state"),
            }
            if terminal {
                debug!("terminal snapshot sent");
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
