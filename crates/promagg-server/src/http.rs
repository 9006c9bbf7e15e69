//! HTTP surface: scrapes, POST writes and the declaration dump.

use std::io;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{Router, get};
use futures::TryStreamExt;
use promagg_core::{CONTENT_TYPE, Observation};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::DECLARATIONS_PATH;
use crate::error::{ServerError, ServerResult};
use crate::ingest::LineHandler;
use crate::transport::BoundListener;

/// Create the HTTP router.
///
/// - `GET <scrape_path>`: the scrape document
/// - `POST <scrape_path>`: newline-separated writes, same protocol as the
///   socket listeners
/// - `GET /declarations`: every family's declaration as JSON
pub fn create_router(handler: LineHandler, scrape_path: &str) -> Router {
    Router::new()
        .route(scrape_path, get(scrape).post(write))
        .route(DECLARATIONS_PATH, get(declarations))
        .with_state(handler)
        .layer(TraceLayer::new_for_http())
}

/// Serves the router on a stream listener until `shutdown` is cancelled,
/// then waits for in-flight requests.
///
/// # Errors
///
/// Returns [`ServerError::InvalidConfig`] for packet listeners and
/// [`ServerError::Http`] if the server fails.
pub async fn serve(
    listener: BoundListener,
    router: Router,
    shutdown: CancellationToken,
) -> ServerResult<()> {
    let local_addr = listener.local_addr();
    info!(local_addr = %local_addr, "listening for scrapes");

    let signal = shutdown.cancelled_owned();
    let served = match listener {
        BoundListener::Tcp(listener) => {
            axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
        }
        BoundListener::Unix(listener, _socket_file) => {
            axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
        }
        BoundListener::Udp(_) | BoundListener::UnixGram(..) => {
            return Err(ServerError::InvalidConfig(format!(
                "{local_addr} is a packet socket and cannot serve HTTP"
            )));
        }
    };
    served.map_err(|e| ServerError::Http(e.to_string()))?;

    info!(local_addr = %local_addr, "scrape listener closed");
    Ok(())
}

/// `GET <scrape_path>`
async fn scrape(State(handler): State<LineHandler>) -> impl IntoResponse {
    let body = handler.universe().render();
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}

/// `POST <scrape_path>`
async fn write(State(handler): State<LineHandler>, body: Body) -> Response {
    let stream = body.into_data_stream().map_err(io::Error::other);
    let outcome = handler.handle_stream(StreamReader::new(stream)).await;

    match outcome.error {
        Some(error) => {
            warn!(error = %error, "rejecting HTTP write in strict mode");
            (StatusCode::BAD_REQUEST, format!("{error}\n")).into_response()
        }
        None => (StatusCode::OK, format!("{outcome}\n")).into_response(),
    }
}

/// `GET /declarations`
async fn declarations(State(handler): State<LineHandler>) -> Json<Vec<Observation>> {
    Json(handler.universe().declarations())
}
