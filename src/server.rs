use crate::error::{Error, Result};
use crate::metrics::PrometheusSink;
use crate::poller::CycleReport;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

pub const METRICS_PATH: &str = "/metrics";

pub struct AppState {
    pub host: String,
    pub desc: String,
    pub sink: Arc<PrometheusSink>,
    pub reports: watch::Receiver<Option<CycleReport>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route(METRICS_PATH, get(metrics))
        .with_state(Arc::new(state))
}

/// Serves the router on an already bound listener until the process ends.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr()?;
    log::info!("Serving metrics on http://{}{}", addr, METRICS_PATH);

    axum::serve(listener, router(state))
        .await
        .map_err(Error::Io)
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.sink.gather_text() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            log::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let last_cycle = match state.reports.borrow().as_ref() {
        Some(report) => format!(
            "<p>Last scrape {} ({} pipes, {} datasets)</p>",
            report.finished_at.to_rfc3339(),
            report.pipes.emitted,
            report.datasets.emitted
        ),
        None => "<p>No scrape completed yet</p>".to_string(),
    };

    Html(format!(
        "<html>\n<head><title>Sesam Exporter</title></head>\n<body>\n\
         <h1>Sesam Exporter</h1>\n<p>{} ({})</p>\n{}\n\
         <p><a href='{}'>Metrics</a></p>\n</body>\n</html>\n",
        escape(&state.desc),
        escape(&state.host),
        last_cycle,
        METRICS_PATH
    ))
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&#39;")
        .replace('"', "&quot;")
}
