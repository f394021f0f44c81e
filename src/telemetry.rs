//! Structured logging and per-request correlation ids.
//!
//! [`init_tracing`] installs the global subscriber (JSON by default, `pretty`
//! or `compact` on request) and bridges `log::` records into it. Each HTTP
//! request runs inside a [`TraceContext`] so error bodies and log lines can
//! carry the same `trace_id`.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use log::LevelFilter;
use thiserror::Error;
use tokio::task_local;
use tracing::Instrument;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::Layer,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::AppConfig;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 128;

/// Directives appended to the configured level; SQL statements are logged by
/// sqlx at `debug` and drown everything else.
const QUIET_DEPENDENCIES: &[&str] = &["sqlx=warn", "hyper=info", "h2=info"];

#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
}

task_local! {
    static ACTIVE_TRACE_CONTEXT: TraceContext;
}

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter { directive: String, message: String },
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static TELEMETRY_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// `RUST_LOG` wins when set; otherwise the configured level plus
/// [`QUIET_DEPENDENCIES`].
fn build_filter(log_level: &str) -> Result<EnvFilter, TelemetryInitError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directive = log_level.trim().to_string();
    for quiet in QUIET_DEPENDENCIES {
        directive.push(',');
        directive.push_str(quiet);
    }
    EnvFilter::try_new(&directive).map_err(|e| TelemetryInitError::InvalidFilter {
        directive,
        message: e.to_string(),
    })
}

/// Installs the global subscriber once; later calls are no-ops.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if TELEMETRY_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    let filter = match build_filter(&config.log_level) {
        Ok(filter) => filter,
        Err(err) => {
            TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst);
            return Err(err);
        }
    };

    // sea-orm and sqlx log through `log::`
    if let Err(err) = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()
    {
        eprintln!("Warning: log bridge not installed ({err}); `log::` records will not reach tracing.");
    }

    let fmt_layer = match config.log_format.as_str() {
        "pretty" => fmt::layer().pretty().boxed(),
        "compact" => fmt::layer().compact().boxed(),
        _ => fmt::layer().json().flatten_event(true).boxed(),
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
    {
        TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(err.into());
    }

    Ok(())
}

/// Runs `future` with `context` readable through [`current_trace_id`].
pub async fn with_trace_context<Fut, R>(context: TraceContext, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    ACTIVE_TRACE_CONTEXT.scope(context, future).await
}

pub fn current_trace_id() -> Option<String> {
    ACTIVE_TRACE_CONTEXT
        .try_with(|ctx| ctx.trace_id.clone())
        .ok()
}

fn inbound_request_id(request: &Request) -> Option<String> {
    request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
}

/// Scopes each request in a [`TraceContext`] and a `request` span.
///
/// An inbound `x-request-id` is reused when it is short printable ASCII;
/// otherwise a fresh UUID is minted. The id is echoed on the response.
pub async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let trace_id =
        inbound_request_id(&request).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let span = tracing::info_span!(
        "request",
        trace_id = %trace_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let context = TraceContext {
        trace_id: trace_id.clone(),
    };
    request.extensions_mut().insert(context.clone());

    let mut response = with_trace_context(context, next.run(request))
        .instrument(span)
        .await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn trace_id_visible_inside_scope_only() {
        assert!(current_trace_id().is_none());

        let seen = with_trace_context(
            TraceContext {
                trace_id: "req-123".into(),
            },
            async { current_trace_id() },
        )
        .await;

        assert_eq!(seen.as_deref(), Some("req-123"));
        assert!(current_trace_id().is_none());
    }

    #[test]
    fn oversized_or_blank_request_ids_are_ignored() {
        let request = |value: &str| {
            Request::builder()
                .header(REQUEST_ID_HEADER, value)
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(inbound_request_id(&request(" abc ")).as_deref(), Some("abc"));
        assert!(inbound_request_id(&request("   ")).is_none());
        assert!(inbound_request_id(&request(&"x".repeat(200))).is_none());
    }

    #[test]
    fn configured_level_gets_quiet_dependency_directives() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = build_filter("debug").unwrap().to_string();
        assert!(filter.contains("sqlx=warn"));
        assert!(build_filter("campaigniq=loud").is_err());
    }
}
