//! Request/response logging.
//!
//! Each request is given a [`RequestTrace`] on arrival; the matching
//! response line carries the same number and the time spent handling it.
//! Identity tokens are never logged, only whether the caller sent one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    Data, Orbit, Request, Response, Rocket,
};

use crate::model::api::caller::IDENTITY_HEADER;

static NEXT_TRACE: AtomicU64 = AtomicU64::new(0);

/// Per-request bookkeeping, kept in the request-local cache.
#[derive(Debug, Clone, Copy)]
pub struct RequestTrace {
    pub seq: u64,
    received: Instant,
}

impl RequestTrace {
    fn start() -> Self {
        Self {
            seq: NEXT_TRACE.fetch_add(1, Ordering::Relaxed),
            received: Instant::now(),
        }
    }

    fn of(req: &Request<'_>) -> Self {
        *req.local_cache(Self::start)
    }

    fn elapsed(&self) -> Duration {
        self.received.elapsed()
    }
}

/// Name of the handler that produced the response, or `-` for catchers.
fn handler_label(req: &Request<'_>) -> String {
    req.route()
        .map(|route| match route.name.as_deref() {
            Some(name) => format!("{name} ({})", route.uri),
            None => route.uri.to_string(),
        })
        .unwrap_or_else(|| "-".to_string())
}

/// Logs one line per request and one per response.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Request log",
            kind: Kind::Liftoff | Kind::Request | Kind::Response,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let config = rocket.config();
        info!(
            "{} routes listening on {}:{}",
            rocket.routes().count(),
            config.address,
            config.port
        );
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let trace = RequestTrace::of(req);
        let caller = if req.headers().contains(IDENTITY_HEADER) {
            "identified"
        } else {
            "anonymous"
        };
        info!("#{} {} {} [{caller}]", trace.seq, req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let trace = RequestTrace::of(req);
        let status = res.status();
        let line = format!(
            "#{} {status} via {} in {}ms",
            trace.seq,
            handler_label(req),
            trace.elapsed().as_millis()
        );
        match status.class() {
            StatusClass::ServerError => error!("{line}"),
            StatusClass::ClientError => warn!("{line}"),
            _ => debug!("{line}"),
        }
    }
}
