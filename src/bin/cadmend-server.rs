use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    env,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Instant,
};
use tower_http::cors::{Any, CorsLayer};

use cadmend::ai::{GenerateError, OllamaGenerator, ScriptGenerator};
use cadmend::banner;
use cadmend::config::{GeneratorConfig, PipelineConfig, StoreConfig};
use cadmend::store::{ArtifactSink, DirSink};
use cadmend::{repair_raw, validate_static, RepairOutcome};

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::{
    sync::{Mutex, OwnedSemaphorePermit, Semaphore},
    task,
    time::{timeout, Duration},
};

/* ───────────────────────── App state ───────────────────────── */

struct AppState {
    /// Global permits to cap concurrent pipeline runs.
    pipeline_sem: Arc<Semaphore>,
    /// Optional API key for requests (CADMEND_API_KEY).
    api_key: Option<String>,
    /// Per-IP permits so one client cannot hold every slot.
    per_ip: Mutex<HashMap<IpAddr, IpBucket>>,
    per_ip_max: usize,
    ip_bucket_ttl: Duration,
    pipeline_cfg: PipelineConfig,
    generator_cfg: GeneratorConfig,
    sink: Arc<DirSink>,
}

struct IpBucket {
    sem: Arc<Semaphore>,
    last_seen: Instant,
}

fn forwarded_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;
    for part in xff.split(',').rev() {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Ok(ip) = part.parse::<IpAddr>() {
            return Some(ip);
        }
        if let Ok(sa) = part.parse::<SocketAddr>() {
            return Some(sa.ip());
        }
    }
    None
}

fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> Option<IpAddr> {
    if let Some(ip) = forwarded_client_ip(headers) {
        return Some(ip);
    }

    let peer_ip = peer.ip();
    if peer_ip.is_loopback() || peer_ip.is_unspecified() {
        return None;
    }

    Some(peer_ip)
}

fn api_key_matches(headers: &HeaderMap, expected: &str) -> bool {
    if let Some(value) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        if value.trim() == expected {
            return true;
        }
    }

    if let Some(auth) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        let auth = auth.trim();
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
        {
            if token.trim() == expected {
                return true;
            }
        }
    }

    false
}

impl AppState {
    /// One permit per IP; stale buckets are swept whenever a new IP shows up.
    async fn acquire_per_ip_permit(&self, ip: IpAddr) -> Option<OwnedSemaphorePermit> {
        let sem = {
            let mut table = self.per_ip.lock().await;
            let now = Instant::now();

            if !table.contains_key(&ip) {
                let ttl = self.ip_bucket_ttl;
                let per_ip_max = self.per_ip_max;
                table.retain(|_, bucket| {
                    now.duration_since(bucket.last_seen) <= ttl
                        || bucket.sem.available_permits() != per_ip_max
                });
            }

            let bucket = table.entry(ip).or_insert_with(|| IpBucket {
                sem: Arc::new(Semaphore::new(self.per_ip_max)),
                last_seen: now,
            });
            bucket.last_seen = now;
            bucket.sem.clone()
        };

        sem.try_acquire_owned().ok()
    }
}

/* ───────────────────────── Request/Response ───────────────────────── */
/* Clients may send 'code' or 'content' (repair/lint), and 'description'
or 'prompt' (generate). */

#[derive(Deserialize, Debug)]
struct RepairReq {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GenerateReq {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Serialize)]
struct RepairResp {
    ok: bool,
    code: String,
    model_id: Option<String>,
    attempts: usize,
    unknown_operations: Vec<String>,
    error: Option<String>,
    logs: Vec<String>,
}

#[derive(Serialize)]
struct LintResp {
    ok: bool,
    code: String,
    unknown_operations: Vec<String>,
    logs: Vec<String>,
}

/* ───────────────────────── Utility ───────────────────────── */

/// BOM/CRLF/tab normalization before anything touches the pipeline.
fn normalize(s: &str) -> String {
    s.replace('\u{FEFF}', "")
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\t', "    ")
        .lines()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

fn unauthorized(logs: Vec<String>) -> (StatusCode, Json<RepairResp>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(RepairResp {
            ok: false,
            code: String::new(),
            model_id: None,
            attempts: 0,
            unknown_operations: Vec::new(),
            error: Some("missing or invalid API key".into()),
            logs,
        }),
    )
}

/// Turn a finished pipeline run into a response, persisting the
/// artifact when the run succeeded.
fn respond(outcome: RepairOutcome, sink: &DirSink, mut logs: Vec<String>) -> Json<RepairResp> {
    let model_id = match &outcome.artifact {
        Some(model) => match sink.save(model) {
            Ok(id) => {
                logs.push(format!("stored artifact {id}"));
                Some(id)
            }
            Err(e) => {
                logs.push(format!("store error: {e}"));
                None
            }
        },
        None => None,
    };

    Json(RepairResp {
        ok: outcome.success,
        code: outcome.final_script,
        model_id,
        attempts: outcome.attempts,
        unknown_operations: outcome.unknown_operations,
        error: outcome.diagnostic,
        logs,
    })
}

/* ───────────────────────── Server main ───────────────────────── */

#[tokio::main]
async fn main() {
    banner::print_server_banner();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        if std::env::var("RUST_BACKTRACE").as_deref() != Ok("0") {
            eprintln!("(enable RUST_BACKTRACE=1 for backtrace)");
        }
    }));

    // Max concurrent pipeline runs (env CADMEND_MAX_CONCURRENCY, default 2).
    let max_runs: usize = env::var("CADMEND_MAX_CONCURRENCY")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2)
        .max(1);

    let per_ip_default = max_runs.saturating_div(2).max(1);
    let per_ip_max: usize = env::var("CADMEND_MAX_PER_IP")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(per_ip_default)
        .clamp(1, max_runs);

    let ip_bucket_ttl_secs: u64 = env::var("CADMEND_IP_BUCKET_TTL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3600);

    let api_key = env::var("CADMEND_API_KEY")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let sink = match DirSink::new(&StoreConfig::from_env()) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("❌ Artifact store init failed: {e}");
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState {
        pipeline_sem: Arc::new(Semaphore::new(max_runs)),
        api_key,
        per_ip: Mutex::new(HashMap::new()),
        per_ip_max,
        ip_bucket_ttl: Duration::from_secs(ip_bucket_ttl_secs),
        pipeline_cfg: PipelineConfig::from_env(),
        generator_cfg: GeneratorConfig::from_env(),
        sink,
    });

    let api = Router::new()
        .route("/generate", post(api_generate))
        .route("/repair", post(api_repair))
        .route("/lint", post(api_lint))
        .route("/model/:id", get(api_model))
        .with_state(state);

    let app = Router::new().nest("/api", api).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    // Default: 127.0.0.1:8082 (behind a reverse proxy).
    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8082);

    let addr: SocketAddr = format!("{host}:{port}").parse().expect("Invalid HOST/PORT");
    println!("✅ CadMend API listening on http://{addr}");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("❌ Bind failed for address {addr}: {e}");
            eprintln!(
                "   Hint: is the port already in use? e.g. `ss -tulpn | grep :{}`",
                port
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        eprintln!("❌ Server error: {e}");
        std::process::exit(1);
    }
}

/* ───────────────────────── Gating ───────────────────────── */

enum Gate {
    Acquired(Option<OwnedSemaphorePermit>, OwnedSemaphorePermit),
    PerIpBusy,
    SlotsBusy,
}

/// Per-IP gate first, then the global gate with a short soft wait in
/// case a permit is about to free up.
async fn acquire_gate(s: &Arc<AppState>, headers: &HeaderMap, peer: SocketAddr) -> Gate {
    let per_ip_permit = if let Some(ip) = client_ip(headers, peer) {
        match s.acquire_per_ip_permit(ip).await {
            Some(p) => Some(p),
            None => return Gate::PerIpBusy,
        }
    } else {
        // No reliable client IP (loopback without XFF): skip per-IP
        // limiting so every local user does not share one bucket.
        None
    };

    let permit = match s.pipeline_sem.clone().try_acquire_owned() {
        Ok(p) => p,
        Err(_) => {
            let maybe = timeout(
                Duration::from_millis(50),
                s.pipeline_sem.clone().acquire_owned(),
            )
            .await;
            match maybe {
                Ok(Ok(p)) => p,
                _ => return Gate::SlotsBusy,
            }
        }
    };

    Gate::Acquired(per_ip_permit, permit)
}

fn busy_per_ip(mut logs: Vec<String>) -> (StatusCode, Json<RepairResp>) {
    logs.push("busy: per-ip limit reached".into());
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(RepairResp {
            ok: false,
            code: String::new(),
            model_id: None,
            attempts: 0,
            unknown_operations: Vec::new(),
            error: Some("too many concurrent requests from your IP".into()),
            logs,
        }),
    )
}

fn busy_slots(mut logs: Vec<String>) -> (StatusCode, Json<RepairResp>) {
    logs.push("busy: pipeline slots full".into());
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(RepairResp {
            ok: false,
            code: String::new(),
            model_id: None,
            attempts: 0,
            unknown_operations: Vec::new(),
            error: Some("server busy, try again shortly".into()),
            logs,
        }),
    )
}

/* ───────────────────────── Handlers ───────────────────────── */

async fn api_repair(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<RepairReq>,
) -> impl IntoResponse {
    let mut logs: Vec<String> = Vec::new();

    if let Some(expected) = &s.api_key {
        if !api_key_matches(&headers, expected) {
            logs.push("auth: missing or invalid API key".into());
            return unauthorized(logs);
        }
    }

    let code = req.code.or(req.content).unwrap_or_default();
    if code.trim().is_empty() {
        logs.push("warn: empty input".into());
        return (
            StatusCode::OK,
            Json(RepairResp {
                ok: false,
                code: String::new(),
                model_id: None,
                attempts: 0,
                unknown_operations: Vec::new(),
                error: Some("empty input".into()),
                logs,
            }),
        );
    }

    let (per_ip_permit, permit) = match acquire_gate(&s, &headers, peer).await {
        Gate::Acquired(ip, global) => (ip, global),
        Gate::PerIpBusy => return busy_per_ip(logs),
        Gate::SlotsBusy => return busy_slots(logs),
    };

    let code = normalize(&code);
    let cfg = s.pipeline_cfg.clone();

    // Pipeline runs are synchronous; keep them off the async workers and
    // guard against panics so one bad script cannot take the server down.
    let task_res =
        task::spawn_blocking(move || catch_unwind(AssertUnwindSafe(|| repair_raw(&code, &cfg))))
            .await;

    drop(permit);
    drop(per_ip_permit);

    match task_res {
        Ok(Ok(outcome)) => (StatusCode::OK, respond(outcome, &s.sink, logs)),
        Ok(Err(panic)) => {
            let msg = panic_message(panic);
            logs.push(format!("panic: {msg}"));
            (
                StatusCode::OK,
                Json(RepairResp {
                    ok: false,
                    code: String::new(),
                    model_id: None,
                    attempts: 0,
                    unknown_operations: Vec::new(),
                    error: Some(format!("internal error: {msg}")),
                    logs,
                }),
            )
        }
        Err(e) => {
            logs.push(format!("join error: {e}"));
            (
                StatusCode::OK,
                Json(RepairResp {
                    ok: false,
                    code: String::new(),
                    model_id: None,
                    attempts: 0,
                    unknown_operations: Vec::new(),
                    error: Some("internal join error".into()),
                    logs,
                }),
            )
        }
    }
}

async fn api_generate(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<GenerateReq>,
) -> impl IntoResponse {
    let mut logs: Vec<String> = Vec::new();

    if let Some(expected) = &s.api_key {
        if !api_key_matches(&headers, expected) {
            logs.push("auth: missing or invalid API key".into());
            return unauthorized(logs);
        }
    }

    let description = req.description.or(req.prompt).unwrap_or_default();
    if description.trim().is_empty() {
        logs.push("warn: empty description".into());
        return (
            StatusCode::OK,
            Json(RepairResp {
                ok: false,
                code: String::new(),
                model_id: None,
                attempts: 0,
                unknown_operations: Vec::new(),
                error: Some("empty description".into()),
                logs,
            }),
        );
    }

    let (per_ip_permit, permit) = match acquire_gate(&s, &headers, peer).await {
        Gate::Acquired(ip, global) => (ip, global),
        Gate::PerIpBusy => return busy_per_ip(logs),
        Gate::SlotsBusy => return busy_slots(logs),
    };

    let description = normalize(&description);
    let cfg = s.pipeline_cfg.clone();
    let gen_cfg = s.generator_cfg.clone();

    // Blocking HTTP call to the model plus the synchronous pipeline,
    // both off the async workers. The blocking reqwest client must also
    // be built on a blocking thread.
    let task_res = task::spawn_blocking(move || {
        catch_unwind(AssertUnwindSafe(
            || -> Result<RepairOutcome, GenerateError> {
                let generator: Box<dyn ScriptGenerator> = Box::new(OllamaGenerator::new(gen_cfg)?);
                let raw = generator.generate(&description)?;
                Ok(repair_raw(&raw, &cfg))
            },
        ))
    })
    .await;

    drop(permit);
    drop(per_ip_permit);

    match task_res {
        Ok(Ok(Ok(outcome))) => (StatusCode::OK, respond(outcome, &s.sink, logs)),
        Ok(Ok(Err(gen_err))) => {
            logs.push(format!("generator: {gen_err}"));
            let status = match gen_err {
                GenerateError::Unavailable(_) | GenerateError::Timeout => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                GenerateError::Protocol(_) => StatusCode::BAD_GATEWAY,
            };
            (
                status,
                Json(RepairResp {
                    ok: false,
                    code: String::new(),
                    model_id: None,
                    attempts: 0,
                    unknown_operations: Vec::new(),
                    error: Some(gen_err.to_string()),
                    logs,
                }),
            )
        }
        Ok(Err(panic)) => {
            let msg = panic_message(panic);
            logs.push(format!("panic: {msg}"));
            (
                StatusCode::OK,
                Json(RepairResp {
                    ok: false,
                    code: String::new(),
                    model_id: None,
                    attempts: 0,
                    unknown_operations: Vec::new(),
                    error: Some(format!("internal error: {msg}")),
                    logs,
                }),
            )
        }
        Err(e) => {
            logs.push(format!("join error: {e}"));
            (
                StatusCode::OK,
                Json(RepairResp {
                    ok: false,
                    code: String::new(),
                    model_id: None,
                    attempts: 0,
                    unknown_operations: Vec::new(),
                    error: Some("internal join error".into()),
                    logs,
                }),
            )
        }
    }
}

async fn api_lint(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RepairReq>,
) -> impl IntoResponse {
    let mut logs: Vec<String> = Vec::new();

    if let Some(expected) = &s.api_key {
        if !api_key_matches(&headers, expected) {
            logs.push("auth: missing or invalid API key".into());
            return (
                StatusCode::UNAUTHORIZED,
                Json(LintResp {
                    ok: false,
                    code: String::new(),
                    unknown_operations: Vec::new(),
                    logs,
                }),
            );
        }
    }

    let code = req.code.or(req.content).unwrap_or_default();
    if code.trim().is_empty() {
        logs.push("warn: empty input".into());
        return (
            StatusCode::OK,
            Json(LintResp {
                ok: false,
                code: String::new(),
                unknown_operations: Vec::new(),
                logs,
            }),
        );
    }

    // Static passes are fast and pure text work; no gating needed.
    let report = validate_static(&normalize(&code));
    (
        StatusCode::OK,
        Json(LintResp {
            ok: report.is_fully_valid(),
            code: report.fixed_script,
            unknown_operations: report.unknown_operations,
            logs,
        }),
    )
}

async fn api_model(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Some(expected) = &s.api_key {
        if !api_key_matches(&headers, expected) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "ok": false, "error": "missing or invalid API key" })),
            );
        }
    }

    match s.sink.load(&id) {
        Ok(model) => (
            StatusCode::OK,
            Json(serde_json::json!({ "ok": true, "model": model })),
        ),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "ok": false, "error": e.to_string() })),
        ),
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "internal panic".to_string()
    }
}
