//! HTTP adapters against a local server with canned responses
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use putval_agents::agent::run_with_token;
use putval_agents::prelude::*;
use putval_agents::sources::bom::{self, BomSettings, BomSource};
use putval_agents::sources::sma::{self, SmaSettings, SmaSource};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Path and query plus body of every request the server saw
#[derive(Clone, Default)]
struct Requests(Arc<Mutex<Vec<(String, String)>>>);

impl Requests {
    fn record(&self, uri: &Uri, body: String) {
        self.0.lock().unwrap().push((uri.to_string(), body));
    }

    fn uris(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|(uri, _)| uri.clone()).collect()
    }

    fn body(&self, index: usize) -> String {
        self.0.lock().unwrap()[index].1.clone()
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn never_answer() -> StatusCode {
    std::future::pending().await
}

fn output(collector: &CollectorLoop<impl Source, LineSink<Vec<u8>>>) -> Vec<String> {
    String::from_utf8(collector.sink().get_ref().clone())
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn config(host: &str, interval: u64) -> CollectorConfig {
    CollectorConfigBuilder::new("test", host)
        .interval(Duration::from_secs(interval))
        .fetch_timeout(Duration::from_secs(20))
        .build()
}

// BoM

async fn observation(
    State(requests): State<Requests>,
    Path((area, file)): Path<(String, String)>,
    uri: Uri,
) -> Response {
    requests.record(&uri, String::new());
    if area == "IDN60901" && file == "IDN60901.94768.json" {
        Json(json!({"observations": {"data": [{"air_temp": 21.5, "apparent_t": 20.1}]}})).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

fn bom_settings(addr: SocketAddr) -> BomSettings {
    let mut settings = BomSettings::new("IDN60901", "94768");
    settings.base_url = format!("http://{}", addr);
    settings
}

fn bom_collector(settings: &BomSettings) -> CollectorLoop<BomSource, LineSink<Vec<u8>>> {
    let source = BomSource::new(settings).unwrap();
    CollectorLoop::new(source, LineSink::new(Vec::new()), bom::metric_table().unwrap(), config("h1", 60))
        .unwrap()
        .with_clock(|| 1000)
}

#[tokio::test]
async fn bom_observation_becomes_putval_lines() {
    let requests = Requests::default();
    let router = Router::new()
        .route("/fwo/{area}/{file}", get(observation))
        .with_state(requests.clone());
    let addr = serve(router).await;
    let mut collector = bom_collector(&bom_settings(addr));

    collector.open().await.unwrap();
    assert_eq!(collector.tick().await.unwrap(), 2);

    assert_eq!(
        output(&collector),
        vec![
            "PUTVAL \"h1/station/temperature-air\" interval=60 1000:21.5",
            "PUTVAL \"h1/station/temperature-apparent\" interval=60 1000:20.1",
        ]
    );
    assert_eq!(requests.uris(), vec!["/fwo/IDN60901/IDN60901.94768.json"]);
}

#[tokio::test]
async fn bom_error_status_reports_zeros() {
    let router = Router::new().route(
        "/fwo/{area}/{file}",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "oops") }),
    );
    let addr = serve(router).await;
    let mut collector = bom_collector(&bom_settings(addr));

    collector.open().await.unwrap();
    assert_eq!(collector.tick().await.unwrap(), 2);

    for line in output(&collector) {
        assert!(line.ends_with(" 1000:0"), "unexpected line {}", line);
    }
}

#[tokio::test]
async fn bom_unreachable_server_is_fatal() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let mut collector = bom_collector(&bom_settings(addr));

    let status = run_with_token(&mut collector, CancellationToken::new()).await;

    assert_eq!(status, ExitStatus::IoFailure);
    assert!(output(&collector).is_empty());
}

#[tokio::test]
async fn bom_request_timeout_is_fatal() {
    let router = Router::new().route("/fwo/{area}/{file}", get(never_answer));
    let addr = serve(router).await;
    let mut settings = bom_settings(addr);
    settings.request_timeout_secs = 1;
    let mut collector = bom_collector(&settings);

    let status = run_with_token(&mut collector, CancellationToken::new()).await;

    assert_eq!(status, ExitStatus::FetchTimeout);
    assert!(output(&collector).is_empty());
}

// SMA

/// A WebConnect inverter handing out `sid1`, `sid2`, ... per login
#[derive(Clone, Default)]
struct Inverter {
    requests: Requests,
    logins: Arc<AtomicUsize>,
    polls: Arc<AtomicUsize>,
    reject_login: bool,
    expire_first_poll: bool,
}

async fn login(State(inverter): State<Inverter>, uri: Uri, body: String) -> Json<Value> {
    inverter.requests.record(&uri, body);
    if inverter.reject_login {
        return Json(json!({"err": 503}));
    }
    let n = inverter.logins.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({"result": {"sid": format!("sid{}", n)}}))
}

async fn get_values(State(inverter): State<Inverter>, uri: Uri, body: String) -> Json<Value> {
    inverter.requests.record(&uri, body);
    let n = inverter.polls.fetch_add(1, Ordering::SeqCst);
    if inverter.expire_first_poll && n == 0 {
        return Json(json!({"err": 401}));
    }
    Json(json!({"result": {"0156-76BC3EC6": {
        "6100_40263F00": {"1": [{"val": 1530}]},
        "6100_00543100": {"1": [{"val": 410}]},
        "6400_00260100": {"1": [{"val": 8123456}]},
        "6400_00543A00": {"1": [{"val": null}]}
    }}}))
}

async fn logout(State(inverter): State<Inverter>, uri: Uri, body: String) -> Json<Value> {
    inverter.requests.record(&uri, body);
    Json(json!({"result": {"isLogin": false}}))
}

async fn serve_inverter(inverter: &Inverter) -> SocketAddr {
    let router = Router::new()
        .route("/dyn/login.json", post(login))
        .route("/dyn/getValues.json", post(get_values))
        .route("/dyn/logout.json", post(logout))
        .with_state(inverter.clone());
    serve(router).await
}

fn sma_collector(addr: SocketAddr, password: &str) -> CollectorLoop<SmaSource, LineSink<Vec<u8>>> {
    let source = SmaSource::new(&SmaSettings::new(addr.to_string(), password)).unwrap();
    CollectorLoop::new(source, LineSink::new(Vec::new()), sma::metric_table().unwrap(), config("h1", 10))
        .unwrap()
        .with_clock(|| 1000)
}

const SMA_LINES: [&str; 4] = [
    "PUTVAL \"h1/sma/current_power_w\" interval=10 1000:1530",
    "PUTVAL \"h1/sma/current_consumption_w\" interval=10 1000:410",
    "PUTVAL \"h1/sma/total_yield_kwh\" interval=10 1000:8123.456",
    "PUTVAL \"h1/sma/total_consumption_kwh\" interval=10 1000:0",
];

#[tokio::test]
async fn sma_session_lifecycle() {
    let inverter = Inverter::default();
    let addr = serve_inverter(&inverter).await;
    let mut collector = sma_collector(addr, "hunter2");

    collector.open().await.unwrap();
    assert_eq!(collector.source().session_id(), Some("sid1"));

    collector.tick().await.unwrap();
    collector.shutdown().await;
    collector.shutdown().await;

    assert_eq!(output(&collector), SMA_LINES);
    assert_eq!(collector.source().session_id(), None);

    assert_eq!(
        inverter.requests.uris(),
        vec!["/dyn/login.json", "/dyn/getValues.json?sid=sid1", "/dyn/logout.json?sid=sid1"]
    );
    let login_body = inverter.requests.body(0);
    assert!(login_body.contains("\"right\":\"usr\""));
    assert!(login_body.contains("\"pass\":\"hunter2\""));
    assert!(inverter.requests.body(1).contains("6400_00260100"));
}

#[tokio::test]
async fn sma_rejected_poll_logs_in_again() {
    let inverter = Inverter {
        expire_first_poll: true,
        ..Inverter::default()
    };
    let addr = serve_inverter(&inverter).await;
    let mut collector = sma_collector(addr, "hunter2");

    collector.open().await.unwrap();
    assert_eq!(collector.tick().await.unwrap(), 4);
    assert_eq!(collector.source().session_id(), None);

    assert_eq!(collector.tick().await.unwrap(), 4);
    assert_eq!(collector.source().session_id(), Some("sid2"));

    let lines = output(&collector);
    assert_eq!(lines.len(), 8);
    for line in &lines[..4] {
        assert!(line.ends_with(" 1000:0"), "unexpected line {}", line);
    }
    assert_eq!(lines[4..], SMA_LINES);
    assert_eq!(inverter.logins.load(Ordering::SeqCst), 2);
    assert_eq!(
        inverter.requests.uris(),
        vec![
            "/dyn/login.json",
            "/dyn/getValues.json?sid=sid1",
            "/dyn/login.json",
            "/dyn/getValues.json?sid=sid2",
        ]
    );
}

#[tokio::test]
async fn sma_rejected_login_stops_before_any_record() {
    let inverter = Inverter {
        reject_login: true,
        ..Inverter::default()
    };
    let addr = serve_inverter(&inverter).await;
    let mut collector = sma_collector(addr, "wrong");

    let status = run_with_token(&mut collector, CancellationToken::new()).await;

    assert_eq!(status, ExitStatus::IoFailure);
    assert!(output(&collector).is_empty());
    // login only: no poll, no logout without a session
    assert_eq!(inverter.requests.uris(), vec!["/dyn/login.json"]);
}
