//! End-to-end behaviour of the collector loop with a scripted session source
use putval_agents::agent::run_with_token;
use putval_agents::collector::LoopState;
use putval_agents::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Session {
    logins: AtomicUsize,
    polls: AtomicUsize,
    logouts: AtomicUsize,
}

/// A stateful source whose login can be made to fail
struct StationSource {
    session: Arc<Session>,
    reject_login: bool,
    values: Vec<Option<f64>>,
}

#[async_trait::async_trait]
impl Source for StationSource {
    fn name(&self) -> &str {
        "station 94768"
    }

    async fn open(&mut self) -> Result<()> {
        self.session.logins.fetch_add(1, Ordering::SeqCst);
        if self.reject_login {
            return Err(AgentError::Setup("login rejected".to_string()));
        }
        Ok(())
    }

    async fn fetch(&mut self, _keys: &[String]) -> Result<Reading> {
        self.session.polls.fetch_add(1, Ordering::SeqCst);
        Ok(Reading::new(self.values.clone()))
    }

    async fn close(&mut self) -> Result<()> {
        self.session.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn station_table() -> MetricTable {
    MetricTable::new(vec![
        MetricDescriptor::new("{host}/station/temperature-air", "air_temp"),
        MetricDescriptor::new("{host}/station/temperature-apparent", "apparent_t"),
    ])
    .unwrap()
}

fn collector(
    reject_login: bool,
) -> (CollectorLoop<StationSource, LineSink<Vec<u8>>>, Arc<Session>) {
    let session = Arc::new(Session::default());
    let source = StationSource {
        session: Arc::clone(&session),
        reject_login,
        values: vec![Some(21.5), Some(20.1)],
    };
    let config = CollectorConfigBuilder::new("station", "h1")
        .interval(Duration::from_secs(60))
        .build();
    let collector = CollectorLoop::new(source, LineSink::new(Vec::new()), station_table(), config)
        .unwrap()
        .with_clock(|| 1000);
    (collector, session)
}

fn output(collector: &CollectorLoop<StationSource, LineSink<Vec<u8>>>) -> String {
    String::from_utf8(collector.sink().get_ref().clone()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn first_tick_emits_station_temperatures() {
    let (mut collector, _) = collector(false);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let status = run_with_token(&mut collector, token).await;

    assert_eq!(status, ExitStatus::Clean);
    assert_eq!(
        output(&collector),
        "PUTVAL \"h1/station/temperature-air\" interval=60 1000:21.5\n\
         PUTVAL \"h1/station/temperature-apparent\" interval=60 1000:20.1\n"
    );
}

#[tokio::test]
async fn failed_session_setup_exits_before_any_record() {
    let (mut collector, session) = collector(true);

    let status = run_with_token(&mut collector, CancellationToken::new()).await;

    assert_eq!(status, ExitStatus::IoFailure);
    assert_eq!(status.code(), 1);
    assert!(output(&collector).is_empty());
    assert_eq!(session.polls.load(Ordering::SeqCst), 0);
    assert_eq!(session.logouts.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn interrupt_while_sleeping_releases_session() {
    let (mut collector, session) = collector(false);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        // first tick at t=0, next one due at t=60
        tokio::time::sleep(Duration::from_secs(30)).await;
        canceller.cancel();
    });

    let started = tokio::time::Instant::now();
    let status = run_with_token(&mut collector, token).await;

    assert_eq!(status, ExitStatus::Clean);
    assert!(started.elapsed() < Duration::from_secs(31));
    assert_eq!(session.logins.load(Ordering::SeqCst), 1);
    assert_eq!(session.polls.load(Ordering::SeqCst), 1);
    assert_eq!(session.logouts.load(Ordering::SeqCst), 1);
    assert_eq!(collector.state(), LoopState::Stopped);
}
