use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use streamvisor::{Config, EventBindings, MemoryTransport, Origin, Role, Session, SessionConfig};
use tokio::time::{sleep, timeout};

type Log = Arc<Mutex<Vec<String>>>;

const WAIT: Duration = Duration::from_secs(2);

fn setup() -> (Arc<MemoryTransport>, Arc<Origin>) {
    let transport = Arc::new(MemoryTransport::new());
    let origin = Origin::builder(Config::default())
        .with_transport(transport.clone())
        .build();
    (transport, origin)
}

fn recording(log: &Log) -> EventBindings {
    let log = Arc::clone(log);
    EventBindings::builder()
        .on("tick", move |data| log.lock().unwrap().push(data.to_string()))
        .build()
}

fn scenario_config(events: EventBindings) -> SessionConfig {
    SessionConfig::new("/stream", events)
        .with_lock_name("L")
        .with_channel_name("C")
}

async fn wait_leading(session: &Session) {
    let mut rx = session.watch_role();
    timeout(WAIT, rx.wait_for(|r| *r == Role::Leading))
        .await
        .expect("session never became leader")
        .expect("role sender dropped");
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let done = timeout(WAIT, async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(done.is_ok(), "timed out waiting for: {what}");
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn leader_and_follower_each_see_event_once() {
    let (transport, origin) = setup();
    let log1: Log = Default::default();
    let log2: Log = Default::default();

    let s1 = origin.context().mount(scenario_config(recording(&log1)));
    wait_leading(&s1).await;
    let s2 = origin.context().mount(scenario_config(recording(&log2)));
    sleep(Duration::from_millis(30)).await;

    assert_eq!(s2.role(), Role::Following);
    assert_eq!(transport.open_connections("/stream"), 1);

    assert_eq!(transport.emit("/stream", "tick", r#"{"n":1}"#), 1);
    eventually("follower delivery", || entries(&log2).len() == 1).await;
    sleep(Duration::from_millis(30)).await;

    assert_eq!(entries(&log1), vec![r#"{"n":1}"#.to_string()]);
    assert_eq!(entries(&log2), vec![r#"{"n":1}"#.to_string()]);

    s2.unmount().await;
    s1.unmount().await;
}

#[tokio::test]
async fn many_sessions_share_one_connection() {
    let (transport, origin) = setup();
    let logs: Vec<Log> = (0..5).map(|_| Log::default()).collect();
    let sessions: Vec<Session> = logs
        .iter()
        .map(|log| origin.context().mount(scenario_config(recording(log))))
        .collect();

    eventually("a leader", || sessions.iter().any(Session::is_leading)).await;
    sleep(Duration::from_millis(30)).await;
    assert_eq!(sessions.iter().filter(|s| s.is_leading()).count(), 1);
    assert_eq!(transport.open_connections("/stream"), 1);

    for n in 0..3 {
        transport.emit("/stream", "tick", &n.to_string());
    }
    eventually("fan-out to all", || logs.iter().all(|l| entries(l).len() == 3)).await;
    sleep(Duration::from_millis(30)).await;
    for log in &logs {
        assert_eq!(entries(log), vec!["0", "1", "2"]);
    }

    for session in sessions {
        session.unmount().await;
    }
    assert_eq!(transport.open_connections("/stream"), 0);
    assert!(!origin.locks().is_held("L"));
}

#[tokio::test]
async fn unmatched_events_are_dropped() {
    let (transport, origin) = setup();
    let log1: Log = Default::default();
    let log2: Log = Default::default();

    let s1 = origin.context().mount(scenario_config(recording(&log1)));
    wait_leading(&s1).await;
    let s2 = origin.context().mount(scenario_config(recording(&log2)));
    sleep(Duration::from_millis(20)).await;

    transport.emit("/stream", "unknown", "x");
    transport.emit("/stream", "tick", "y");
    eventually("follower delivery", || !entries(&log2).is_empty()).await;
    sleep(Duration::from_millis(30)).await;

    assert_eq!(entries(&log1), vec!["y"]);
    assert_eq!(entries(&log2), vec!["y"]);

    s1.unmount().await;
    s2.unmount().await;
}

#[tokio::test]
async fn unmount_frees_lock_for_a_later_session() {
    let (transport, origin) = setup();
    let s1 = origin.context().mount(scenario_config(EventBindings::default()));
    wait_leading(&s1).await;

    s1.unmount().await;
    assert!(!origin.locks().is_held("L"));
    assert_eq!(transport.open_connections("/stream"), 0);

    let s3 = origin.context().mount(scenario_config(EventBindings::default()));
    wait_leading(&s3).await;
    assert_eq!(transport.open_connections("/stream"), 1);
    assert_eq!(transport.total_opened(), 2);
    s3.unmount().await;
}

#[tokio::test]
async fn waiting_session_takes_over_without_remount() {
    let (transport, origin) = setup();
    let log2: Log = Default::default();

    let s1 = origin.context().mount(scenario_config(EventBindings::default()));
    wait_leading(&s1).await;
    let s2 = origin.context().mount(scenario_config(recording(&log2)));
    sleep(Duration::from_millis(20)).await;
    assert_eq!(s2.role(), Role::Following);

    s1.unmount().await;
    wait_leading(&s2).await;
    assert_eq!(transport.open_connections("/stream"), 1);

    transport.emit("/stream", "tick", "after");
    eventually("new leader delivery", || entries(&log2) == vec!["after"]).await;
    s2.unmount().await;
}

#[tokio::test]
async fn teardown_while_pending_withdraws_request() {
    let (transport, origin) = setup();
    let s1 = origin.context().mount(scenario_config(EventBindings::default()));
    wait_leading(&s1).await;

    let s2 = origin.context().mount(scenario_config(EventBindings::default()));
    sleep(Duration::from_millis(20)).await;
    s2.unmount().await;

    s1.unmount().await;
    assert!(!origin.locks().is_held("L"));
    assert_eq!(transport.total_opened(), 1);
}

#[tokio::test]
async fn dropped_session_still_releases_leadership() {
    let (transport, origin) = setup();
    let s1 = origin.context().mount(scenario_config(EventBindings::default()));
    wait_leading(&s1).await;
    let s2 = origin.context().mount(scenario_config(EventBindings::default()));

    drop(s1);
    wait_leading(&s2).await;
    assert_eq!(transport.open_connections("/stream"), 1);
    s2.unmount().await;
}

#[tokio::test]
async fn refused_connection_lets_next_session_try() {
    let (transport, origin) = setup();
    transport.refuse("/stream");

    let s1 = origin.context().mount(scenario_config(EventBindings::default()));
    sleep(Duration::from_millis(30)).await;
    assert!(!origin.locks().is_held("L"));
    assert_eq!(s1.role(), Role::Following);

    transport.allow("/stream");
    let s2 = origin.context().mount(scenario_config(EventBindings::default()));
    wait_leading(&s2).await;

    s1.unmount().await;
    s2.unmount().await;
}

#[tokio::test]
async fn url_change_keeps_channel_and_followers_keep_receiving() {
    let (transport, origin) = setup();
    let log1: Log = Default::default();
    let log2: Log = Default::default();
    let cfg = scenario_config(recording(&log1));

    let mut s1 = origin.context().mount(cfg.clone());
    wait_leading(&s1).await;
    // Separate lock: s2 must not win the election while s1 reconnects.
    let s2 = origin.context().mount(
        SessionConfig::new("/elsewhere", recording(&log2))
            .with_lock_name("L2")
            .with_channel_name("C"),
    );
    let channel = s1.channel_id();

    s1.reconcile(cfg.with_url("/other")).await;
    wait_leading(&s1).await;
    assert_eq!(s1.channel_id(), channel);
    assert_eq!(transport.open_connections("/stream"), 0);
    assert_eq!(transport.open_connections("/other"), 1);

    transport.emit("/other", "tick", "moved");
    eventually("delivery after reconnect", || entries(&log2) == vec!["moved"]).await;
    assert_eq!(entries(&log1), vec!["moved"]);

    s1.unmount().await;
    s2.unmount().await;
}

#[tokio::test]
async fn new_bindings_rewire_leader_and_keep_follower_delivery() {
    let (transport, origin) = setup();
    let old: Log = Default::default();
    let new: Log = Default::default();
    let follower: Log = Default::default();

    let mut s1 = origin.context().mount(scenario_config(recording(&old)));
    wait_leading(&s1).await;
    // Own lock and url: s2 stays a pure listener of channel "C" for s1's events.
    let s2 = origin.context().mount(
        SessionConfig::new("/elsewhere", recording(&follower))
            .with_lock_name("L2")
            .with_channel_name("C"),
    );

    let tagged = {
        let new = Arc::clone(&new);
        EventBindings::builder()
            .on("tick", move |data| new.lock().unwrap().push(format!("new:{data}")))
            .build()
    };
    let next = s1.config().clone().with_events(tagged);
    assert_eq!(s1.reconcile(next).await, streamvisor::Change::Full);
    wait_leading(&s1).await;
    assert_eq!(transport.open_connections("/stream"), 1);

    transport.emit("/stream", "tick", "1");
    eventually("follower delivery", || !entries(&follower).is_empty()).await;
    sleep(Duration::from_millis(30)).await;

    assert_eq!(entries(&new), vec!["new:1"]);
    assert!(entries(&old).is_empty());
    assert_eq!(entries(&follower), vec!["1"]);

    s1.unmount().await;
    s2.unmount().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unmount_waits_for_running_callback() {
    let (transport, origin) = setup();
    let started = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    let events = {
        let started = Arc::clone(&started);
        let finished = Arc::clone(&finished);
        EventBindings::builder()
            .on("tick", move |_| {
                started.store(true, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(300));
                finished.store(true, Ordering::SeqCst);
            })
            .build()
    };

    let s1 = origin.context().mount(scenario_config(events));
    wait_leading(&s1).await;
    transport.emit("/stream", "tick", "1");
    eventually("callback started", || started.load(Ordering::SeqCst)).await;

    s1.unmount().await;
    assert!(finished.load(Ordering::SeqCst));
    assert!(!origin.locks().is_held("L"));
}
