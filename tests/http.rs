use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::time::sleep;
use visitor_counter::{LocalCounter, VisitorClient};

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncrementResponse {
    count: u64,
    is_new_visitor: bool,
}

#[derive(Debug, Deserialize)]
struct VisitRecord {
    ip_address: Option<String>,
    user_agent: Option<String>,
    page_url: Option<String>,
    referrer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HourlyCount {
    hour: u32,
    count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsResponse {
    recent_visits: Vec<VisitRecord>,
    visitors_by_hour: Vec<HourlyCount>,
    #[serde(rename = "uniqueVisitors24h")]
    unique_visitors_24h: u64,
}

/// One `visitor_counter` process with its own database directory.
struct TestServer {
    base_url: String,
    child: Child,
    _data_dir: TempDir,
}

impl TestServer {
    fn launch(port: u16, database_path: &Path) -> Child {
        Command::new(env!("CARGO_BIN_EXE_visitor_counter"))
            .env("PORT", port.to_string())
            .env("APP_DATABASE_PATH", database_path)
            .env("RUST_LOG", "info")
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .expect("failed to spawn server")
    }

    async fn start() -> Self {
        let data_dir = tempfile::tempdir().unwrap();
        let port = free_port();
        let child = Self::launch(port, &data_dir.path().join("visitors.db"));

        #[cfg(unix)]
        cleanup::register(child.id());

        let server = TestServer {
            base_url: format!("http://127.0.0.1:{port}"),
            child,
            _data_dir: data_dir,
        };

        let client = Client::new();
        let health_url = format!("{}/api/health", server.base_url);
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => return server,
                _ => sleep(Duration::from_millis(100)).await,
            }
        }
        panic!("server did not answer {health_url} in time");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Once;

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("bind random port")
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if guard.is_none() {
        *guard = Some(Arc::new(TestServer::start().await));
    }
    guard.as_ref().map(Arc::clone).expect("server started")
}

async fn current_count(client: &Client, base_url: &str) -> u64 {
    let response: CountResponse = client
        .get(format!("{base_url}/api/visitors"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    response.count
}

async fn visit_from(client: &Client, base_url: &str, ip: &str) -> IncrementResponse {
    let response = client
        .post(format!("{base_url}/api/visitors/increment"))
        .header("x-forwarded-for", ip)
        .header("user-agent", "http-test")
        .header("referer", "http://example.com/")
        .json(&serde_json::json!({ "pageUrl": "http://localhost:3000/test" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    response.json().await.unwrap()
}

#[tokio::test]
async fn http_health_reports_ok() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;

    let body: serde_json::Value = Client::new()
        .get(format!("{}/api/health", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].as_str().is_some_and(|ts| !ts.is_empty()));
}

#[tokio::test]
async fn http_increment_counts_each_client_once() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let before = current_count(&client, &server.base_url).await;

    let first = visit_from(&client, &server.base_url, "1.2.3.4").await;
    assert!(first.is_new_visitor);
    assert_eq!(first.count, before + 1);

    let again = visit_from(&client, &server.base_url, "1.2.3.4").await;
    assert!(!again.is_new_visitor);
    assert_eq!(again.count, before + 1);

    let other = visit_from(&client, &server.base_url, "5.6.7.8").await;
    assert!(other.is_new_visitor);
    assert_eq!(other.count, before + 2);

    assert_eq!(current_count(&client, &server.base_url).await, before + 2);
}

#[tokio::test]
async fn http_analytics_lists_logged_visits() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    visit_from(&client, &server.base_url, "198.51.100.1").await;
    visit_from(&client, &server.base_url, "198.51.100.1").await;
    visit_from(&client, &server.base_url, "198.51.100.2").await;

    let analytics: AnalyticsResponse = client
        .get(format!("{}/api/visitors/analytics", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let newest = &analytics.recent_visits[0];
    assert_eq!(newest.ip_address.as_deref(), Some("198.51.100.2"));
    assert_eq!(newest.user_agent.as_deref(), Some("http-test"));
    assert_eq!(newest.page_url.as_deref(), Some("http://localhost:3000/test"));
    assert_eq!(newest.referrer.as_deref(), Some("http://example.com/"));

    assert!(analytics.unique_visitors_24h >= 2);
    assert!(analytics.visitors_by_hour.iter().all(|bucket| bucket.hour < 24));
    let logged: u64 = analytics.visitors_by_hour.iter().map(|bucket| bucket.count).sum();
    assert!(logged >= 3);
}

#[tokio::test]
async fn http_increment_accepts_missing_body() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/api/visitors/increment", server.base_url))
        .header("x-forwarded-for", "192.0.2.50")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: IncrementResponse = response.json().await.unwrap();
    assert!(body.is_new_visitor);
}

#[tokio::test]
async fn http_cors_preflight_allows_json_posts() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;

    let response = Client::new()
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/api/visitors/increment", server.base_url),
        )
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn client_adapter_uses_live_service() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let local_dir = tempfile::tempdir().unwrap();
    let local_path = local_dir.path().join("local.json");

    let adapter = VisitorClient::new(
        format!("{}/api", server.base_url),
        LocalCounter::new(&local_path),
    )
    .unwrap();

    assert!(adapter.check_availability().await);
    let count = adapter.increment_count("http://localhost:3000/").await;
    assert!(count >= 1);
    assert_eq!(adapter.fetch_count().await, count);

    assert!(!adapter.fallback().has_visited());
    assert!(!local_path.exists());
}

#[tokio::test]
async fn server_exits_when_store_cannot_be_opened() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"file").unwrap();

    let mut child = TestServer::launch(free_port(), &blocker.join("visitors.db"));

    let deadline = Instant::now() + Duration::from_secs(5);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            let _ = child.wait();
            panic!("server started without a usable store");
        }
        sleep(Duration::from_millis(50)).await;
    };

    assert!(!status.success());
}
