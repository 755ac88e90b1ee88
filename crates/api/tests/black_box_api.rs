use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::Uri;
use reqwest::StatusCode;
use serde_json::{json, Value};

use agrochain_api::app::{self, AppServices};
use agrochain_api::config::AppConfig;

struct Service {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

async fn serve(listener: tokio::net::TcpListener, router: axum::Router) -> Service {
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Service {
        base_url: format!("http://{addr}"),
        handle,
    }
}

async fn ephemeral() -> tokio::net::TcpListener {
    tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind ephemeral port")
}

struct TestServer {
    harvest: Service,
    supply: Service,
    billing: Service,
    services: Arc<AppServices>,
    farmer_id: String,
}

impl TestServer {
    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.delivery.base_delay_ms = 10;
        config.delivery.max_delay_ms = 50;
        config.delivery.poll_interval_ms = 10;
        config.delivery.callback_timeout_ms = 1_000;
        config
    }

    async fn spawn() -> Self {
        Self::spawn_with(Self::config(), false).await
    }

    /// `http_callback`: billing reaches the harvest service over HTTP.
    async fn spawn_with(mut config: AppConfig, http_callback: bool) -> Self {
        let harvest_listener = ephemeral().await;
        if http_callback {
            let addr = harvest_listener.local_addr().unwrap();
            config.harvest_callback_url = Some(format!("http://{addr}"));
        }
        let farmer_id = config.farmers[0].id.to_string();

        let platform = app::build_platform(&config).expect("failed to build services");
        Self {
            harvest: serve(harvest_listener, platform.harvest).await,
            supply: serve(ephemeral().await, platform.supply).await,
            billing: serve(ephemeral().await, platform.billing).await,
            services: platform.services,
            farmer_id,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.harvest.handle.abort();
        self.supply.handle.abort();
        self.billing.handle.abort();
        self.services.shutdown();
    }
}

/// Callback target that refuses with 404 until opened, then forwards to
/// the harvest service.
struct Gate {
    open: AtomicBool,
    target: std::sync::OnceLock<String>,
    client: reqwest::Client,
}

async fn gate(State(gate): State<Arc<Gate>>, uri: Uri, body: axum::body::Bytes) -> axum::http::StatusCode {
    let Some(target) = gate.target.get().filter(|_| gate.open.load(Ordering::SeqCst)) else {
        return axum::http::StatusCode::NOT_FOUND;
    };
    let forwarded = gate
        .client
        .put(format!("{target}{uri}"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await;
    match forwarded {
        Ok(res) => axum::http::StatusCode::from_u16(res.status().as_u16())
            .unwrap_or(axum::http::StatusCode::BAD_GATEWAY),
        Err(_) => axum::http::StatusCode::BAD_GATEWAY,
    }
}

async fn get_json(client: &reqwest::Client, url: String) -> Value {
    client.get(url).send().await.unwrap().json().await.unwrap()
}

async fn eventually<F, Fut>(mut check: F) -> Value
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<Value>>,
{
    for _ in 0..200 {
        if let Some(value) = check().await {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within timeout");
}

async fn register(client: &reqwest::Client, server: &TestServer, product: &str, tonnes: f64) -> String {
    let res = client
        .post(format!("{}/harvests", server.harvest.base_url))
        .json(&json!({ "farmerId": server.farmer_id, "product": product, "tonnes": tonnes }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    body["harvestId"].as_str().unwrap().to_string()
}

async fn invoiced_harvest(client: &reqwest::Client, server: &TestServer, harvest_id: &str) -> Value {
    eventually(move || async move {
        let res = client
            .get(format!("{}/harvests/{}", server.harvest.base_url, harvest_id))
            .send()
            .await
            .unwrap();
        let body: Value = res.json().await.unwrap();
        (body["status"] == "INVOICED").then_some(body)
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_service_reports_health() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for base in [&server.harvest.base_url, &server.supply.base_url, &server.billing.base_url] {
        let res = client.get(format!("{base}/health")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registered_harvest_is_invoiced_end_to_end() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let harvest_id = register(&client, &server, "Arroz Oro", 2.0).await;
    let harvest = invoiced_harvest(&client, &server, &harvest_id).await;

    let res = client
        .get(format!("{}/invoices?harvestId={}", server.billing.base_url, harvest_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let invoices: Value = res.json().await.unwrap();
    let invoices = invoices.as_array().unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0]["amount"], json!(240.0));
    assert_eq!(harvest["invoiceId"], invoices[0]["id"]);

    let res = client
        .get(format!("{}/deliveries/stats", server.harvest.base_url))
        .send()
        .await
        .unwrap();
    let stats: Value = res.json().await.unwrap();
    assert_eq!(stats["emitters"][0]["emitter"]["name"], json!("harvest"));
    assert_eq!(stats["emitters"][0]["emitter"]["delivered"], json!(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn callback_over_http_marks_the_harvest_invoiced() {
    let server = TestServer::spawn_with(TestServer::config(), true).await;
    let client = reqwest::Client::new();

    let harvest_id = register(&client, &server, "Maiz", 3.0).await;
    let harvest = invoiced_harvest(&client, &server, &harvest_id).await;

    let invoice_id = harvest["invoiceId"].as_str().unwrap();
    let res = client
        .get(format!("{}/invoices/{}", server.billing.base_url, invoice_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let invoice: Value = res.json().await.unwrap();
    assert_eq!(invoice["amount"], json!(300.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_callback_is_idempotent() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let harvest_id = register(&client, &server, "Café Premium", 1.0).await;
    let harvest = invoiced_harvest(&client, &server, &harvest_id).await;
    let invoice_id = harvest["invoiceId"].as_str().unwrap().to_string();

    let res = client
        .put(format!("{}/harvests/{}/status", server.harvest.base_url, harvest_id))
        .json(&json!({ "invoiceId": invoice_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "INVOICED");
    assert_eq!(body["invoiceId"], json!(invoice_id));
    assert_eq!(body["changed"], json!(false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replayed_webhook_keeps_a_single_invoice() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // Unknown to the harvest registry, so the callback is refused and dead-lettered.
    let harvest_id = uuid::Uuid::now_v7().to_string();
    let event = json!({ "harvestId": harvest_id, "product": "Arroz Oro", "tonnes": 2.0 });

    let first = client
        .post(format!("{}/events/nueva_cosecha", server.billing.base_url))
        .json(&event)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["created"], json!(true));

    let second = client
        .post(format!("{}/events/nueva_cosecha", server.billing.base_url))
        .json(&event)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second: Value = second.json().await.unwrap();
    assert_eq!(second["created"], json!(false));
    assert_eq!(second["invoice"]["id"], first["invoice"]["id"]);

    let invoices: Value = client
        .get(format!("{}/invoices?harvestId={}", server.billing.base_url, harvest_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(invoices.as_array().unwrap().len(), 1);

    let dead_letters: Value = client
        .get(format!("{}/deliveries/dead-letters", server.billing.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let dead_letters = dead_letters.as_array().unwrap();
    assert_eq!(dead_letters.len(), 2);

    let id = dead_letters[0]["delivery"]["id"].as_str().unwrap();
    let res = client
        .delete(format!("{}/deliveries/dead-letters/{}", server.billing.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(format!("{}/deliveries/dead-letters/{}", server.billing.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invoices_can_be_paid_once() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let harvest_id = register(&client, &server, "Arroz Oro", 1.0).await;
    let harvest = invoiced_harvest(&client, &server, &harvest_id).await;
    let invoice_id = harvest["invoiceId"].as_str().unwrap();

    let res = client
        .post(format!("{}/invoices/{}/pay", server.billing.base_url, invoice_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let invoice: Value = res.json().await.unwrap();
    assert_eq!(invoice["paid"], json!(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn harvest_errors_use_the_json_error_shape() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/harvests", server.harvest.base_url))
        .json(&json!({ "farmerId": uuid::Uuid::now_v7().to_string(), "product": "Arroz Oro", "tonnes": 1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    let res = client
        .post(format!("{}/harvests", server.harvest.base_url))
        .json(&json!({ "farmerId": "not-a-uuid", "product": "Arroz Oro", "tonnes": 1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");

    let res = client
        .post(format!("{}/harvests", server.harvest.base_url))
        .json(&json!({ "farmerId": server.farmer_id, "product": "Arroz Oro", "tonnes": 0.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_argument");

    let res = client
        .get(format!("{}/harvests/not-a-uuid", server.harvest.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let harvests: Value = client
        .get(format!("{}/harvests", server.harvest.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(harvests.as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn supply_stock_adjustments() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let base = &server.supply.base_url;

    let res = client
        .post(format!("{base}/supplies"))
        .json(&json!({ "item": "Arroz Oro", "stock": 100.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(format!("{base}/supplies"))
        .json(&json!({ "item": "arroz oro", "stock": 5.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .post(format!("{base}/supplies/Arroz%20Oro/adjust"))
        .json(&json!({ "delta": 5.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "item": "Arroz Oro", "stock": 95.0 }));

    let res = client
        .post(format!("{base}/supplies/Arroz%20Oro/adjust"))
        .json(&json!({ "delta": 1000.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("{base}/supplies/Trigo/adjust"))
        .json(&json!({ "delta": 1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let supply: Value = client
        .get(format!("{base}/supplies/Arroz%20Oro"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(supply["stock"], json!(95.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_dead_letters_are_not_found() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!(
            "{}/deliveries/dead-letters/{}/replay",
            server.supply.base_url,
            uuid::Uuid::now_v7()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(format!("{}/deliveries/dead-letters/bogus/replay", server.supply.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn records_survive_a_restart_with_a_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let client = reqwest::Client::new();

    let mut config = TestServer::config();
    config.data_dir = Some(dir.path().to_path_buf());

    let harvest_id = {
        let server = TestServer::spawn_with(config.clone(), false).await;
        let harvest_id = register(&client, &server, "Arroz Oro", 2.0).await;
        invoiced_harvest(&client, &server, &harvest_id).await;
        harvest_id
    };

    let server = TestServer::spawn_with(config, false).await;
    let res = client
        .get(format!("{}/harvests/{}", server.harvest.base_url, harvest_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let harvest: Value = res.json().await.unwrap();
    assert_eq!(harvest["status"], "INVOICED");

    let invoices: Value = client
        .get(format!("{}/invoices", server.billing.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(invoices.as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dead_lettered_callback_is_replayed_over_http() {
    let gate_state = Arc::new(Gate {
        open: AtomicBool::new(false),
        target: std::sync::OnceLock::new(),
        client: reqwest::Client::new(),
    });
    let gate_listener = ephemeral().await;
    let mut config = TestServer::config();
    config.harvest_callback_url = Some(format!("http://{}", gate_listener.local_addr().unwrap()));

    let server = TestServer::spawn_with(config, false).await;
    let _ = gate_state.target.set(server.harvest.base_url.clone());
    let _gate = serve(
        gate_listener,
        axum::Router::new().fallback(gate).with_state(gate_state.clone()),
    )
    .await;
    let client = reqwest::Client::new();

    let harvest_id = register(&client, &server, "Arroz Oro", 2.0).await;

    let dead_letters = eventually(|| {
        let client = &client;
        let url = format!("{}/deliveries/dead-letters", server.billing.base_url);
        async move {
            let letters = get_json(client, url).await;
            (letters.as_array().map(Vec::len) == Some(1)).then_some(letters)
        }
    })
    .await;
    assert_eq!(dead_letters[0]["delivery"]["envelope"]["topic"], "cosecha_facturada");
    let delivery_id = dead_letters[0]["delivery"]["id"].as_str().unwrap().to_string();

    let harvest = get_json(&client, format!("{}/harvests/{}", server.harvest.base_url, harvest_id)).await;
    assert_eq!(harvest["status"], "REGISTERED");

    gate_state.open.store(true, Ordering::SeqCst);
    let res = client
        .post(format!(
            "{}/deliveries/dead-letters/{}/replay",
            server.billing.base_url, delivery_id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    invoiced_harvest(&client, &server, &harvest_id).await;

    let letters = get_json(&client, format!("{}/deliveries/dead-letters", server.billing.base_url)).await;
    assert!(letters.as_array().unwrap().is_empty());
    let stats = get_json(&client, format!("{}/deliveries/stats", server.billing.base_url)).await;
    assert_eq!(stats["emitters"][0]["emitter"]["name"], "billing");
    assert_eq!(stats["emitters"][0]["emitter"]["replayed"], json!(1));
    assert_eq!(stats["emitters"][0]["emitter"]["delivered"], json!(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overflowing_amounts_are_refused_by_billing() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/events/nueva_cosecha", server.billing.base_url))
        .json(&json!({
            "harvestId": uuid::Uuid::now_v7().to_string(),
            "product": "Café Premium",
            "tonnes": 1e307,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_argument");

    // Through the bus the same harvest ends up dead-lettered on billing's inbound side.
    register(&client, &server, "Café Premium", 1e307).await;
    let letters = eventually(|| {
        let client = &client;
        let url = format!("{}/deliveries/dead-letters", server.billing.base_url);
        async move {
            let letters = get_json(client, url).await;
            (letters.as_array().map(Vec::len) == Some(1)).then_some(letters)
        }
    })
    .await;
    assert_eq!(letters[0]["delivery"]["envelope"]["topic"], "nueva_cosecha");
    assert!(letters[0]["reason"].as_str().unwrap().contains("overflows"));

    let invoices = get_json(&client, format!("{}/invoices", server.billing.base_url)).await;
    assert!(invoices.as_array().unwrap().is_empty());
}
