use alertflow::{
    config::Config,
    pipeline::Pipeline,
    server::Server,
    store::{create_store, DatabaseConfig},
};
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

async fn setup() -> (TestServer, Pipeline) {
    let database = DatabaseConfig::in_memory();
    let store = create_store(&database).await.expect("Failed to create store");
    store.init().await.expect("Failed to initialize store");

    let mut config = Config::default();
    config.database = database;
    // Nothing listens here, so deliveries fail fast and are recorded as failed.
    config.notifications.default_webhook_url = "http://127.0.0.1:1/hook".to_string();
    config.notifications.timeout_secs = 2;

    let pipeline = Pipeline::build(&config, store).expect("Failed to build pipeline");
    let server = TestServer::new(Server::new(&pipeline).build_router()).unwrap();
    (server, pipeline)
}

fn alertmanager_item(status: &str, ends_at: &str) -> Value {
    json!({
        "status": status,
        "labels": {
            "alertname": "GPUMemoryHigh",
            "severity": "critical",
            "node": "gpu-node-1"
        },
        "annotations": {"summary": "GPU memory above 95%"},
        "startsAt": "2024-05-01T10:00:00Z",
        "endsAt": ends_at,
        "fingerprint": "fp-gpu-1"
    })
}

#[tokio::test]
async fn test_health_and_metrics() {
    let (client, _pipeline) = setup().await;

    let response = client.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");

    client
        .post("/v1/alerts/log")
        .json(&json!({"rule_name": "OOMKilled", "pod_name": "trainer-0"}))
        .await;
    let response = client.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("alertflow_alerts_received_total"));
}

#[tokio::test]
async fn test_alertmanager_ingestion_is_idempotent_and_resolves() {
    let (client, pipeline) = setup().await;

    for _ in 0..2 {
        let response = client
            .post("/api/v2/alerts")
            .json(&json!([alertmanager_item("firing", "0001-01-01T00:00:00Z")]))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["received"], 1);
        assert_eq!(body["processed"], 1);
    }

    let body: Value = client.get("/v1/alerts").await.json();
    assert_eq!(body["total"], 1);
    assert_eq!(body["limit"], 50);
    assert_eq!(body["alerts"][0]["id"], "fp-gpu-1");
    assert_eq!(body["alerts"][0]["status"], "firing");

    let response = client
        .post("/v1/alerts/alertmanager")
        .json(&json!([alertmanager_item("resolved", "2024-05-01T10:10:00Z")]))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let alert: Value = client.get("/v1/alerts/fp-gpu-1").await.json();
    assert_eq!(alert["status"], "resolved");
    assert_eq!(alert["node_name"], "gpu-node-1");

    pipeline.shutdown().await;

    let body: Value = client
        .get("/v1/alerts/statistics")
        .add_query_param("period", "hour")
        .await
        .json();
    assert_eq!(body["total"], 1);
    assert_eq!(body["statistics"][0]["firing_count"], 1);
    assert_eq!(body["statistics"][0]["resolved_count"], 1);
    assert_eq!(body["statistics"][0]["avg_duration_seconds"], 600.0);
}

#[tokio::test]
async fn test_named_metric_webhook_merges_common_labels() {
    let (client, _pipeline) = setup().await;

    let response = client
        .post("/v1/alerts/metric")
        .json(&json!({
            "receiver": "lens",
            "status": "firing",
            "alerts": [
                {"status": "firing", "labels": {"alertname": "NodeDown", "node": "n1"}},
                {"status": "firing", "labels": {"alertname": "NodeDown", "node": "n2"}}
            ],
            "commonLabels": {"cluster": "gpu-east", "severity": "high"}
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["received"], 2);
    assert_eq!(body["processed"], 2);

    let body: Value = client
        .get("/v1/alerts")
        .add_query_param("cluster", "gpu-east")
        .add_query_param("severity", "high")
        .await
        .json();
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn test_single_alert_endpoints_return_alert_id() {
    let (client, _pipeline) = setup().await;

    let response = client
        .post("/v1/alerts/log")
        .json(&json!({
            "rule_name": "OOMKilled",
            "severity": "critical",
            "message": "process killed",
            "pattern": "Out of memory",
            "pod_name": "trainer-0"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    let log_id = body["alert_id"].as_str().unwrap().to_string();

    let alert: Value = client.get(&format!("/v1/alerts/{}", log_id)).await.json();
    assert_eq!(alert["source"], "log");
    assert_eq!(alert["alert_name"], "OOMKilled");

    let response = client
        .post("/v1/alerts/trace")
        .json(&json!({"rule_name": "SlowSpan", "trace_id": "t1", "service_name": "api", "duration": 1500.0}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.json::<Value>()["alert_id"].is_string());

    let response = client
        .post("/v1/alerts/webhook")
        .json(&json!({"alert_name": "DiskFull", "severity": "warning"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    let alert: Value = client
        .get(&format!("/v1/alerts/{}", body["alert_id"].as_str().unwrap()))
        .await
        .json();
    assert_eq!(alert["source"], "webhook");
}

#[tokio::test]
async fn test_malformed_bodies_are_bad_requests() {
    let (client, _pipeline) = setup().await;

    let response = client
        .post("/v1/alerts/log")
        .bytes("{\"rule_name\": ".into())
        .content_type("application/json")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].is_string());

    // An object where an array is expected.
    let response = client.post("/api/v2/alerts").json(&json!({"alerts": []})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = client.get("/v1/alerts").add_query_param("severity", "urgent").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_alert_is_not_found() {
    let (client, _pipeline) = setup().await;

    let response = client.get("/v1/alerts/missing").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "alert not found");
}

#[tokio::test]
async fn test_silence_lifecycle_suppresses_matching_alerts() {
    let (client, pipeline) = setup().await;

    let response = client
        .post("/v1/silences")
        .json(&json!({"silence_type": "label", "reason": "maintenance"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = client
        .post("/v1/silences")
        .json(&json!({
            "name": "gpu-maintenance",
            "silence_type": "label",
            "label_matchers": [{"key": "team", "operator": "=", "value": "infra"}],
            "reason": "maintenance"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let silence_id = response.json::<Value>()["silence_id"].as_str().unwrap().to_string();

    let body: Value = client.get("/v1/silences").await.json();
    assert_eq!(body["total"], 1);
    assert_eq!(body["silences"][0]["name"], "gpu-maintenance");

    let response = client
        .post("/v1/alerts/log")
        .json(&json!({"rule_name": "XidError", "pod_name": "p1", "labels": {"team": "infra"}}))
        .await;
    let alert_id = response.json::<Value>()["alert_id"].as_str().unwrap().to_string();
    let alert: Value = client.get(&format!("/v1/alerts/{}", alert_id)).await.json();
    assert_eq!(alert["status"], "silenced");

    pipeline.shutdown().await;
    let body: Value = client
        .get(&format!("/v1/alerts/{}/notifications", alert_id))
        .await
        .json();
    assert_eq!(body["total"], 0);

    let response = client.delete(&format!("/v1/silences/{}", silence_id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let response = client.delete(&format!("/v1/silences/{}", silence_id)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_alert_rule_crud() {
    let (client, _pipeline) = setup().await;

    let response = client.post("/v1/alert-rules").json(&json!({"name": " "})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = client
        .post("/v1/alert-rules")
        .json(&json!({
            "name": "gpu-routing",
            "cluster_name": "gpu-east",
            "alert_group": "GPUMemoryHigh,XidError",
            "route_config": {
                "matchers": [{"name": "team", "value": "infra"}],
                "channels": [{"type": "slack", "config": {"webhook_url": "https://hooks.example.com/x"}}]
            }
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let rule_id = response.json::<Value>()["rule_id"].as_str().unwrap().to_string();

    let rule: Value = client.get(&format!("/v1/alert-rules/{}", rule_id)).await.json();
    assert_eq!(rule["name"], "gpu-routing");
    assert_eq!(rule["enabled"], true);
    assert_eq!(rule["route_config"]["channels"][0]["type"], "slack");

    let body: Value = client.get("/v1/alert-rules").await.json();
    assert_eq!(body["total"], 1);

    let response = client.delete(&format!("/v1/alert-rules/{}", rule_id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let response = client.get(&format!("/v1/alert-rules/{}", rule_id)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_firing_alert_gets_a_finished_notification_record() {
    let (client, pipeline) = setup().await;

    client
        .post("/api/v2/alerts")
        .json(&json!([alertmanager_item("firing", "")]))
        .await;
    pipeline.shutdown().await;

    let body: Value = client.get("/v1/alerts/fp-gpu-1/notifications").await.json();
    assert_eq!(body["total"], 1);
    assert_eq!(body["notifications"][0]["channel"], "webhook");
    assert_eq!(body["notifications"][0]["status"], "failed");

    let summary: Value = client.get("/v1/alerts/summary").await.json();
    assert_eq!(summary["critical"]["count"], 1);
    assert_eq!(summary["info"]["count"], 0);
}

#[tokio::test]
async fn test_default_sink_acknowledges_without_ingesting() {
    let (client, _pipeline) = setup().await;

    let response = client
        .post("/v1/alerts/webhook/default-sink")
        .json(&json!({"alert_id": "a1", "alert_name": "GPUMemoryHigh"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "accepted");

    let body: Value = client.get("/v1/alerts").await.json();
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_cross_source_alerts_on_one_node_are_correlated() {
    let (client, pipeline) = setup().await;

    client
        .post("/api/v2/alerts")
        .json(&json!([alertmanager_item("firing", "")]))
        .await;
    let response = client
        .post("/v1/alerts/log")
        .json(&json!({
            "rule_name": "XidError",
            "severity": "critical",
            "pattern": "Xid 79",
            "node_name": "gpu-node-1",
            "log_time": "2024-05-01T10:00:30Z"
        }))
        .await;
    let log_id = response.json::<Value>()["alert_id"].as_str().unwrap().to_string();
    pipeline.shutdown().await;

    let body: Value = client
        .get(&format!("/v1/alerts/{}/correlations", log_id))
        .await
        .json();
    let groups = body["correlations"].as_array().unwrap();
    assert!(!groups.is_empty());
    let members: Vec<&str> = groups[0]["alerts"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["id"].as_str())
        .collect();
    assert!(members.contains(&"fp-gpu-1"));
    assert!(members.contains(&log_id.as_str()));
    assert!(groups[0]["correlation_score"].as_f64().unwrap() >= 0.3);
}
