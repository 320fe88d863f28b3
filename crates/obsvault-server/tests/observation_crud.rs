//! Full HTTP lifecycle tests against the in-memory backend.

use obsvault_db_memory::MemoryStore;
use obsvault_server::{build_app, AppConfig, AppState};
use obsvault_storage::ObservationStore;
use serde_json::{json, Value};
use std::sync::Arc;

/// Boots the app on an ephemeral port. Returns the base URL plus a handle
/// to the concrete store so tests can inspect table counts directly.
async fn spawn_server() -> (String, Arc<MemoryStore>, tokio::task::JoinHandle<()>) {
    let cfg = AppConfig::default();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let base_url = format!("http://{addr}");

    let store = Arc::new(MemoryStore::new());
    let state = AppState {
        store: store.clone() as Arc<dyn ObservationStore>,
        base_url: base_url.clone(),
    };
    let app = build_app(&cfg, state);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    (base_url, store, handle)
}

fn heart_rate(status: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "status": status,
        "code": {
            "coding": [{"code": "8867-4", "system": "http://loinc.org", "display": "Heart rate"}],
            "text": "Heart rate"
        },
        "subject": {"reference": "Patient/17"},
        "effectiveDateTime": "2024-03-10T08:15:00Z",
        "valueQuantity": {"value": 72.0, "unit": "beats/min", "system": "http://unitsofmeasure.org", "code": "/min"}
    })
}

#[tokio::test]
async fn post_put_delete_get_lifecycle() {
    let (base, store, server) = spawn_server().await;
    let client = reqwest::Client::new();

    // Create without an id.
    let response = client
        .post(format!("{base}/fhir/Observation"))
        .json(&heart_rate("final"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let location = response
        .headers()
        .get("location")
        .expect("location header")
        .to_str()
        .unwrap()
        .to_string();
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert!(location.ends_with(&format!("/fhir/Observation/{id}")));
    assert_eq!(created["meta"]["versionId"], "1");
    assert_eq!(created["status"], "final");
    assert_eq!(store.record_count().await, 1);

    // Update to amended.
    let mut amended = heart_rate("amended");
    amended["id"] = json!(id);
    let response = client
        .put(format!("{base}/fhir/Observation/{id}"))
        .json(&amended)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("etag").unwrap().to_str().unwrap(),
        "W/\"2\""
    );
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["meta"]["versionId"], "2");
    assert_eq!(updated["status"], "amended");
    assert_eq!(updated["valueQuantity"]["value"], 72.0);
    assert_eq!(store.record_count().await, 2);

    // Delete.
    let response = client
        .delete(format!("{base}/fhir/Observation/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    // The row survives as a tombstone with one DELETE record appended.
    assert_eq!(store.resource_count().await, 1);
    assert_eq!(store.record_count().await, 3);

    // Reading a deleted resource is Gone, not NotFound.
    let response = client
        .get(format!("{base}/fhir/Observation/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 410);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["resourceType"], "OperationOutcome");
    assert_eq!(outcome["issue"][0]["code"], "deleted");

    // A second delete short-circuits with an informational outcome.
    let response = client
        .delete(format!("{base}/fhir/Observation/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["issue"][0]["severity"], "information");
    // The short-circuit appended nothing.
    assert_eq!(store.record_count().await, 3);

    server.abort();
}

#[tokio::test]
async fn create_rejects_preassigned_id() {
    let (base, _store, server) = spawn_server().await;
    let client = reqwest::Client::new();

    let mut body = heart_rate("final");
    body["id"] = json!("5");
    let response = client
        .post(format!("{base}/fhir/Observation"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    server.abort();
}

#[tokio::test]
async fn create_rejects_wrong_resource_type() {
    let (base, _store, server) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/fhir/Observation"))
        .json(&json!({"resourceType": "Patient", "status": "final"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["issue"][0]["code"], "invalid");

    server.abort();
}

#[tokio::test]
async fn test_flag_assigns_sentinel_id() {
    let (base, _store, server) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/fhir/Observation?test=true"))
        .json(&heart_rate("preliminary"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["id"], "7357");

    server.abort();
}

#[tokio::test]
async fn update_requires_matching_body_id() {
    let (base, _store, server) = spawn_server().await;
    let client = reqwest::Client::new();

    // No body id at all.
    let response = client
        .put(format!("{base}/fhir/Observation/9"))
        .json(&heart_rate("final"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Mismatching body id.
    let mut body = heart_rate("final");
    body["id"] = json!("8");
    let response = client
        .put(format!("{base}/fhir/Observation/9"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let outcome: Value = response.json().await.unwrap();
    assert!(outcome["issue"][0]["diagnostics"]
        .as_str()
        .unwrap()
        .contains("mismatch"));

    server.abort();
}

#[tokio::test]
async fn update_of_unknown_id_creates_the_resource() {
    let (base, _store, server) = spawn_server().await;
    let client = reqwest::Client::new();

    let mut body = heart_rate("final");
    body["id"] = json!("321");
    let response = client
        .put(format!("{base}/fhir/Observation/321"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    assert!(response.headers().get("location").is_some());
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["id"], "321");
    assert_eq!(created["meta"]["versionId"], "1");

    // The row is now readable at the client-chosen id.
    let response = client
        .get(format!("{base}/fhir/Observation/321"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    server.abort();
}

#[tokio::test]
async fn update_of_deleted_id_revives_the_row_in_place() {
    let (base, store, server) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/fhir/Observation"))
        .json(&heart_rate("final"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let response = client
        .delete(format!("{base}/fhir/Observation/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    assert_eq!(store.record_count().await, 2);

    // The id still exists as a tombstone, so the update branch applies:
    // no new logical id, no second CREATE record.
    let mut revived = heart_rate("amended");
    revived["id"] = json!(id);
    let response = client
        .put(format!("{base}/fhir/Observation/{id}"))
        .json(&revived)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("etag").unwrap().to_str().unwrap(),
        "W/\"3\""
    );
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["meta"]["versionId"], "3");
    assert_eq!(store.record_count().await, 3);

    // The row is live again.
    let response = client
        .get(format!("{base}/fhir/Observation/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let fetched: Value = response.json().await.unwrap();
    assert_eq!(fetched["status"], "amended");

    server.abort();
}

#[tokio::test]
async fn read_of_unknown_id_is_not_found() {
    let (base, _store, server) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base}/fhir/Observation/404404"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["issue"][0]["code"], "not-found");

    server.abort();
}

#[tokio::test]
async fn delete_of_unknown_id_is_no_content() {
    let (base, _store, server) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .delete(format!("{base}/fhir/Observation/404404"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    server.abort();
}

#[tokio::test]
async fn read_sets_caching_headers() {
    let (base, _store, server) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/fhir/Observation"))
        .json(&heart_rate("final"))
        .send()
        .await
        .unwrap();
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_str().unwrap();

    let response = client
        .get(format!("{base}/fhir/Observation/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("etag").unwrap().to_str().unwrap(),
        "W/\"1\""
    );
    assert!(response.headers().get("last-modified").is_some());
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/fhir+json"));

    server.abort();
}

#[tokio::test]
async fn health_and_root_endpoints_answer() {
    let (base, _store, server) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let response = client.get(format!("{base}/")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let info: Value = response.json().await.unwrap();
    assert_eq!(info["service"], "ObsVault");

    server.abort();
}

#[tokio::test]
async fn components_survive_the_round_trip_over_http() {
    let (base, _store, server) = spawn_server().await;
    let client = reqwest::Client::new();

    let blood_pressure = json!({
        "resourceType": "Observation",
        "status": "final",
        "code": {"coding": [{"code": "85354-9", "system": "http://loinc.org"}]},
        "component": [
            {
                "code": {"coding": [{"code": "8480-6", "display": "Systolic", "system": "http://loinc.org"}]},
                "valueQuantity": {"value": 120.0, "unit": "mmHg"}
            },
            {
                "code": {"coding": [{"code": "8462-4", "display": "Diastolic", "system": "http://loinc.org"}]},
                "valueQuantity": {"value": 80.0, "unit": "mmHg"}
            }
        ]
    });

    let response = client
        .post(format!("{base}/fhir/Observation"))
        .json(&blood_pressure)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_str().unwrap();

    let fetched: Value = client
        .get(format!("{base}/fhir/Observation/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let components = fetched["component"].as_array().unwrap();
    assert_eq!(components.len(), 2);
    assert_eq!(components[0]["valueQuantity"]["value"], 120.0);
    assert_eq!(components[1]["code"]["coding"][0]["code"], "8462-4");
    assert_eq!(components[1]["valueQuantity"]["value"], 80.0);

    server.abort();
}
