use std::path::Path;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use uploader_core::AccessToken;
use uploader_infra::config::Settings;
use uploader_infra::jobs::WorkerHandle;
use uploader_infra::operations::{
    RegistryClient, RegistryQueries, SignalUpload, StudyUpload, UploadError,
};

const TOKEN_HEADER: &str = "Genestack-API-Token";

/// Settings rooted in `dir`, with everything else defaulted.
fn settings_in(dir: &Path) -> Settings {
    let jobs = dir.join("jobs").display().to_string();
    let scratch = dir.join("scratch").display().to_string();
    Settings::from_lookup(|key| match key {
        "JOBS_DIR" => Some(jobs.clone()),
        "SCRATCH_DIR" => Some(scratch.clone()),
        "REGISTRY_ENDPOINT" => Some("http://registry.invalid".to_string()),
        _ => None,
    })
    .unwrap()
}

/// Accepts every token except "revoked".
struct FakeRegistry;

impl RegistryClient for FakeRegistry {
    fn create_study(&self, token: &AccessToken, _study: &StudyUpload) -> Result<String, UploadError> {
        if token.expose() == "revoked" {
            return Err(UploadError::Forbidden);
        }
        Ok("ST123".to_string())
    }

    fn create_signal(&self, token: &AccessToken, _: &str, _: &SignalUpload) -> Result<(), UploadError> {
        if token.expose() == "revoked" {
            return Err(UploadError::Forbidden);
        }
        Ok(())
    }
}

fn check(token: &AccessToken) -> Result<(), UploadError> {
    if token.expose() == "revoked" {
        return Err(UploadError::Forbidden);
    }
    Ok(())
}

impl RegistryQueries for FakeRegistry {
    fn list_studies(&self, token: &AccessToken) -> Result<serde_json::Value, UploadError> {
        check(token)?;
        Ok(json!([{"accession": "ST123"}, {"accession": "ST124"}]))
    }

    fn get_study(&self, token: &AccessToken, accession: &str) -> Result<serde_json::Value, UploadError> {
        check(token)?;
        match accession {
            "ST123" => Ok(json!({"accession": "ST123", "Study Source": "Sanger"})),
            other => Err(UploadError::NotFound(other.to_string())),
        }
    }

    fn list_signals(&self, token: &AccessToken, _: &str) -> Result<Vec<serde_json::Value>, UploadError> {
        check(token)?;
        Ok(vec![
            json!({"itemId": "GSF1", "group": "variant"}),
            json!({"itemId": "GSF2", "group": "expression"}),
        ])
    }

    fn list_templates(&self, token: &AccessToken) -> Result<serde_json::Value, UploadError> {
        check(token)?;
        Ok(json!([{"accession": "GSF_T1"}]))
    }

    fn get_template(&self, token: &AccessToken, id: &str) -> Result<serde_json::Value, UploadError> {
        check(token)?;
        Ok(json!({"name": format!("template {id}")}))
    }

    fn template_types(&self, token: &AccessToken) -> Result<serde_json::Value, UploadError> {
        check(token)?;
        Ok(json!(["study", "sample"]))
    }
}

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    _worker: WorkerHandle,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let (services, worker) =
            uploader_api::app::services::build_services(&settings, Arc::new(FakeRegistry)).unwrap();

        // Same router as prod, bound to an ephemeral port.
        let app = uploader_api::app::build_app(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            handle,
            _worker: worker,
            _dir: dir,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn submit_study(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    body: serde_json::Value,
) -> String {
    let res = client
        .post(format!("{}/api/studies", base_url))
        .header(TOKEN_HEADER, token)
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "OK");
    body["data"]["jobId"].as_str().unwrap().to_string()
}

async fn get_job_eventually(client: &reqwest::Client, base_url: &str, id: &str) -> serde_json::Value {
    // The worker runs asynchronously; poll briefly until the job is terminal.
    for _ in 0..200 {
        let res = client
            .get(format!("{}/api/jobs/{}", base_url, id))
            .header(TOKEN_HEADER, "tok")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body: serde_json::Value = res.json().await.unwrap();
        let status = body["data"]["status"].as_str().unwrap().to_string();
        if status == "COMPLETED" || status == "FAILED" {
            return body["data"].clone();
        }

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("job {id} did not finish within timeout");
}

#[tokio::test]
async fn health_and_version() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = client
        .get(format!("{}/api", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["server"], "default");
}

#[tokio::test]
async fn study_lifecycle_submit_then_poll() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = submit_study(&client, &srv.base_url, "tok", json!({"Study Source": "Sanger"})).await;
    let job = get_job_eventually(&client, &srv.base_url, &id).await;

    assert_eq!(job["status"], "COMPLETED");
    assert_eq!(job["output"], json!({"studyAccession": "ST123"}));
    assert!(job["startTime"].is_string());
    assert!(job["endTime"].is_string());
}

#[tokio::test]
async fn missing_required_field_fails_the_job() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = submit_study(&client, &srv.base_url, "tok", json!({"Study Title": "t"})).await;
    let job = get_job_eventually(&client, &srv.base_url, &id).await;

    assert_eq!(job["status"], "FAILED");
    assert_eq!(job["output"]["error"], "bad request");
}

#[tokio::test]
async fn revoked_token_fails_as_forbidden() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = submit_study(&client, &srv.base_url, "revoked", json!({"Study Source": "x"})).await;
    let job = get_job_eventually(&client, &srv.base_url, &id).await;

    assert_eq!(job["output"], json!({"error": "forbidden"}));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for id in [uuid_like(), "not-an-id".to_string()] {
        let res = client
            .get(format!("{}/api/jobs/{}", srv.base_url, id))
            .header(TOKEN_HEADER, "tok")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["status"], "FAIL");
        assert_eq!(body["data"]["error"], format!("not found: {id}"));
    }
}

#[tokio::test]
async fn submission_requires_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/studies", srv.base_url))
        .json(&json!({"Study Source": "x"}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["error"], "missing token");
}

#[tokio::test]
async fn non_json_body_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/studies", srv.base_url))
        .header(TOKEN_HEADER, "tok")
        .body("Study Source=x")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["error"], "no valid json body");
}

#[tokio::test]
async fn signal_is_attached_to_the_path_study() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/studies/GSF000042/signals", srv.base_url))
        .header(TOKEN_HEADER, "tok")
        .json(&json!({
            "data": "signals/expr.tsv",
            "metadata": {"Type": "RNA-seq"},
            "linkingattribute": ["Sample Source ID", "Sample Name"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    let id = body["data"]["jobId"].as_str().unwrap().to_string();

    let job = get_job_eventually(&client, &srv.base_url, &id).await;
    assert_eq!(
        job["output"],
        json!({"signal": "created", "studyAccession": "GSF000042"})
    );
}

#[tokio::test]
async fn jobs_listing_and_worker_stats() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = submit_study(&client, &srv.base_url, "tok", json!({"Study Source": "Sanger"})).await;
    get_job_eventually(&client, &srv.base_url, &id).await;

    let body: serde_json::Value = client
        .get(format!("{}/api/jobs", srv.base_url))
        .header(TOKEN_HEADER, "tok")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let jobs = body["data"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["jobId"], id.as_str());
    assert_eq!(jobs[0]["kind"], "study");

    // Stats are updated just after the terminal snapshot is written.
    for _ in 0..200 {
        let body: serde_json::Value = client
            .get(format!("{}/api/worker", srv.base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if body["data"]["jobs_completed"] == 1 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("worker stats never counted the completed job");
}

#[tokio::test]
async fn job_routes_require_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = submit_study(&client, &srv.base_url, "tok", json!({"Study Source": "Sanger"})).await;

    for url in [
        format!("{}/api/jobs", srv.base_url),
        format!("{}/api/jobs/{}", srv.base_url, id),
    ] {
        let res = client.get(url).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["data"]["error"], "missing token");
    }
}

async fn get_with_token(
    client: &reqwest::Client,
    url: String,
    token: &str,
) -> (StatusCode, serde_json::Value) {
    let res = client.get(url).header(TOKEN_HEADER, token).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn study_lookups_are_proxied() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let base = &srv.base_url;

    let (status, body) = get_with_token(&client, format!("{base}/api/studies"), "tok").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = get_with_token(&client, format!("{base}/api/studies/ST123"), "tok").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["Study Source"], "Sanger");

    let (status, body) = get_with_token(&client, format!("{base}/api/studies/ST999"), "tok").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["error"], "not found: ST999");

    let (status, body) = get_with_token(&client, format!("{base}/api/studies"), "revoked").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["data"]["error"], "forbidden");

    let res = client.get(format!("{base}/api/studies")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signal_lookups_are_proxied() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let base = &srv.base_url;

    let (status, body) =
        get_with_token(&client, format!("{base}/api/studies/ST123/signals"), "tok").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["studyAccession"], "ST123");
    assert_eq!(body["data"]["signals"].as_array().unwrap().len(), 2);

    let (status, body) =
        get_with_token(&client, format!("{base}/api/studies/ST123/signals/GSF2"), "tok").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({"studyAccession": "ST123", "signal": {"itemId": "GSF2", "group": "expression"}})
    );

    let (status, body) =
        get_with_token(&client, format!("{base}/api/studies/ST123/signals/GSF9"), "tok").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["data"]["error"],
        "not found: signal GSF9 not found on study ST123"
    );
}

#[tokio::test]
async fn template_lookups_are_proxied() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let base = &srv.base_url;

    let (status, body) = get_with_token(&client, format!("{base}/api/templates"), "tok").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([{"accession": "GSF_T1"}]));

    let (status, body) =
        get_with_token(&client, format!("{base}/api/templates/GSF_T1"), "tok").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({"accession": "GSF_T1", "template": {"name": "template GSF_T1"}})
    );

    let (status, body) = get_with_token(&client, format!("{base}/api/templateTypes"), "tok").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!(["study", "sample"]));
}

/// A well-formed id that was never issued.
fn uuid_like() -> String {
    uploader_core::JobId::new().to_string()
}
