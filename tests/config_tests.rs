use std::io::Write;
use std::time::Duration;

use homevolt_local::config::{probe_host, validate_host};
use homevolt_local::{Config, Error, Fetcher};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
hosts = ["192.168.1.100", "192.168.1.101"]
main_host = "192.168.1.101"
password = "secret"
scan_interval = 10
"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.hosts.len(), 2);
    assert_eq!(config.main_host(), "192.168.1.101");
    assert_eq!(config.password.as_deref(), Some("secret"));

    let coordinator = config.coordinator().unwrap();
    assert_eq!(coordinator.scan_interval(), Duration::from_secs(10));
    assert_eq!(coordinator.resources()[1].url, "http://192.168.1.101/ems.json");
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, Error::Io(_)), "{err:?}");
}

#[test]
fn invalid_toml_is_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "hosts = [").unwrap();
    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "{err:?}");
}

#[tokio::test]
async fn probe_accepts_homevolt_and_rejects_others() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ems.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "aggregated": {}, "ems": [], "sensors": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/other/ems.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hello": "world"})))
        .mount(&server)
        .await;

    let fetcher = Fetcher::builder().build().unwrap();
    let url = validate_host(&server.uri(), &[]).unwrap();
    probe_host(&fetcher, &url).await.unwrap();

    let err = probe_host(&fetcher, &format!("{}/other/ems.json", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn probe_reports_bad_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let fetcher = Fetcher::builder().password("wrong").build().unwrap();
    let err = probe_host(&fetcher, &format!("{}/ems.json", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized));
}
