//! Integration tests for the network-backed probes.
//!
//! Each probe is driven against a wiremock server standing in for the
//! structured API, the search endpoint, result pages and the model server.

use std::sync::Arc;
use std::time::Duration;

use drug_enricher::diagnostics::DiagnosticSink;
use drug_enricher::net::HttpSettings;
use drug_enricher::probe::{
    ExtractionDomain, ExtractionModelProbe, HtmlSearchEngine, HttpPageFetcher, OllamaClient,
    SearchEngine, SearchStep, StructuredApiProbe, WebSearchProbe,
};
use drug_enricher::{
    FieldErrorKind, FieldTriple, FieldValue, Record, RetryPolicy, SourceProbe, TargetField,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10), Duration::ZERO)
}

fn record() -> Record {
    Record::new("A1", "藥X", "M1", "I1").with_foreign_name("DrugX")
}

fn model_reply(text: &str) -> serde_json::Value {
    json!({ "model": "test", "response": text, "done": true })
}

#[tokio::test]
async fn test_structured_api_timeout_retried_until_exhausted() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let probe = StructuredApiProbe::new(
        &format!("{}/api", server.uri()),
        &HttpSettings::with_request_timeout(Duration::from_millis(200)),
        fast_retry(),
        DiagnosticSink::new(dir.path()),
    )
    .unwrap();

    let fields = probe.probe(&record(), &FieldTriple::default()).await.unwrap();

    assert!(fields.is_empty(), "exhausted retries must read as no match");
    assert!(
        !dir.path().join("diagnostics").exists(),
        "transport failures leave no diagnostics"
    );
}

#[tokio::test]
async fn test_structured_api_html_body_not_retried_and_recorded() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string("<html><body>系統維護中</body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let probe = StructuredApiProbe::new(
        &format!("{}/api", server.uri()),
        &HttpSettings::default(),
        fast_retry(),
        DiagnosticSink::new(dir.path()),
    )
    .unwrap();

    let fields = probe.probe(&record(), &FieldTriple::default()).await.unwrap();

    assert!(fields.is_empty());
    let diagnostic = dir.path().join("diagnostics").join("structured_api_A1.html");
    let body = std::fs::read_to_string(&diagnostic).unwrap();
    assert!(body.contains("系統維護中"));
}

#[tokio::test]
async fn test_structured_api_server_error_retried_then_recovers() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "中文品名": "藥 X",
            "製造廠名稱": "其他廠",
            "申請商名稱": "",
            "成份": "I1",
            "適應症": "高血壓",
            "用法用量": "",
            "注意事項": "勿與葡萄柚汁併服"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let probe = StructuredApiProbe::new(
        &format!("{}/api", server.uri()),
        &HttpSettings::default(),
        fast_retry(),
        DiagnosticSink::disabled(),
    )
    .unwrap();

    let fields = probe.probe(&record(), &FieldTriple::default()).await.unwrap();

    assert_eq!(
        fields.get(TargetField::Indication),
        Some(&FieldValue::Resolved("高血壓".to_string()))
    );
    assert_eq!(fields.get(TargetField::Dosage), Some(&FieldValue::Sentinel));
}

#[tokio::test]
async fn test_ollama_fenced_reply_is_extracted() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let reply = "以下是結果：\n```json\n{\"適應症\": \"過敏性鼻炎\", \"用法用量\": \"每日一錠\", \"注意事項\": \"可能嗜睡\"}\n```";
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("\"stream\":false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(model_reply(reply)))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(OllamaClient::new(&server.uri(), "test-model").unwrap());
    let extractor = ExtractionModelProbe::new(client, DiagnosticSink::disabled());

    let fields = extractor
        .extract("--- 來源 1: https://example.test ---\n說明\n\n", ExtractionDomain::General, "A1")
        .await;

    assert_eq!(
        fields.get(TargetField::Indication),
        Some(&FieldValue::Resolved("過敏性鼻炎".to_string()))
    );
    assert_eq!(fields.resolved_count(), 3);
}

#[tokio::test]
async fn test_ollama_unparsable_reply_recorded_as_format_error() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(model_reply("我無法回答這個問題")))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = Arc::new(OllamaClient::new(&server.uri(), "test-model").unwrap());
    let extractor = ExtractionModelProbe::new(client, DiagnosticSink::new(dir.path()));

    let fields = extractor
        .extract("some page text", ExtractionDomain::TranslateThenExtract, "A1")
        .await;

    assert_eq!(
        fields.get(TargetField::Precaution),
        Some(&FieldValue::Error(FieldErrorKind::ModelFormatError))
    );
    let diagnostic = dir.path().join("diagnostics").join("model_A1.txt");
    assert_eq!(std::fs::read_to_string(diagnostic).unwrap(), "我無法回答這個問題");
}

#[tokio::test]
async fn test_ollama_server_error_is_extraction_failure() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let client = Arc::new(OllamaClient::new(&server.uri(), "test-model").unwrap());
    let extractor = ExtractionModelProbe::new(client, DiagnosticSink::disabled());

    let fields = extractor
        .extract("some page text", ExtractionDomain::General, "A1")
        .await;

    assert_eq!(
        fields.get(TargetField::Indication),
        Some(&FieldValue::Error(FieldErrorKind::ModelExtractionFailure))
    );
}

#[tokio::test]
async fn test_html_search_engine_extracts_result_links() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let page = r#"<html><body>
        <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.drugs.com%2Fdrugx.html&rut=abc">DrugX</a>
        <a class="result__a" href="https://www.medscape.com/drugx">Medscape</a>
        <a class="result__a" href="https://www.drugs.com/drugx.html">Duplicate</a>
        <a class="other" href="https://ads.example.test/">Ad</a>
    </body></html>"#;
    Mock::given(method("GET"))
        .and(path("/html/"))
        .and(query_param("q", "DrugX dosage"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .expect(1)
        .mount(&server)
        .await;

    let engine = HtmlSearchEngine::new(
        &format!("{}/html/", server.uri()),
        &HttpSettings::default(),
        fast_retry(),
    )
    .unwrap();

    let links = engine.search("DrugX dosage", 3).await.unwrap();

    assert_eq!(
        links,
        vec![
            "https://www.drugs.com/drugx.html".to_string(),
            "https://www.medscape.com/drugx".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_web_search_probe_fetches_pages_and_extracts() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let base = server.uri();
    let results = format!(
        r#"<html><body>
            <a class="result__a" href="{base}/label.pdf">PDF label</a>
            <a class="result__a" href="{base}/page">Drug page</a>
        </body></html>"#
    );
    Mock::given(method("GET"))
        .and(path("/html/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(results))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/label.pdf"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><head><title>x</title><script>var a = 1;</script></head><body><p>DrugX treats   hay fever.</p></body></html>",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("--- 來源 2:"))
        .and(body_string_contains("DrugX treats hay fever."))
        .respond_with(ResponseTemplate::new(200).set_body_json(model_reply(
            r#"{"適應症": "花粉症", "用法用量": "資訊不足", "注意事項": "資訊不足"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let settings = HttpSettings::default();
    let engine = Arc::new(
        HtmlSearchEngine::new(&format!("{base}/html/"), &settings, fast_retry()).unwrap(),
    );
    let fetcher = Arc::new(
        HttpPageFetcher::new(&settings, fast_retry())
            .unwrap()
            .with_polite_delay(None),
    );
    let client = Arc::new(OllamaClient::new(&base, "test-model").unwrap());
    let extractor = Arc::new(ExtractionModelProbe::new(client, DiagnosticSink::disabled()));
    let probe = WebSearchProbe::new(SearchStep::ForeignName, engine, fetcher, extractor);

    let fields = probe.probe(&record(), &FieldTriple::default()).await.unwrap();

    assert_eq!(
        fields.get(TargetField::Indication),
        Some(&FieldValue::Resolved("花粉症".to_string()))
    );
    assert_eq!(fields.get(TargetField::Dosage), Some(&FieldValue::Sentinel));
}

#[tokio::test]
async fn test_web_search_probe_search_failure_yields_nothing() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/html/"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let settings = HttpSettings::default();
    let base = server.uri();
    let engine = Arc::new(
        HtmlSearchEngine::new(&format!("{base}/html/"), &settings, fast_retry()).unwrap(),
    );
    let fetcher = Arc::new(HttpPageFetcher::new(&settings, fast_retry()).unwrap());
    let client = Arc::new(OllamaClient::new(&base, "test-model").unwrap());
    let extractor = Arc::new(ExtractionModelProbe::new(client, DiagnosticSink::disabled()));
    let probe = WebSearchProbe::new(SearchStep::LocalName, engine, fetcher, extractor);

    let fields = probe.probe(&record(), &FieldTriple::default()).await.unwrap();

    assert!(fields.is_empty());
}
