//! Test suite run against an in-process fake inference server

mod common;

use common::{TEST_TOKEN, spawn_inference, wav_bytes, write_checkpoint};
use melodymaster::config::{HubConfig, TestConfig};
use melodymaster::{Error, ModelTester, TEST_PROMPTS};

fn test_config(model_path: &str, inference_url: &str, minimum_success_rate: f64) -> TestConfig {
    TestConfig {
        minimum_success_rate,
        model_path: model_path.to_string(),
        inference_url: Some(inference_url.to_string()),
        max_new_tokens: Some(512),
        request_timeout_secs: 10,
        hub: HubConfig {
            token: Some(TEST_TOKEN.to_string()),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_suite_with_one_failing_prompt() {
    let inference = spawn_inference("jazz").await;
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path());
    let model_path = dir.path().to_string_lossy().to_string();

    let mut tester =
        ModelTester::from_config(test_config(&model_path, &inference.url, 0.8)).unwrap();
    let report = tester.run_test_suite(&model_path).await.unwrap();

    assert_eq!(report.results.len(), TEST_PROMPTS.len());
    assert_eq!(report.quality.success_rate, 0.8);
    assert!(report.passed);

    let failed = &report.results["jazz trio with piano bass and drums"];
    assert!(!failed.success);
    assert!(failed.error.as_deref().unwrap().contains("503"));

    let succeeded: Vec<usize> = TEST_PROMPTS
        .iter()
        .filter(|p| !p.contains("jazz"))
        .map(|p| p.len() * 10)
        .collect();
    let expected = succeeded.iter().sum::<usize>() as f64 / succeeded.len() as f64;
    assert_eq!(report.quality.avg_audio_length, expected);
    assert_eq!(
        report.results["rock song with electric guitar"].audio_length,
        Some("rock song with electric guitar".len() * 10)
    );

    let record = inference.record.lock().unwrap();
    assert_eq!(record.requests.len(), TEST_PROMPTS.len());
    assert_eq!(record.requests[0]["inputs"], TEST_PROMPTS[0]);
    assert_eq!(record.requests[0]["parameters"]["max_new_tokens"], 512);
    assert!(record.auth_headers.iter().all(|h| h == "Bearer test-token"));
}

#[tokio::test]
async fn test_suite_fails_threshold() {
    let inference = spawn_inference("piano").await;
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path());
    let model_path = dir.path().to_string_lossy().to_string();

    let mut tester =
        ModelTester::from_config(test_config(&model_path, &inference.url, 0.7)).unwrap();
    let report = tester.run_test_suite(&model_path).await.unwrap();

    // Two of the five prompts mention piano
    assert_eq!(report.quality.success_rate, 0.6);
    assert!(!report.passed);
}

#[tokio::test]
async fn test_suite_rejects_unloadable_model() {
    let inference = spawn_inference("never").await;
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().to_string_lossy().to_string();

    let mut tester =
        ModelTester::from_config(test_config(&model_path, &inference.url, 0.8)).unwrap();
    let err = tester.run_test_suite(&model_path).await.unwrap_err();

    assert!(matches!(err, Error::Load(_)), "{}", err);
    assert!(inference.record.lock().unwrap().requests.is_empty());
}

#[test]
fn test_wav_fixture_decodes() {
    let audio = melodymaster::audio::decode_wav(&wav_bytes(123)).unwrap();
    assert_eq!(audio.len(), 123);
}
