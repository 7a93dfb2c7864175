//! End-to-end flow: a user complaint is classified and the matched
//! remediation script runs to a clean finish.

#![cfg(unix)]

use std::fs;
use tempfile::TempDir;

use suporte_common::ollama::FakeTextGen;
use suporte_common::router;
use suporte_common::{ScriptExecutor, Tool};

#[tokio::test]
async fn test_network_complaint_runs_reconnect_script() {
    // Keyword path: the model must not be consulted.
    let fake = FakeTextGen::reply("NENHUMA");
    let classification = router::classify("não acesso a pasta da rede", &fake).await;

    assert!(classification.matched);
    assert_eq!(classification.tool, Tool::ReconnectNetwork);
    assert_eq!(fake.call_count(), 0);

    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("reconnect-network.sh"),
        "echo 'mapeando unidades de rede'\necho 'pronto'\n",
    )
    .unwrap();

    let executor = ScriptExecutor::new(dir.path());
    let result = executor.run(classification.tool, None).await.unwrap();

    assert!(result.succeeded());
    assert!(result.effectively_succeeded(classification.tool));
    assert!(result.output.contains("mapeando unidades de rede"));
    assert!(!result.reboot_required);
}

#[tokio::test]
async fn test_unmatched_complaint_classified_by_model_then_runs() {
    let fake = FakeTextGen::reply("Sugiro LIMPAR_CACHE para esse caso.");
    let classification = router::classify("o computador está muito devagar hoje", &fake).await;

    assert!(classification.matched);
    assert_eq!(classification.tool, Tool::ClearCache);
    assert_eq!(fake.call_count(), 1);

    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("clear-cache.sh"),
        "echo 'cache limpo'\necho '[REBOOT_REQUIRED] true'\n",
    )
    .unwrap();

    let executor = ScriptExecutor::new(dir.path());
    let result = executor.run(classification.tool, None).await.unwrap();

    assert!(result.succeeded());
    assert!(result.reboot_required);
}
