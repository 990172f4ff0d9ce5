//! Project scans through the public API: layered configuration, discovery
//! and parallel scanning together.
//!
//! NOTE: API keys below are fabricated fixtures shaped like provider keys.

use std::fs;
use std::path::Path;

use tally_core::{load_config, ScanEngine, TallyConfig};
use tally_analysis::{FindingCategory, Severity};
use tally_lang::Language;

const KEY: &str = "sk-ant-REDACTED";

fn fixture(dir: &Path) {
    fs::create_dir_all(dir.join("service")).unwrap();
    fs::create_dir_all(dir.join("web")).unwrap();
    fs::write(
        dir.join("service/summarize.py"),
        format!(
            "import anthropic\n\nclient = anthropic.Anthropic(api_key=\"{KEY}\")\n\ndef summarize(docs):\n    for doc in docs:\n        client.messages.create(model=\"claude-3-opus-20240229\", messages=[doc])\n"
        ),
    )
    .unwrap();
    fs::write(
        dir.join("web/chat.ts"),
        "import OpenAI from 'openai';\nconst client = new OpenAI({ apiKey: process.env.OPENAI_API_KEY });\nexport const ask = (q: string) => client.chat.completions.create({ model: 'gpt-4o-mini', messages: [q], max_tokens: 200 });\n",
    )
    .unwrap();
    fs::write(dir.join("README.md"), "# demo\n").unwrap();
}

#[test]
fn repeated_scans_are_identical() {
    let tmp = tempfile::tempdir().unwrap();
    fixture(tmp.path());
    let engine = ScanEngine::default();

    let mut first = engine.scan(tmp.path()).unwrap();
    let mut second = engine.scan(tmp.path()).unwrap();
    first.duration_ms = 0;
    second.duration_ms = 0;

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn project_scan_reports_each_file() {
    let tmp = tempfile::tempdir().unwrap();
    fixture(tmp.path());

    let project = ScanEngine::default().scan(tmp.path()).unwrap();

    assert_eq!(project.files_scanned, 2);
    assert_eq!(project.languages, vec![Language::Python, Language::TypeScript]);
    let python = &project.files[0];
    assert_eq!(python.file_path, "service/summarize.py");
    let categories: Vec<FindingCategory> = python.findings.iter().map(|f| f.category).collect();
    for expected in [
        FindingCategory::HardcodedCredential,
        FindingCategory::ExpensiveModelSelection,
        FindingCategory::MissingTokenLimit,
        FindingCategory::UnboundedLoopInvocation,
        FindingCategory::MissingUsageTracking,
    ] {
        assert!(categories.contains(&expected), "missing {expected}: {categories:?}");
    }
    assert!(!project.files[1]
        .findings
        .iter()
        .any(|f| f.category == FindingCategory::HardcodedCredential));
    assert_eq!(project.max_severity(), Some(Severity::Critical));
}

#[test]
fn project_config_is_honoured() {
    let tmp = tempfile::tempdir().unwrap();
    fixture(tmp.path());
    fs::write(
        tmp.path().join(".tally.yaml"),
        "scan:\n  languages: [typescript]\n",
    )
    .unwrap();

    let config = load_config(Some(tmp.path()), None).unwrap();
    assert_eq!(config.scan.languages, vec![Language::TypeScript]);

    let project = ScanEngine::new(config).scan(tmp.path()).unwrap();
    assert_eq!(project.files_scanned, 1);
    assert_eq!(project.languages, vec![Language::TypeScript]);
}

#[test]
fn fixes_leave_only_unfixable_findings() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("agent.py"),
        format!("import os\nimport anthropic\nclient = anthropic.Anthropic(api_key=\"{KEY}\")\n"),
    )
    .unwrap();
    let engine = ScanEngine::new(TallyConfig::default());

    let plans = engine.plan_fixes(tmp.path()).unwrap();
    assert_eq!(plans.len(), 1);
    fs::write(&plans[0].file.path, &plans[0].fixed_text).unwrap();

    let rescan = engine.scan(tmp.path()).unwrap();
    assert!(rescan.findings().all(|f| !f.fixable), "{:?}", rescan.files);
    assert!(!rescan
        .findings()
        .any(|f| f.category == FindingCategory::HardcodedCredential));
}
