//! Fingerprints stay stable while a finding moves around in its file and
//! change when the file, rule or flagged code changes.
//!
//! NOTE: API keys below are fabricated fixtures shaped like provider keys.

use tally_analysis::{scan, Config, Finding, FindingCategory};

const KEY: &str = "sk-test123456789012345678901234567890";

fn credential(src: &str, path: &str) -> Finding {
    scan(src, path, &Config::default())
        .findings
        .into_iter()
        .find(|f| f.category == FindingCategory::HardcodedCredential)
        .expect("credential finding")
}

fn source(prefix: &str, key: &str) -> String {
    format!("{prefix}from openai import OpenAI\nclient = OpenAI(api_key='{key}')\n")
}

#[test]
fn fingerprint_stable_on_line_drift() {
    let before = credential(&source("", KEY), "src/agent.py");
    let after = credential(&source("import os\nimport sys\n\n\n", KEY), "src/agent.py");
    assert_ne!(before.line_range.start_line, after.line_range.start_line);
    assert_eq!(before.fingerprint, after.fingerprint, "line drift must not change fingerprint");
}

#[test]
fn fingerprint_stable_on_unrelated_edit() {
    let f1 = credential(&format!("{}\ndef helper():\n    return 1\n", source("", KEY)), "src/agent.py");
    let f2 = credential(&format!("{}\ndef helper():\n    return 2\n", source("", KEY)), "src/agent.py");
    assert_eq!(f1.fingerprint, f2.fingerprint, "unrelated edit must not change fingerprint");
}

#[test]
fn fingerprint_stable_across_path_spellings() {
    let f1 = credential(&source("", KEY), "./src/agent.py");
    let f2 = credential(&source("", KEY), "src\\agent.py");
    assert_eq!(f1.file_path, "src/agent.py");
    assert_eq!(f1.fingerprint, f2.fingerprint);
}

#[test]
fn fingerprint_changes_on_file_rename() {
    let f1 = credential(&source("", KEY), "src/old_name.py");
    let f2 = credential(&source("", KEY), "src/new_name.py");
    assert_ne!(f1.fingerprint, f2.fingerprint, "file rename must change fingerprint");
}

#[test]
fn fingerprint_changes_with_snippet() {
    let other = "sk-proj-Zx81QwErTy7uIoPaSdFgHjKl0293";
    let f1 = credential(&source("", KEY), "src/agent.py");
    let f2 = credential(&source("", other), "src/agent.py");
    assert_ne!(f1.fingerprint, f2.fingerprint);
}

#[test]
fn fingerprint_is_sha256_hex() {
    let f = credential(&source("", KEY), "src/agent.py");
    assert_eq!(f.fingerprint.len(), 64);
    assert!(f.fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn fingerprints_differ_between_rules_on_one_call() {
    let src = "from openai import OpenAI\nc = OpenAI()\n\ndef ask():\n    c.chat.completions.create(model='gpt-4', messages=[])\n";
    let result = scan(src, "ask.py", &Config::default());
    let on_call: Vec<&Finding> = result
        .findings
        .iter()
        .filter(|f| src[f.span.start..f.span.end].starts_with("c.chat"))
        .collect();
    assert!(on_call.len() >= 2, "expensive model and missing limit share the call");
    assert_ne!(on_call[0].fingerprint, on_call[1].fingerprint);
}
