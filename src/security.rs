//! Command screening for exec resources.
//!
//! Exec runs arbitrary shell lines, so every command, guard, path, and
//! environment entry is screened at construction time, before the resource
//! can register. A fixed metacharacter list catches shell-level surprises;
//! a fixed pattern list catches commands that are dangerous even without
//! metacharacters. Pipes and redirects are conditionally permitted.

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// How screening findings are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Findings are ignored.
    None,
    /// Findings are logged; the resource still registers.
    Warn,
    /// Findings abort construction before the resource registers.
    #[default]
    Strict,
}

static DANGEROUS_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\brm\s+-[a-zA-Z]*r[a-zA-Z]*\s+/(\s|$)", "recursive delete from root"),
        (r"\bdd\s+[^|]*\bof=/dev/", "raw write to a block device"),
        (r"\bmkfs(\.\w+)?\b", "filesystem format command"),
        (r":\(\)\s*\{.*\}\s*;\s*:", "fork bomb signature"),
        (r"\bchmod\s+(-[a-zA-Z]+\s+)*777\b", "world-writable permissions"),
        (r"\bchown\s+(-[a-zA-Z]+\s+)*root\b", "ownership change to root"),
        (
            r"\b(curl|wget)\b[^|]*\|\s*(sudo\s+)?\S*sh\b",
            "remote script piped to a shell",
        ),
        (r"\beval\b", "eval of dynamic input"),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("valid pattern"), label))
    .collect()
});

/// Screen one command line. `allow_pipes` and `allow_redirects` relax the
/// corresponding metacharacter checks only.
pub fn screen_command(command: &str, allow_pipes: bool, allow_redirects: bool) -> Vec<String> {
    let mut findings = Vec::new();

    if command.contains(';') {
        findings.push(format!("command chaining `;` in `{command}`"));
    }
    if command.contains("&&") {
        findings.push(format!("logical AND chaining in `{command}`"));
    }
    if command.contains("||") {
        findings.push(format!("logical OR chaining in `{command}`"));
    }
    if command.contains('`') {
        findings.push(format!("backtick command substitution in `{command}`"));
    }
    if command.contains("$(") {
        findings.push(format!("command substitution in `{command}`"));
    }
    if command.contains("${") {
        findings.push(format!("variable expansion in `{command}`"));
    }
    if command.contains('\n') || command.contains('\r') {
        findings.push(format!("embedded newline in `{command}`"));
    }
    if !allow_pipes && command.replace("||", "").contains('|') {
        findings.push(format!("pipe in `{command}` (set allow_pipes to permit)"));
    }
    if !allow_redirects {
        if command.replace(">>", "").contains('>') || command.contains(">>") {
            findings.push(format!(
                "output redirect in `{command}` (set allow_redirects to permit)"
            ));
        }
        if command.contains('<') {
            findings.push(format!(
                "input redirect in `{command}` (set allow_redirects to permit)"
            ));
        }
    }

    for (pattern, label) in DANGEROUS_PATTERNS.iter() {
        if pattern.is_match(command) {
            findings.push(format!("{label} in `{command}`"));
        }
    }

    findings
}

/// Screen a path attribute (`cwd`, `creates`).
pub fn screen_path(label: &str, path: &str) -> Vec<String> {
    let mut findings = Vec::new();
    if path.contains('\0') {
        findings.push(format!("null byte in {label} path"));
    }
    if path.split('/').any(|segment| segment == "..") {
        findings.push(format!("directory traversal in {label} path `{path}`"));
    }
    if path.chars().any(|c| ";&|`$<>".contains(c)) {
        findings.push(format!("shell metacharacter in {label} path `{path}`"));
    }
    findings
}

/// Screen environment entries: keys must be conservative identifiers,
/// values must not smuggle shell syntax.
pub fn screen_environment(environment: &BTreeMap<String, String>) -> Vec<String> {
    static KEY: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid pattern"));

    let mut findings = Vec::new();
    for (key, value) in environment {
        if !KEY.is_match(key) {
            findings.push(format!("invalid environment variable name `{key}`"));
        }
        if value.chars().any(|c| ";&|`\n\r".contains(c)) || value.contains("$(") {
            findings.push(format!("shell metacharacter in value of `{key}`"));
        }
    }
    findings
}
