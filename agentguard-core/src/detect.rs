//! Action-type inference and credential-path / URL-domain detection.
//!
//! Pure functions shared by the normalizer (`agentguard-interceptor`) and the
//! policy engine (`agentguard-policy`, for `deny_path_patterns` /
//! `deny_domains` extraction) — kept here so neither crate depends on the
//! other just to share a path parser.

use crate::ActionType;
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Extensions that always imply a credential/secret file regardless of path.
const CREDENTIAL_EXTENSIONS: &[&str] = &[".pem", ".key", ".p12", ".pfx", ".crt", ".cer"];

/// Curated suffixes for well-known credential file locations (§4.1).
const CREDENTIAL_PATTERNS: &[&str] = &[
    ".ssh/id_rsa",
    ".ssh/id_ed25519",
    ".ssh/id_ecdsa",
    ".ssh/id_dsa",
    ".ssh/authorized_keys",
    ".ssh/known_hosts",
    ".aws/credentials",
    ".aws/config",
    ".env",
    ".netrc",
    "/etc/passwd",
    "/etc/shadow",
    "/etc/sudoers",
    "credentials.json",
];

/// Normalise a path for credential / glob matching: expand leading `~`,
/// fold backslashes to forward slashes, lowercase.
pub fn normalize_path(path: &str) -> String {
    let expanded = expand_home(path);
    expanded.replace('\\', "/").to_lowercase()
}

/// Expand a leading `~` to `$HOME` (falls back to the literal `~` if the
/// home directory cannot be determined, matching `os.path.expanduser`'s
/// behaviour of leaving the input untouched rather than erroring).
pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut home = home.to_string_lossy().into_owned();
            if !home.ends_with('/') {
                home.push('/');
            }
            return format!("{home}{rest}");
        }
    } else if path == "~" {
        if let Some(home) = std::env::var_os("HOME") {
            return home.to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension(path: &str) -> Option<String> {
    let name = basename(path);
    let dot = name.rfind('.')?;
    if dot == 0 {
        // A leading-dot file like ".env" has no "extension" in this sense.
        return None;
    }
    Some(name[dot..].to_string())
}

/// Return true if `path` matches any known credential pattern (§4.1).
pub fn is_credential_path(path: &str) -> bool {
    let normalized = normalize_path(path);

    if let Some(ext) = extension(&normalized) {
        if CREDENTIAL_EXTENSIONS.contains(&ext.as_str()) {
            return true;
        }
    }

    for pattern in CREDENTIAL_PATTERNS {
        let pattern = pattern.to_lowercase();
        if normalized == pattern || normalized.ends_with(&format!("/{pattern}")) {
            return true;
        }
        if !pattern.contains('/') && basename(&normalized) == pattern {
            return true;
        }
    }

    let base = basename(&normalized);
    base == ".env" || base.ends_with(".env")
}

/// Extract a `file`/`path`/... parameter and return its raw string value.
pub fn extract_file_path(parameters: &BTreeMap<String, Json>) -> Option<String> {
    for key in ["path", "file", "filename", "filepath", "file_path"] {
        if let Some(Json::String(s)) = parameters.get(key) {
            return Some(s.clone());
        }
    }
    None
}

/// Extract a `url`/`endpoint`/... parameter and return its hostname only
/// (no scheme, no port). A scheme is assumed to be `https` if absent.
pub fn extract_url_domain(parameters: &BTreeMap<String, Json>) -> Option<String> {
    for key in ["url", "endpoint", "uri", "href"] {
        if let Some(Json::String(raw)) = parameters.get(key) {
            if let Some(host) = hostname_of(raw) {
                return Some(host);
            }
        }
    }
    None
}

fn hostname_of(raw: &str) -> Option<String> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = url::Url::parse(&with_scheme).ok()?;
    url.host_str().map(|h| h.to_string())
}

/// Case-insensitive prefix match used by the tool-name → `ActionType`
/// priority list (§4.1 step 2). Each entry is `(keywords, action_type)`;
/// a tool name matches if it starts with any keyword, case-insensitively,
/// followed by either end-of-string, `.`, or `_` (so `bash` matches
/// `bash_exec` but not `bashful`).
fn matches_prefix_group(tool_name_lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| {
        tool_name_lower == *kw
            || tool_name_lower
                .strip_prefix(kw)
                .map(|rest| rest.starts_with('.') || rest.starts_with('_'))
                .unwrap_or(false)
    })
}

/// Infer the [`ActionType`] of a tool invocation from its name and
/// parameters (§4.1 steps 2–3), including the write-vs-read disambiguation
/// and the credential-path upgrade (step 4).
pub fn infer_action_type(tool_name: &str, parameters: &BTreeMap<String, Json>) -> ActionType {
    let lower = tool_name.to_lowercase();

    if matches_prefix_group(
        &lower,
        &["bash", "shell", "subprocess", "exec", "run_command", "terminal", "sh"],
    ) {
        return ActionType::ShellCommand;
    }
    if matches_prefix_group(
        &lower,
        &["write_file", "save_file", "create_file", "append_file", "file.write"],
    ) || (lower.starts_with("write") || lower.starts_with("save") || lower.starts_with("create") || lower.starts_with("append"))
        && lower.contains("file")
    {
        let upgraded = extract_file_path(parameters)
            .filter(|p| is_credential_path(p))
            .is_some();
        return if upgraded { ActionType::CredentialAccess } else { ActionType::FileWrite };
    }
    if matches_prefix_group(&lower, &["read_file", "open_file", "cat", "read", "file.read"]) {
        let upgraded = extract_file_path(parameters)
            .filter(|p| is_credential_path(p))
            .is_some();
        return if upgraded { ActionType::CredentialAccess } else { ActionType::FileRead };
    }
    if matches_prefix_group(
        &lower,
        &["http", "requests", "request", "curl", "fetch", "web_request", "http_request", "http_post", "http_get"],
    ) {
        return ActionType::HttpRequest;
    }
    if matches_prefix_group(&lower, &["memory.write", "memory.set", "memory.update", "set_memory", "update_memory"]) {
        return ActionType::MemoryWrite;
    }
    if matches_prefix_group(&lower, &["credential", "secret", "vault", "keychain"]) {
        return ActionType::CredentialAccess;
    }

    // Step 3: inspect parameters.
    if let Some(path) = extract_file_path(parameters) {
        if is_credential_path(&path) {
            return ActionType::CredentialAccess;
        }
        let is_write = ["write", "save", "create", "append", "put"]
            .iter()
            .any(|kw| lower.contains(kw));
        return if is_write { ActionType::FileWrite } else { ActionType::FileRead };
    }
    if extract_url_domain(parameters).is_some() {
        return ActionType::HttpRequest;
    }
    for key in ["command", "cmd", "script"] {
        if matches!(parameters.get(key), Some(Json::String(s)) if !s.is_empty()) {
            return ActionType::ShellCommand;
        }
    }

    ActionType::ToolCall
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, Json> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Json::String(v.to_string())))
            .collect()
    }

    #[test]
    fn credential_extensions_are_detected() {
        assert!(is_credential_path("/tmp/server.pem"));
        assert!(is_credential_path("C:\\certs\\leaf.crt"));
        assert!(!is_credential_path("/tmp/notes.txt"));
    }

    #[test]
    fn curated_credential_suffixes_are_detected() {
        assert!(is_credential_path("~/.ssh/id_rsa"));
        assert!(is_credential_path("/home/user/.aws/credentials"));
        assert!(is_credential_path("/etc/shadow"));
        assert!(is_credential_path("credentials.json"));
    }

    #[test]
    fn bare_dotenv_files_are_detected() {
        assert!(is_credential_path(".env"));
        assert!(is_credential_path("/app/config/.env"));
        assert!(is_credential_path("/app/.env.production"));
    }

    #[test]
    fn non_credential_paths_are_not_flagged() {
        assert!(!is_credential_path("README.md"));
        assert!(!is_credential_path("src/main.rs"));
    }

    #[test]
    fn url_domain_extraction_strips_port_and_assumes_https() {
        let p = params(&[("url", "ngrok.io:8443/hook")]);
        assert_eq!(extract_url_domain(&p).as_deref(), Some("ngrok.io"));
        let p = params(&[("url", "https://api.example.com/v1")]);
        assert_eq!(extract_url_domain(&p).as_deref(), Some("api.example.com"));
    }

    #[test]
    fn tool_name_prefix_inference() {
        assert_eq!(infer_action_type("bash", &BTreeMap::new()), ActionType::ShellCommand);
        assert_eq!(infer_action_type("Shell.run", &BTreeMap::new()), ActionType::ShellCommand);
        assert_eq!(infer_action_type("read_file", &BTreeMap::new()), ActionType::FileRead);
        assert_eq!(infer_action_type("curl", &BTreeMap::new()), ActionType::HttpRequest);
        assert_eq!(infer_action_type("vault.read", &BTreeMap::new()), ActionType::CredentialAccess);
    }

    #[test]
    fn unmatched_tool_with_no_recognisable_params_defaults_to_tool_call() {
        let p: BTreeMap<String, Json> = BTreeMap::new();
        assert_eq!(infer_action_type("some_custom_tool", &p), ActionType::ToolCall);
    }

    #[test]
    fn param_inspection_disambiguates_write_vs_read() {
        let p = params(&[("path", "/tmp/out.txt")]);
        assert_eq!(infer_action_type("save_output", &p), ActionType::FileWrite);
        assert_eq!(infer_action_type("inspect_output", &p), ActionType::FileRead);
    }

    #[test]
    fn credential_path_upgrades_regardless_of_tool_intent() {
        let p = params(&[("path", "~/.ssh/id_rsa")]);
        assert_eq!(infer_action_type("read_file", &p), ActionType::CredentialAccess);
        assert_eq!(infer_action_type("save_file", &p), ActionType::CredentialAccess);
        assert_eq!(infer_action_type("my_custom_reader", &p), ActionType::CredentialAccess);
    }

    #[test]
    fn shell_command_inferred_from_parameters() {
        let p = params(&[("command", "ls -la")]);
        assert_eq!(infer_action_type("custom_tool", &p), ActionType::ShellCommand);
    }
}
