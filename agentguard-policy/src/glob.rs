//! Glob matching for `deny_path_patterns` and `deny_domains` (§4.2).

use agentguard_core::expand_home;
use regex::Regex;

/// Translate a glob pattern with `**`/`*`/`?` support into a regex pattern
/// string. `**/` becomes "zero or more path segments"; bare `**` becomes
/// "anything"; `*` is "any run of non-`/` chars"; `?` is "one non-`/` char";
/// everything else is escaped literally.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i..].starts_with(&['*', '*', '/']) {
            out.push_str("(?:.+/)?");
            i += 3;
        } else if chars[i..].starts_with(&['*', '*']) {
            out.push_str(".*");
            i += 2;
        } else if chars[i] == '*' {
            out.push_str("[^/]*");
            i += 1;
        } else if chars[i] == '?' {
            out.push_str("[^/]");
            i += 1;
        } else {
            out.push_str(&regex::escape(&chars[i].to_string()));
            i += 1;
        }
    }
    out
}

/// Match a file path against a glob pattern, per §4.2's path glob semantics:
/// `~` expansion on both sides, separator normalisation, full-string match.
pub fn path_matches(path: &str, pattern: &str) -> bool {
    let expanded_path = expand_home(path).replace('\\', "/");
    let expanded_path = expanded_path.trim_end_matches('/');
    let expanded_pattern = expand_home(pattern).replace('\\', "/");
    let expanded_pattern = expanded_pattern.trim_end_matches('/');

    let regex_str = format!("^{}$", glob_to_regex(expanded_pattern));
    match Regex::new(&regex_str) {
        Ok(re) => re.is_match(expanded_path),
        Err(_) => false,
    }
}

/// Match a domain against a deny-list pattern, per §4.2's domain glob
/// semantics: `*.foo.bar` matches `foo.bar` itself or any subdomain;
/// anything else falls back to general glob matching.
pub fn domain_matches(domain: &str, pattern: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return domain == suffix || domain.ends_with(&format!(".{suffix}"));
    }
    let regex_str = format!("^{}$", glob_to_regex(pattern));
    match Regex::new(&regex_str) {
        Ok(re) => re.is_match(domain),
        Err(_) => domain == pattern,
    }
}

/// Case-insensitive `fnmatch`-style glob match used for `deny_tools` /
/// `allow_tools` / `review_tools` (tool names have no path structure, so
/// `*` and `?` match any character including `/`).
pub fn tool_name_matches(tool_name: &str, pattern: &str) -> bool {
    let tool_name = tool_name.to_lowercase();
    let pattern = pattern.to_lowercase();
    let mut out = String::new();
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    let regex_str = format!("^{out}$");
    match Regex::new(&regex_str) {
        Ok(re) => re.is_match(&tool_name),
        Err(_) => tool_name == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_star_matches_any_depth() {
        assert!(path_matches("/home/user/.ssh/id_rsa", "~/.ssh/**"));
        assert!(path_matches("/a/b/c/secret.pem", "**/*.pem"));
    }

    #[test]
    fn single_star_does_not_cross_segments() {
        assert!(!path_matches("/a/b/c.txt", "/a/*.txt"));
        assert!(path_matches("/a/c.txt", "/a/*.txt"));
    }

    #[test]
    fn domain_wildcard_matches_exact_and_subdomains() {
        assert!(domain_matches("ngrok.io", "*.ngrok.io"));
        assert!(domain_matches("abc123.ngrok.io", "*.ngrok.io"));
        assert!(!domain_matches("notngrok.io", "*.ngrok.io"));
    }

    #[test]
    fn tool_name_match_is_case_insensitive() {
        assert!(tool_name_matches("Bash", "bash"));
        assert!(tool_name_matches("bash_exec", "bash*"));
        assert!(!tool_name_matches("shell", "bash"));
    }

    proptest::proptest! {
        #[test]
        fn glob_star_never_panics(s in "[a-zA-Z0-9/._*?-]{0,40}", p in "[a-zA-Z0-9/._*?-]{0,40}") {
            let _ = path_matches(&s, &p);
            let _ = domain_matches(&s, &p);
            let _ = tool_name_matches(&s, &p);
        }
    }
}
