//! URL canonicalizer (C1).
//!
//! Produces the cross-product of host variants and path variants described
//! in §4.1 of the design. Malformed escapes are never a reason to abort —
//! they are escaped defensively so the algorithm always terminates with a
//! (possibly large) but well-defined set.

use std::collections::BTreeSet;

use crate::error::CanonicalizeError;

const MAX_DOMAIN_LABELS_CONSIDERED: usize = 5;
const MAX_DOMAIN_ANCESTORS: usize = 4;
const MAX_PATH_PREFIXES: usize = 4;

/// Canonicalize `url`, returning the set of `host/path[?query]` strings to
/// hash. Deterministic: the same input byte sequence always yields the same
/// set (invariant 4 in §3).
pub fn canonicalize(url: &str) -> Result<BTreeSet<String>, CanonicalizeError> {
    let normalized = normalize_string(url);
    let (scheme, authority, path_and_query) = split_url(&normalized)?;
    let _ = scheme; // validated inside split_url; not otherwise part of the output

    let (raw_host, _userinfo, _port) = split_authority(&authority);
    if raw_host.is_empty() {
        return Err(CanonicalizeError::NoHost);
    }

    let (path_raw, query) = split_path_query(path_and_query);

    let host = normalize_host(&raw_host);
    let path = flatten_path(&path_raw);

    let host_variants = domain_variants(&host);
    let path_variants = path_variants(&path, query.as_deref());

    let mut out = BTreeSet::new();
    for h in &host_variants {
        for p in &path_variants {
            out.insert(format!("{h}/{p}"));
        }
    }
    Ok(out)
}

// ── Step 1: string normalization ─────────────────────────────────────────────

fn normalize_string(url: &str) -> String {
    let trimmed = url.trim();

    // Strip \r \t \n that appear before the query string (if any).
    let query_start = trimmed.find('?');
    let stripped: String = match query_start {
        Some(idx) => {
            let (pre, post) = trimmed.split_at(idx);
            let mut s = strip_control(pre);
            s.push_str(post);
            s
        }
        None => strip_control(trimmed),
    };

    // Drop the fragment.
    let without_fragment = match stripped.find('#') {
        Some(idx) => &stripped[..idx],
        None => &stripped,
    };

    // Prepend a scheme if none is present.
    if has_scheme(without_fragment) {
        without_fragment.to_string()
    } else {
        format!("http://{without_fragment}")
    }
}

fn strip_control(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '\r' | '\t' | '\n')).collect()
}

fn has_scheme(s: &str) -> bool {
    match s.find("://") {
        Some(idx) => {
            let candidate = &s[..idx];
            !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

fn split_url(s: &str) -> Result<(String, String, &str), CanonicalizeError> {
    let sep = s
        .find("://")
        .ok_or_else(|| CanonicalizeError::Malformed(s.to_string()))?;
    let scheme = s[..sep].to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(CanonicalizeError::UnsupportedScheme(scheme));
    }
    let rest = &s[sep + 3..];
    let authority_end = rest
        .find(['/', '?'])
        .unwrap_or(rest.len());
    let authority = rest[..authority_end].to_string();
    let path_and_query = &rest[authority_end..];
    Ok((scheme, authority, path_and_query))
}

/// Split `user:pass@host:port` into `(host, userinfo, port)`. Userinfo and
/// port are dropped from the canonical form; only the host participates.
fn split_authority(authority: &str) -> (String, Option<String>, Option<String>) {
    let (userinfo, host_port) = match authority.rfind('@') {
        Some(idx) => (Some(authority[..idx].to_string()), &authority[idx + 1..]),
        None => (None, authority),
    };
    // IPv6 literals are bracketed; don't split on ':' inside brackets. Not a
    // target of this algorithm (Safe-Browsing hosts are never IPv6), but
    // guard against mis-splitting rather than producing garbage.
    if host_port.starts_with('[') {
        return (host_port.to_string(), userinfo, None);
    }
    match host_port.rfind(':') {
        Some(idx) if host_port[idx + 1..].chars().all(|c| c.is_ascii_digit()) && idx + 1 < host_port.len() => {
            (host_port[..idx].to_string(), userinfo, Some(host_port[idx + 1..].to_string()))
        }
        _ => (host_port.to_string(), userinfo, None),
    }
}

fn split_path_query(path_and_query: &str) -> (String, Option<String>) {
    match path_and_query.split_once('?') {
        Some((p, q)) => (p.to_string(), Some(q.to_string())),
        None => (path_and_query.to_string(), None),
    }
}

// ── Step 2/3: path flattening + escape fixup ────────────────────────────────

/// Collapse `//`, `/./`, and `foo/../` in a path. Returns the path without a
/// leading slash (the output format joins `host` and `path` with `/` itself)
/// and without a trailing slash unless the original path was directory-like.
fn flatten_path(raw_path: &str) -> String {
    let unescaped = escape_bare_percent_and_hash(&percent_decode_idempotent(raw_path, 8));

    let had_trailing_slash = unescaped.ends_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for seg in unescaped.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    let mut out = stack.join("/");
    if had_trailing_slash && !out.is_empty() && !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Decode `%XX` sequences repeatedly until the string stops changing.
fn percent_decode_idempotent(s: &str, max_iters: usize) -> String {
    let mut cur = s.to_string();
    for _ in 0..max_iters {
        let next = percent_decode_once(&cur);
        if next == cur {
            break;
        }
        cur = next;
    }
    cur
}

fn percent_decode_once(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 3 <= bytes.len() {
            if let (Some(h), Some(l)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push((h << 4) | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Re-escape `#` as `%23` and any `%` not followed by two hex digits as
/// `%25`. This is what turns a stray `%%` into `%25%25` and a bare `%` at
/// the end of a path into `%25`.
fn escape_bare_percent_and_hash(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                out.push_str("%23");
                i += 1;
            }
            b'%' => {
                if i + 3 <= bytes.len() && hex_val(bytes[i + 1]).is_some() && hex_val(bytes[i + 2]).is_some() {
                    out.push_str(&s[i..i + 3]);
                    i += 3;
                } else {
                    out.push_str("%25");
                    i += 1;
                }
            }
            _ => {
                // Safe: we only ever skip ASCII '#'/'%', so byte-index
                // slicing on the remainder stays on a char boundary.
                let ch_len = s[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
                out.push_str(&s[i..i + ch_len]);
                i += ch_len;
            }
        }
    }
    out
}

fn normalize_host(raw_host: &str) -> String {
    let decoded = percent_decode_idempotent(raw_host, 8);
    let decoded = escape_bare_percent_and_hash(&decoded);
    let lowered = decoded.to_ascii_lowercase();

    let trimmed = lowered.trim_matches('.');
    let collapsed = collapse_dots(trimmed);

    if let Some(ip) = packed_ipv4(&collapsed) {
        return ip;
    }

    // Escape any byte outside [a-z0-9%_.\-/:] with %xx.
    let mut out = String::with_capacity(collapsed.len());
    for b in collapsed.bytes() {
        if b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'%' | b'_' | b'.' | b'-' | b'/' | b':') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02x}"));
        }
    }
    out
}

fn collapse_dots(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_dot = false;
    for c in s.chars() {
        if c == '.' {
            if last_was_dot {
                continue;
            }
            last_was_dot = true;
        } else {
            last_was_dot = false;
        }
        out.push(c);
    }
    out
}

/// If `host` is purely ASCII digits, interpret it as a packed 32-bit IPv4
/// address and render it dot-decimal (S1).
fn packed_ipv4(host: &str) -> Option<String> {
    if host.is_empty() || !host.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u32 = host.parse().ok()?;
    Some(format!(
        "{}.{}.{}.{}",
        (n >> 24) & 0xff,
        (n >> 16) & 0xff,
        (n >> 8) & 0xff,
        n & 0xff
    ))
}

fn is_dotted_ipv4(host: &str) -> bool {
    let parts: Vec<&str> = host.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.len() <= 3 && p.bytes().all(|b| b.is_ascii_digit()) && p.parse::<u16>().map(|v| v <= 255).unwrap_or(false))
}

// ── Step 4: domain variants ──────────────────────────────────────────────────

fn domain_variants(host: &str) -> Vec<String> {
    if is_dotted_ipv4(host) {
        return vec![host.to_string()];
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.is_empty() {
        return vec![host.to_string()];
    }

    let start = labels.len().saturating_sub(MAX_DOMAIN_LABELS_CONSIDERED);
    let relevant = &labels[start..];
    let n = relevant.len();

    let mut variants = vec![relevant.join(".")];
    let mut produced = 0;
    for strip in 1..n {
        if n - strip < 2 || produced >= MAX_DOMAIN_ANCESTORS {
            break;
        }
        variants.push(relevant[strip..].join("."));
        produced += 1;
    }
    variants
}

// ── Step 5: path variants ────────────────────────────────────────────────────

fn path_variants(path: &str, query: Option<&str>) -> Vec<String> {
    let mut out = Vec::new();

    // Always include the empty path.
    out.push(String::new());

    let is_dir = path.is_empty() || path.ends_with('/');
    let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let dir_component_count = if is_dir { components.len() } else { components.len().saturating_sub(1) };

    for k in 1..=dir_component_count.min(MAX_PATH_PREFIXES) {
        let prefix = components[..k].join("/");
        out.push(format!("{prefix}/"));
    }

    if !path.is_empty() {
        out.push(path.to_string());
        if let Some(q) = query {
            if !q.is_empty() {
                out.push(format!("{path}?{q}"));
            }
        }
    } else if let Some(q) = query {
        if !q.is_empty() {
            out.push(format!("?{q}"));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_ipv4_packed_host() {
        let set = canonicalize("http://3279880203/blah").unwrap();
        assert!(set.contains("195.127.0.11/blah"), "{set:?}");
        assert!(set.contains("195.127.0.11/"), "{set:?}");
        // IPv4 hosts never get ancestor stripping.
        assert!(!set.iter().any(|s| s.starts_with("127.0.11/")), "{set:?}");
    }

    #[test]
    fn s2_path_flattening_and_variants() {
        let set = canonicalize("http://a.b.c/1/./2//3/../4.html?x=1").unwrap();
        assert!(set.contains("a.b.c/1/2/4.html?x=1"), "{set:?}");
        assert!(set.contains("a.b.c/1/2/4.html"), "{set:?}");
        assert!(set.contains("a.b.c/"), "{set:?}");
        assert!(set.contains("a.b.c/1/"), "{set:?}");
        assert!(set.contains("a.b.c/1/2/"), "{set:?}");
        assert!(set.contains("b.c/1/2/4.html?x=1"), "{set:?}");
        assert!(set.contains("b.c/"), "{set:?}");
    }

    #[test]
    fn missing_scheme_defaults_to_http() {
        let set = canonicalize("example.com/a").unwrap();
        assert!(set.contains("example.com/a"));
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert!(matches!(
            canonicalize("ftp://example.com/a"),
            Err(CanonicalizeError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn fragment_is_dropped() {
        let set = canonicalize("http://example.com/a#section").unwrap();
        assert!(set.contains("example.com/a"));
        assert!(!set.iter().any(|s| s.contains('#')));
    }

    #[test]
    fn control_chars_before_query_are_stripped() {
        let set = canonicalize("http://example.com/a\t\r\nb?x=1").unwrap();
        assert!(set.contains("example.com/ab?x=1"));
    }

    #[test]
    fn leading_trailing_dots_and_dot_runs_collapse() {
        let set = canonicalize("http://.a..b.com./x").unwrap();
        assert!(set.iter().any(|s| s.starts_with("a.b.com/")), "{set:?}");
    }

    #[test]
    fn more_than_five_labels_uses_five_label_suffix() {
        let set = canonicalize("http://a.b.c.d.e.f.g/x").unwrap();
        // full suffix is the last five labels: c.d.e.f.g
        assert!(set.iter().any(|s| s.starts_with("c.d.e.f.g/")), "{set:?}");
        // never the full seven-label host
        assert!(!set.iter().any(|s| s.starts_with("a.b.c.d.e.f.g/")), "{set:?}");
        // never stripped down to a bare single label
        assert!(!set.iter().any(|s| s.starts_with("g/")), "{set:?}");
    }

    #[test]
    fn stray_percent_is_escaped_defensively() {
        let set = canonicalize("http://example.com/100%% done").unwrap();
        assert!(set.iter().any(|s| s.contains("100%25%25")), "{set:?}");
    }

    #[test]
    fn userinfo_and_port_are_dropped() {
        let set = canonicalize("http://user:pw@example.com:8080/a").unwrap();
        assert!(set.contains("example.com/a"));
        assert!(!set.iter().any(|s| s.contains('@') || s.contains("8080")));
    }

    #[test]
    fn canonicalize_is_deterministic() {
        let a = canonicalize("http://Example.COM/A/b?q=1").unwrap();
        let b = canonicalize("http://Example.COM/A/b?q=1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn idempotence_property() {
        // Invariant 3: canonicalizing any member of canonicalize(url), after
        // re-prepending a scheme, yields a subset of canonicalize(url).
        let original = canonicalize("http://a.b.c/1/2/x.html?y=1").unwrap();
        for member in &original {
            let reprocessed = canonicalize(&format!("http://{member}")).unwrap();
            for r in &reprocessed {
                assert!(
                    original.contains(r),
                    "re-canonicalized member {r:?} not in original set {original:?}"
                );
            }
        }
    }
}
