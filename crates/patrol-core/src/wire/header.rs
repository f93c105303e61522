//! The `downloads` response's text control-line header (§4.3) and the
//! matching request-line builder.

use crate::error::WireError;
use crate::range::RangeSet;

/// One list's directives parsed out of an update-response header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListUpdate {
    pub list: String,
    pub redirects: Vec<String>,
    pub delete_add: RangeSet,
    pub delete_sub: RangeSet,
    pub please_reset: bool,
}

/// The fully parsed update-response header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResponseHeader {
    /// `n:` — minimum wait, in seconds, before the next poll.
    pub wait_secs: Option<u64>,
    pub lists: Vec<ListUpdate>,
}

/// Parse the whitespace/newline-separated control lines of an update
/// response. A response with an empty body parses to an all-default header
/// (callers treat that as `defaultRetry`, per §6).
pub fn parse_update_header(body: &str) -> Result<UpdateResponseHeader, WireError> {
    let mut header = UpdateResponseHeader::default();
    let mut current: Option<usize> = None;

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("n:") {
            let secs: u64 = rest.parse().map_err(|_| WireError::MalformedHeaderLine(line.to_string()))?;
            header.wait_secs = Some(secs);
            continue;
        }

        if let Some(list) = line.strip_prefix("i:") {
            header.lists.push(ListUpdate {
                list: list.to_string(),
                ..ListUpdate::default()
            });
            current = Some(header.lists.len() - 1);
            continue;
        }

        let idx = current.ok_or_else(|| WireError::MalformedHeaderLine(line.to_string()))?;

        if let Some(url) = line.strip_prefix("u:") {
            header.lists[idx].redirects.push(url.to_string());
        } else if let Some(ranges) = line.strip_prefix("ad:") {
            let parsed = RangeSet::parse(ranges)?;
            merge_ranges(&mut header.lists[idx].delete_add, parsed);
        } else if let Some(ranges) = line.strip_prefix("sd:") {
            let parsed = RangeSet::parse(ranges)?;
            merge_ranges(&mut header.lists[idx].delete_sub, parsed);
        } else if line == "r:pleasereset" {
            header.lists[idx].please_reset = true;
        } else {
            return Err(WireError::MalformedHeaderLine(line.to_string()));
        }
    }

    Ok(header)
}

fn merge_ranges(into: &mut RangeSet, more: RangeSet) {
    let merged = into.iter().chain(more.iter());
    *into = RangeSet::from_ids(merged.collect::<Vec<_>>());
}

/// Build one list's request line: `<list>;[a:<aRange>][:s:<sRange>]\n`.
/// Omits `a:`/`s:` terms whose range is empty; a list with nothing held yet
/// still emits its bare name so the server knows to send everything.
pub fn build_update_line(list: &str, a_range: &str, s_range: &str) -> String {
    let mut line = list.to_string();
    line.push(';');
    let mut wrote_a = false;
    if !a_range.is_empty() {
        line.push_str("a:");
        line.push_str(a_range);
        wrote_a = true;
    }
    if !s_range.is_empty() {
        if wrote_a {
            line.push(':');
        }
        line.push_str("s:");
        line.push_str(s_range);
    }
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_all_defaults() {
        let header = parse_update_header("").unwrap();
        assert_eq!(header, UpdateResponseHeader::default());
    }

    #[test]
    fn s3_happy_path_header() {
        let header = parse_update_header("n:1200\ni:goog-malware-shavar\nu:cache.example/chunks\n").unwrap();
        assert_eq!(header.wait_secs, Some(1200));
        assert_eq!(header.lists.len(), 1);
        assert_eq!(header.lists[0].list, "goog-malware-shavar");
        assert_eq!(header.lists[0].redirects, vec!["cache.example/chunks".to_string()]);
    }

    #[test]
    fn please_reset_directive() {
        let header = parse_update_header("i:goog-malware-shavar\nr:pleasereset\n").unwrap();
        assert!(header.lists[0].please_reset);
    }

    #[test]
    fn delete_ranges_accumulate_across_lines() {
        let header = parse_update_header("i:a\nad:1-3\nad:5\n").unwrap();
        assert_eq!(header.lists[0].delete_add.to_compact_string(), "1-3,5");
    }

    #[test]
    fn directive_before_any_list_is_malformed() {
        assert!(parse_update_header("u:cache.example/chunks\n").is_err());
    }

    #[test]
    fn unknown_directive_is_malformed() {
        assert!(parse_update_header("i:a\nx:bogus\n").is_err());
    }

    #[test]
    fn build_update_line_omits_empty_terms() {
        assert_eq!(build_update_line("goog-malware-shavar", "", ""), "goog-malware-shavar;\n");
        assert_eq!(build_update_line("goog-malware-shavar", "1-3", ""), "goog-malware-shavar;a:1-3\n");
        assert_eq!(build_update_line("goog-malware-shavar", "", "5"), "goog-malware-shavar;s:5\n");
        assert_eq!(
            build_update_line("goog-malware-shavar", "1-3", "5"),
            "goog-malware-shavar;a:1-3:s:5\n"
        );
    }
}
