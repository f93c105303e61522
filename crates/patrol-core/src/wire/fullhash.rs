//! The `gethash` request/response wire format (§4.3, §6).

use crate::error::WireError;

/// One `(list, hash)` pair out of a full-hash response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullHashEntry {
    pub list: String,
    pub hash: [u8; 32],
}

/// A parsed full-hash response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullHashResponse {
    pub cache_lifetime_secs: u64,
    pub entries: Vec<FullHashEntry>,
}

const FULL_HASH_SIZE: usize = 32;

/// Build the `gethash` request body: `{prefixSize}:{totalBytes}\n{prefixes}`.
pub fn encode_gethash_request(prefix_size: usize, concatenated_prefixes: &[u8]) -> Vec<u8> {
    let mut out = format!("{prefix_size}:{}\n", concatenated_prefixes.len()).into_bytes();
    out.extend_from_slice(concatenated_prefixes);
    out
}

/// Parse a full-hash response body (§4.3). An empty body after the
/// cache-lifetime line is valid and means "no match".
pub fn parse_full_hash_response(body: &[u8]) -> Result<FullHashResponse, WireError> {
    let mut pos = 0usize;

    let (first_line, next) = read_line(body, pos)?;
    pos = next;
    let cache_lifetime_secs: u64 = first_line
        .trim()
        .parse()
        .map_err(|_| WireError::MalformedFullHash(format!("bad CACHELIFETIME {first_line:?}")))?;

    let mut entries = Vec::new();
    while pos < body.len() {
        let (line, next) = read_line(body, pos)?;
        pos = next;
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() < 3 {
            return Err(WireError::MalformedFullHash(format!("bad entry header {line:?}")));
        }
        let list = parts[0].to_string();
        let hash_size: usize = parts[1]
            .parse()
            .map_err(|_| WireError::MalformedFullHash(format!("bad HASHSIZE in {line:?}")))?;
        let num_responses: usize = parts[2]
            .parse()
            .map_err(|_| WireError::MalformedFullHash(format!("bad NUMRESPONSES in {line:?}")))?;
        let has_metadata = parts.get(3) == Some(&"m");

        if hash_size != FULL_HASH_SIZE {
            return Err(WireError::MalformedFullHash(format!(
                "unsupported HASHSIZE {hash_size}, only {FULL_HASH_SIZE}-byte full hashes are accepted"
            )));
        }

        let total = hash_size
            .checked_mul(num_responses)
            .ok_or_else(|| WireError::MalformedFullHash("HASHSIZE * NUMRESPONSES overflow".to_string()))?;
        if pos + total > body.len() {
            return Err(WireError::Truncated {
                expected: total,
                found: body.len() - pos,
            });
        }
        let hash_data = &body[pos..pos + total];
        pos += total;

        for chunk in hash_data.chunks(hash_size) {
            let mut hash = [0u8; FULL_HASH_SIZE];
            hash.copy_from_slice(chunk);
            entries.push(FullHashEntry { list: list.clone(), hash });
        }

        if has_metadata {
            for _ in 0..num_responses {
                let (metalen_line, next) = read_line(body, pos)?;
                pos = next;
                let metalen: usize = metalen_line
                    .trim()
                    .parse()
                    .map_err(|_| WireError::MalformedFullHash(format!("bad METADATALEN {metalen_line:?}")))?;
                if pos + metalen > body.len() {
                    return Err(WireError::Truncated {
                        expected: metalen,
                        found: body.len() - pos,
                    });
                }
                // Metadata content is not surfaced to callers (no policy
                // enforcement beyond the match itself), but still must be
                // consumed to keep the cursor aligned for the next entry.
                pos += metalen;
            }
        }
    }

    Ok(FullHashResponse {
        cache_lifetime_secs,
        entries,
    })
}

fn read_line(body: &[u8], pos: usize) -> Result<(&str, usize), WireError> {
    let rest = &body[pos..];
    let nl = rest
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| WireError::Truncated {
            expected: 1,
            found: 0,
        })?;
    let line = std::str::from_utf8(&rest[..nl])
        .map_err(|_| WireError::MalformedFullHash("non-UTF-8 header line".to_string()))?;
    Ok((line, pos + nl + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn empty_response_after_cachelifetime_means_no_match() {
        let resp = parse_full_hash_response(b"1800\n").unwrap();
        assert_eq!(resp.cache_lifetime_secs, 1800);
        assert!(resp.entries.is_empty());
    }

    #[test]
    fn single_entry_without_metadata() {
        let mut body = b"900\ngoog-malware-shavar:32:1\n".to_vec();
        body.extend_from_slice(&hash_of(0xab));
        let resp = parse_full_hash_response(&body).unwrap();
        assert_eq!(resp.cache_lifetime_secs, 900);
        assert_eq!(resp.entries.len(), 1);
        assert_eq!(resp.entries[0].list, "goog-malware-shavar");
        assert_eq!(resp.entries[0].hash, hash_of(0xab));
    }

    #[test]
    fn multiple_entries_across_lists() {
        let mut body = b"900\ngoog-malware-shavar:32:2\n".to_vec();
        body.extend_from_slice(&hash_of(1));
        body.extend_from_slice(&hash_of(2));
        body.extend_from_slice(b"goog-phish-shavar:32:1\n");
        body.extend_from_slice(&hash_of(3));
        let resp = parse_full_hash_response(&body).unwrap();
        assert_eq!(resp.entries.len(), 3);
        assert_eq!(resp.entries[2].list, "goog-phish-shavar");
    }

    #[test]
    fn metadata_is_skipped_but_consumed() {
        let mut body = b"900\ngoog-malware-shavar:32:1:m\n".to_vec();
        body.extend_from_slice(&hash_of(7));
        body.extend_from_slice(b"5\nhello");
        let resp = parse_full_hash_response(&body).unwrap();
        assert_eq!(resp.entries.len(), 1);
        assert_eq!(resp.entries[0].hash, hash_of(7));
    }

    #[test]
    fn rejects_non_32_byte_hash_size() {
        let body = b"900\ngoog-malware-shavar:4:1\n\xde\xad\xbe\xef".to_vec();
        assert!(matches!(
            parse_full_hash_response(&body),
            Err(WireError::MalformedFullHash(_))
        ));
    }

    #[test]
    fn truncated_hash_data_is_an_error() {
        let body = b"900\ngoog-malware-shavar:32:2\n\x00\x00".to_vec();
        assert!(matches!(parse_full_hash_response(&body), Err(WireError::Truncated { .. })));
    }

    #[test]
    fn encode_gethash_request_builds_header_and_body() {
        let prefixes = [0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04];
        let body = encode_gethash_request(4, &prefixes);
        assert!(body.starts_with(b"4:8\n"));
        assert_eq!(&body[4..], &prefixes);
    }
}
