//! Sorted request-header collection.
//!
//! Request signing needs headers in case-insensitive lexicographic key
//! order, so the collection keeps that order on every insert instead of
//! sorting at signing time. Keys keep their original case for the wire;
//! the canonical renditions lowercase them.

use std::cmp::Ordering;

/// Ordered `key: value` collection, case-insensitive on keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `key: value`, both trimmed, keeping the sort order.
    ///
    /// A case-equal key is overwritten in place; a key that trims to
    /// nothing is a no-op.
    pub fn insert(&mut self, key: &str, value: &str) {
        let key = key.trim();
        if key.is_empty() {
            return;
        }
        let value = value.trim();
        for (idx, (existing, _)) in self.entries.iter().enumerate() {
            match cmp_keys(key, existing) {
                Ordering::Equal => {
                    self.entries[idx] = (key.to_string(), value.to_string());
                    return;
                }
                Ordering::Less => {
                    self.entries.insert(idx, (key.to_string(), value.to_string()));
                    return;
                }
                Ordering::Greater => {}
            }
        }
        self.entries.push((key.to_string(), value.to_string()));
    }

    /// Removes every case-equal entry.
    pub fn remove(&mut self, key: &str) {
        let key = key.trim();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
    }

    /// Case-insensitive lookup of the trimmed value.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.trim();
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// `;`-joined lowercased keys in order.
    ///
    /// Entries with an empty value are skipped: the transport drops such
    /// headers, and the signature has to agree with what goes on the wire.
    pub fn sorted_keys(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            if value.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push(';');
            }
            out.push_str(&key.to_ascii_lowercase());
        }
        out
    }

    /// `\n`-terminated `lowercase-key:value` lines in order, optionally
    /// restricted to `x-amz`-prefixed keys. An empty collection yields a
    /// single `\n`; empty-valued entries are skipped as in
    /// [`sorted_keys`](Self::sorted_keys).
    pub fn canonical(&self, only_amz: bool) -> String {
        if self.entries.is_empty() {
            return "\n".to_string();
        }
        let mut out = String::new();
        for (key, value) in &self.entries {
            if value.is_empty() {
                continue;
            }
            let key = key.to_ascii_lowercase();
            if only_amz && !key.starts_with("x-amz") {
                continue;
            }
            out.push_str(&key);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Entries in order, as stored.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn cmp_keys(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|b| b.to_ascii_lowercase())
        .cmp(b.bytes().map(|b| b.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_case_insensitive_order() {
        let mut headers = HeaderList::new();
        headers.insert("x-amz-meta-owner", "me");
        headers.insert("Content-Type", "text/plain");
        headers.insert("Host", "bucket.example.com");
        headers.insert("content-md5", "abc");

        let keys: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec!["content-md5", "Content-Type", "Host", "x-amz-meta-owner"]
        );
    }

    #[test]
    fn case_equal_insert_overwrites_in_place() {
        let mut headers = HeaderList::new();
        headers.insert("Content-Type", "text/plain");
        headers.insert("CONTENT-TYPE", "application/xml");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("content-type"), Some("application/xml"));
    }

    #[test]
    fn insert_trims_key_and_value() {
        let mut headers = HeaderList::new();
        headers.insert("  X-Amz-Date  ", "  20200101T000000Z  ");
        assert_eq!(headers.get("x-amz-date"), Some("20200101T000000Z"));
        headers.insert("   ", "ignored");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn remove_drops_all_case_equal_entries() {
        let mut headers = HeaderList::new();
        headers.insert("a", "1");
        headers.insert("B", "2");
        headers.insert("c", "3");
        headers.remove("b");
        assert_eq!(headers.get("B"), None);
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn sorted_keys_skips_empty_values() {
        let mut headers = HeaderList::new();
        headers.insert("Host", "example.com");
        headers.insert("X-Amz-Acl", "");
        headers.insert("x-amz-date", "20200101T000000Z");
        assert_eq!(headers.sorted_keys(), "host;x-amz-date");
    }

    #[test]
    fn canonical_lines_are_lowercased_and_terminated() {
        let mut headers = HeaderList::new();
        headers.insert("Host", "bucket.example.com");
        headers.insert("X-Amz-Date", "20200101T000000Z");
        headers.insert("x-amz-content-sha256", "UNSIGNED-PAYLOAD");
        assert_eq!(
            headers.canonical(false),
            "host:bucket.example.com\nx-amz-content-sha256:UNSIGNED-PAYLOAD\nx-amz-date:20200101T000000Z\n"
        );
        assert_eq!(
            headers.canonical(true),
            "x-amz-content-sha256:UNSIGNED-PAYLOAD\nx-amz-date:20200101T000000Z\n"
        );
    }

    #[test]
    fn canonical_of_empty_list_is_a_single_newline() {
        assert_eq!(HeaderList::new().canonical(false), "\n");
        assert_eq!(HeaderList::new().canonical(true), "\n");
    }
}
