use http::{Method, Uri};

/// Canonical request identity inside a cache: `METHOD::uri` plus the BLAKE3
/// digest used as the on-disk file name. GET-only requests reach the store,
/// but the method stays part of the key to keep identities self-describing.
#[derive(Debug, Clone)]
pub struct EntryKey {
    key_base: String,
    entry_id: String,
}

impl EntryKey {
    pub fn new(method: &Method, uri: &Uri) -> Self {
        let key_base = format!("{}::{}", method, uri);
        Self::from_key_base(key_base)
    }

    pub fn from_key_base(key_base: String) -> Self {
        let entry_id = Self::entry_id_for_key(&key_base);
        Self { key_base, entry_id }
    }

    pub fn key_base(&self) -> &str {
        &self.key_base
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn entry_id_for_key(key_base: &str) -> String {
        blake3::hash(key_base.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_include_full_uri() {
        let uri: Uri = "https://hub.example/data/links.json".parse().unwrap();
        let key = EntryKey::new(&Method::GET, &uri);
        assert_eq!(key.key_base(), "GET::https://hub.example/data/links.json");
        assert_eq!(key.entry_id().len(), 64);
    }

    #[test]
    fn distinct_hosts_produce_distinct_ids() {
        let a: Uri = "https://a.example/icon.png".parse().unwrap();
        let b: Uri = "https://b.example/icon.png".parse().unwrap();
        let key_a = EntryKey::new(&Method::GET, &a);
        let key_b = EntryKey::new(&Method::GET, &b);
        assert_ne!(key_a.entry_id(), key_b.entry_id());
    }
}
