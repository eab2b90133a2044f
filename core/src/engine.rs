//! The pluggable ordered key/value engine contract plus the store-URL
//! scheme used to select and configure a concrete backend.

use std::collections::HashMap;

use ruc::*;

/// One (key, value) pair as returned by [`EngineTxn::iter`].
pub type KvPair = (Vec<u8>, Vec<u8>);

/// A transaction handle bound to one engine. Read transactions observe a
/// stable snapshot; write transactions are exclusive with respect to other
/// writers, either engine-native or via an internal mutex.
pub trait EngineTxn {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Write `value` under `key`, returning whatever was there before.
    fn replace(&mut self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>>;

    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Delete `key`, returning its prior value if any.
    fn pop(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Iterate from `start`. Forward: first element is the least key `>=
    /// start`, then ascending. Reverse: first element is the greatest key
    /// `<= start`, then descending.
    fn iter(&self, start: &[u8], reverse: bool) -> Result<Box<dyn Iterator<Item = KvPair> + '_>>;

    fn abort(self: Box<Self>) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<()>;
}

/// An ordered byte-to-byte map with transactional access. Key order is
/// memcmp; values are opaque byte strings.
pub trait Engine: Send + Sync {
    fn begin(&self, write: bool) -> Result<Box<dyn EngineTxn + '_>>;

    fn close(&self) -> Result<()>;
}

/// A parsed store URL: `scheme:/path[;key1[=val1][,key2[=val2]...]]` (spec
/// §6.1). Parameters missing a value are boolean `true`, represented here as
/// the string `"true"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineUrl {
    pub scheme: String,
    pub path: String,
    pub params: HashMap<String, String>,
}

impl EngineUrl {
    pub fn parse(url: &str) -> Result<EngineUrl> {
        let (head, rest) = match url.split_once(':') {
            Some(x) => x,
            None => return Err(eg!(format!("store url missing ':' scheme separator: {url}"))),
        };
        if head.is_empty() {
            return Err(eg!(format!("store url has an empty scheme: {url}")));
        }
        let (path, param_str) = match rest.split_once(';') {
            Some((p, q)) => (p, Some(q)),
            None => (rest, None),
        };

        let mut params = HashMap::new();
        if let Some(param_str) = param_str {
            for entry in param_str.split(',').filter(|e| !e.is_empty()) {
                match entry.split_once('=') {
                    Some((k, v)) => {
                        params.insert(k.to_string(), v.to_string());
                    }
                    None => {
                        params.insert(entry.to_string(), "true".to_string());
                    }
                }
            }
        }

        Ok(EngineUrl {
            scheme: head.to_string(),
            path: path.to_string(),
            params,
        })
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.param(key).map(|v| v == "true" || v == "1").unwrap_or(false)
    }
}
