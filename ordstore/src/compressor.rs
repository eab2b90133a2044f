//! Compressors: a registered `(compress, decompress)` pair with a numeric id
//! byte prefixed to every physical value.

use ruc::*;

use crate::error::Error;

/// A compression method. `id()` must be stable once a store has persisted
/// records compressed with it: ids are reserved 1..N for built-ins,
/// assigned starting at 10 for user compressors/encoders.
pub trait Compressor: Send + Sync {
    fn name(&self) -> &str;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Performs no compression at all — the default packer.
pub struct Plain;

impl Compressor for Plain {
    fn name(&self) -> &str {
        "plain"
    }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Compresses with zlib (deflate).
#[cfg(feature = "compress")]
pub struct Zlib;

#[cfg(feature = "compress")]
impl Compressor for Zlib {
    fn name(&self) -> &str {
        "zlib"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        use std::io::Write as _;
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).c(d!())?;
        encoder.finish().c(d!())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        use std::io::Read as _;
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).c(d!())?;
        Ok(out)
    }
}

/// Builtin compressor/encoder ids, reserved 1..N; user compressors and
/// encoders are assigned ids starting at 10 by a dedicated `Store` counter.
pub const BUILTIN_ID_KEY: u8 = 1;
pub const BUILTIN_ID_JSON: u8 = 2;
pub const BUILTIN_ID_PLAIN: u8 = 3;
pub const BUILTIN_ID_ZLIB: u8 = 4;

/// The first id handed out to a user-registered encoder/compressor/
/// collection/index.
pub const FIRST_USER_ID: u64 = 10;

pub fn by_name(name: &str) -> Result<Box<dyn Compressor>> {
    match name {
        "plain" => Ok(Box::new(Plain)),
        #[cfg(feature = "compress")]
        "zlib" => Ok(Box::new(Zlib)),
        other => {
            Err(Error::NotFound(format!("no builtin compressor named {other:?}"))).c(d!())
        }
    }
}

/// Resolve a builtin compressor by its reserved id byte. User-registered
/// compressors are not supported — record-format registration stays
/// out of scope here the same way it does for record encoders.
pub fn by_id(id: u8) -> Result<Box<dyn Compressor>> {
    match id {
        BUILTIN_ID_PLAIN => Ok(Box::new(Plain)),
        #[cfg(feature = "compress")]
        BUILTIN_ID_ZLIB => Ok(Box::new(Zlib)),
        other => Err(Error::NotFound(format!("no builtin compressor with id {other}"))).c(d!()),
    }
}
