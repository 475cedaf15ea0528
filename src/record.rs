//! Fixed-layout record codec.
//!
//! `Record` is the capability every index engine is generic over: a type
//! with a statically-known packed byte size, an infallible decoder, a
//! fallible encoder, and an accessor for the primary key string. This is
//! the "v-table" abstraction described for record types that aren't known
//! until runtime in the source system: in Rust we get it for free via a
//! trait bound instead of passing `(pack, unpack, key_of, size)` by hand.
//!
//! The free functions below (`encode_fixed_string`, `encode_float_vec`, ...)
//! implement the field type system from the spec (fixed-width integer,
//! IEEE-754 float, fixed-length NUL-padded string, 12-byte date string,
//! fixed-length float vector) so that any concrete record type can build
//! its `pack`/`unpack` out of them field by field.

use crate::error::{EngineError, Result};

/// A record type with a fixed packed size, used as the payload type of
/// every index engine (`BPlusTree<R>`, `ExtendibleHashing<R>`, `SequentialFile<R>`).
pub trait Record: Sized + Clone {
    /// Exact length, in bytes, that `pack` always produces.
    const RECORD_SIZE: usize;

    /// Encode into exactly `RECORD_SIZE` bytes. Fails only on internally
    /// inconsistent input (e.g. a float vector field of the wrong length).
    fn pack(&self) -> Result<Vec<u8>>;

    /// Decode a slot's bytes. Never fails: malformed unicode is replaced
    /// losslessly, and a slice shorter than `RECORD_SIZE` is treated as if
    /// it were zero-padded. Trailing NULs are stripped from string fields.
    fn unpack(bytes: &[u8]) -> Self;

    /// The designated primary key, as UTF-8. An empty string is a
    /// syntactically valid key; whether it may be inserted is a decision
    /// each engine makes (`add`).
    fn primary_key(&self) -> String;
}

/// Write `s`, truncated to `width` bytes and right-padded with NUL, into `out`.
pub fn encode_fixed_string(s: &str, width: usize, out: &mut Vec<u8>) {
    let bytes = s.as_bytes();
    let take = bytes.len().min(width);
    out.extend_from_slice(&bytes[..take]);
    out.resize(out.len() + (width - take), 0);
}

/// Decode a fixed-width NUL-padded string field, stripping trailing NULs
/// and replacing invalid UTF-8 rather than panicking.
pub fn decode_fixed_string(bytes: &[u8]) -> String {
    let trimmed = match bytes.iter().rposition(|&b| b != 0) {
        Some(last) => &bytes[..=last],
        None => &[][..],
    };
    String::from_utf8_lossy(trimmed).into_owned()
}

/// Encode a fixed-length float vector field. Fails if `v.len() != width`,
/// the one case the spec calls out as an `EncodeError`.
pub fn encode_float_vec(v: &[f32], width: usize, out: &mut Vec<u8>) -> Result<()> {
    if v.len() != width {
        return Err(EngineError::Encode(format!(
            "float vector field expected length {width}, got {}",
            v.len()
        )));
    }
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    Ok(())
}

/// Decode a fixed-length float vector field. Never fails: a short input is
/// padded with `0.0`.
pub fn decode_float_vec(bytes: &[u8], width: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(width);
    for i in 0..width {
        let start = i * 4;
        let mut buf = [0u8; 4];
        if start + 4 <= bytes.len() {
            buf.copy_from_slice(&bytes[start..start + 4]);
        }
        out.push(f32::from_le_bytes(buf));
    }
    out
}

/// Read an `i32` at `offset`, returning `0` if the slice is too short.
pub fn decode_i32(bytes: &[u8], offset: usize) -> i32 {
    let mut buf = [0u8; 4];
    if offset + 4 <= bytes.len() {
        buf.copy_from_slice(&bytes[offset..offset + 4]);
    }
    i32::from_le_bytes(buf)
}

/// Read an `f32` at `offset`, returning `0.0` if the slice is too short.
pub fn decode_f32(bytes: &[u8], offset: usize) -> f32 {
    let mut buf = [0u8; 4];
    if offset + 4 <= bytes.len() {
        buf.copy_from_slice(&bytes[offset..offset + 4]);
    }
    f32::from_le_bytes(buf)
}

/// A worked-example schema exercising every field kind the codec supports:
/// fixed-width integers, IEEE-754 floats, NUL-padded strings, a 12-byte
/// date string, and a fixed-length float vector. Carried over from the
/// source system's track/song schema (`track_id` is the primary key), with
/// an `embedding` field added so the float-vector kind has a concrete user.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub track_id: String,
    pub track_name: String,
    pub track_artist: String,
    pub track_popularity: i32,
    pub track_album_id: String,
    pub track_album_name: String,
    pub track_album_release_date: String,
    pub acousticness: f32,
    pub instrumentalness: f32,
    pub duration_ms: i32,
    pub embedding: Vec<f32>,
}

impl TrackRecord {
    pub const TRACK_ID_LEN: usize = 30;
    pub const TRACK_NAME_LEN: usize = 100;
    pub const TRACK_ARTIST_LEN: usize = 40;
    pub const ALBUM_ID_LEN: usize = 30;
    pub const ALBUM_NAME_LEN: usize = 100;
    pub const DATE_LEN: usize = 12;
    pub const EMBEDDING_LEN: usize = 4;
}

impl Default for TrackRecord {
    fn default() -> Self {
        TrackRecord {
            track_id: String::new(),
            track_name: String::new(),
            track_artist: String::new(),
            track_popularity: 0,
            track_album_id: String::new(),
            track_album_name: String::new(),
            track_album_release_date: String::new(),
            acousticness: 0.0,
            instrumentalness: 0.0,
            duration_ms: 0,
            embedding: vec![0.0; TrackRecord::EMBEDDING_LEN],
        }
    }
}

impl Record for TrackRecord {
    const RECORD_SIZE: usize = TrackRecord::TRACK_ID_LEN
        + TrackRecord::TRACK_NAME_LEN
        + TrackRecord::TRACK_ARTIST_LEN
        + 4 // track_popularity
        + TrackRecord::ALBUM_ID_LEN
        + TrackRecord::ALBUM_NAME_LEN
        + TrackRecord::DATE_LEN
        + 4 // acousticness
        + 4 // instrumentalness
        + 4 // duration_ms
        + TrackRecord::EMBEDDING_LEN * 4;

    fn pack(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(Self::RECORD_SIZE);
        encode_fixed_string(&self.track_id, Self::TRACK_ID_LEN, &mut out);
        encode_fixed_string(&self.track_name, Self::TRACK_NAME_LEN, &mut out);
        encode_fixed_string(&self.track_artist, Self::TRACK_ARTIST_LEN, &mut out);
        out.extend_from_slice(&self.track_popularity.to_le_bytes());
        encode_fixed_string(&self.track_album_id, Self::ALBUM_ID_LEN, &mut out);
        encode_fixed_string(&self.track_album_name, Self::ALBUM_NAME_LEN, &mut out);
        encode_fixed_string(&self.track_album_release_date, Self::DATE_LEN, &mut out);
        out.extend_from_slice(&self.acousticness.to_le_bytes());
        out.extend_from_slice(&self.instrumentalness.to_le_bytes());
        out.extend_from_slice(&self.duration_ms.to_le_bytes());
        encode_float_vec(&self.embedding, Self::EMBEDDING_LEN, &mut out)?;
        debug_assert_eq!(out.len(), Self::RECORD_SIZE);
        Ok(out)
    }

    fn unpack(bytes: &[u8]) -> Self {
        if bytes.len() < Self::RECORD_SIZE {
            return TrackRecord::default();
        }
        let mut off = 0usize;
        let mut next = |width: usize| {
            let slice = &bytes[off..off + width];
            off += width;
            slice
        };

        let track_id = decode_fixed_string(next(Self::TRACK_ID_LEN));
        let track_name = decode_fixed_string(next(Self::TRACK_NAME_LEN));
        let track_artist = decode_fixed_string(next(Self::TRACK_ARTIST_LEN));
        let track_popularity = decode_i32(next(4), 0);
        let track_album_id = decode_fixed_string(next(Self::ALBUM_ID_LEN));
        let track_album_name = decode_fixed_string(next(Self::ALBUM_NAME_LEN));
        let track_album_release_date = decode_fixed_string(next(Self::DATE_LEN));
        let acousticness = decode_f32(next(4), 0);
        let instrumentalness = decode_f32(next(4), 0);
        let duration_ms = decode_i32(next(4), 0);
        let embedding = decode_float_vec(next(Self::EMBEDDING_LEN * 4), Self::EMBEDDING_LEN);

        TrackRecord {
            track_id,
            track_name,
            track_artist,
            track_popularity,
            track_album_id,
            track_album_name,
            track_album_release_date,
            acousticness,
            instrumentalness,
            duration_ms,
            embedding,
        }
    }

    fn primary_key(&self) -> String {
        self.track_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> TrackRecord {
        TrackRecord {
            track_id: id.to_string(),
            track_name: "Song Name".to_string(),
            track_artist: "Artist".to_string(),
            track_popularity: 87,
            track_album_id: "album-1".to_string(),
            track_album_name: "Album".to_string(),
            track_album_release_date: "2020-01-01".to_string(),
            acousticness: 0.42,
            instrumentalness: 0.01,
            duration_ms: 215_000,
            embedding: vec![0.1, 0.2, 0.3, 0.4],
        }
    }

    #[test]
    fn pack_has_exact_record_size() {
        let r = sample("K001");
        assert_eq!(r.pack().unwrap().len(), TrackRecord::RECORD_SIZE);
    }

    #[test]
    fn round_trip_is_identity() {
        let r = sample("K002");
        let packed = r.pack().unwrap();
        let back = TrackRecord::unpack(&packed);
        assert_eq!(r, back);
    }

    #[test]
    fn unpack_zero_filled_block_is_empty_not_a_crash() {
        let zeros = vec![0u8; TrackRecord::RECORD_SIZE];
        let r = TrackRecord::unpack(&zeros);
        assert_eq!(r.track_id, "");
        assert_eq!(r.track_popularity, 0);
        assert_eq!(r.acousticness, 0.0);
        assert_eq!(r.embedding, vec![0.0; TrackRecord::EMBEDDING_LEN]);
    }

    #[test]
    fn unpack_short_input_never_panics() {
        for len in [0usize, 1, 10, TrackRecord::RECORD_SIZE - 1] {
            let buf = vec![0xFFu8; len];
            let r = TrackRecord::unpack(&buf);
            assert_eq!(r.track_id, "");
        }
    }

    #[test]
    fn oversize_strings_are_truncated_not_rejected() {
        let mut r = sample("K003");
        r.track_name = "x".repeat(TrackRecord::TRACK_NAME_LEN + 50);
        let packed = r.pack().unwrap();
        let back = TrackRecord::unpack(&packed);
        assert_eq!(back.track_name.len(), TrackRecord::TRACK_NAME_LEN);
    }

    #[test]
    fn wrong_length_vector_is_an_encode_error() {
        let mut r = sample("K004");
        r.embedding = vec![1.0, 2.0];
        assert!(matches!(r.pack(), Err(EngineError::Encode(_))));
    }

    #[test]
    fn trailing_nuls_stripped_on_unpack() {
        let r = sample("K005");
        let packed = r.pack().unwrap();
        let back = TrackRecord::unpack(&packed);
        assert!(!back.track_id.contains('\0'));
        assert!(!back.track_name.contains('\0'));
    }
}
