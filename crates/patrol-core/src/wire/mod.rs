//! The List Service wire format (C3): the text header on `downloads`
//! responses, the binary `ChunkData` stream fetched from redirects, and the
//! mixed ASCII/binary `gethash` response.

pub mod chunk_data;
pub mod fullhash;
pub mod header;

pub use chunk_data::{decode_chunk_data, decode_chunk_stream, encode_chunk_data, encode_chunk_stream, ChunkData, ChunkType, PrefixType};
pub use fullhash::{encode_gethash_request, parse_full_hash_response, FullHashEntry, FullHashResponse};
pub use header::{build_update_line, parse_update_header, ListUpdate, UpdateResponseHeader};
