//! Little-endian binary value I/O over in-memory buffers.
//!
//! Every on-disk structure in geofuse (presence masks, KVP geometry and
//! attribute stores) is little-endian, so the reader and writer here are
//! fixed to that byte order instead of being generic over it.

mod reader;
mod writer;

pub use reader::BinaryReader;
pub use writer::BinaryWriter;
