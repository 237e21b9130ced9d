mod seek_ext;
mod shared_stream;
mod take_seek;

pub use seek_ext::SeekExt;
pub use shared_stream::SharedStream;
pub use take_seek::{TakeSeek, TakeSeekExt};

use std::io::{self, Read, Seek, SeekFrom};

/// Anything the core can parse a chunk out of.
pub trait Reader: Read + Seek + core::fmt::Debug {}
impl<T: Read + Seek + core::fmt::Debug> Reader for T {}

/// Runs `f`, rewinding `reader` to its starting position if `f` fails.
///
/// Decoders read variable-length records and may discover a malformed record
/// only partway through; callers that want to retry with a different
/// interpretation (see the chunk-index-width ambiguity in `reelcore`) need
/// the stream back where they found it.
pub fn restore_on_error<R: Read + Seek, F: FnOnce(&mut R, u64) -> io::Result<T>, T>(reader: &mut R, f: F) -> io::Result<T> {
    let pos = reader.pos()?;
    f(reader, pos).or_else(|err| {
        reader.seek(SeekFrom::Start(pos))?;
        Err(err)
    })
}
