//! Character streams backed by raw bytes.
//!
//! A [`CharacterStream`] accepts bytes, groups them into characters using the
//! [`CharsetReader`] of its charset and hands those characters back one group
//! of raw bytes at a time. Characters are never decoded into code points, so
//! whatever is read back is exactly what was written.
//!
//! ## Storage
//!
//! All accepted bytes live in one contiguous arena. For fixed-width charsets
//! the position of character `i` is `i * width`, so no index is kept. For
//! variable-width charsets a parallel vector records where each character
//! starts. Either way seeking to a character offset is O(1).

use std::io::{self, Read};
use std::ops::Range;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::factory::CharsetReaderFactory;
use crate::reader::{CharsetReader, Classification};

/// Chunk size used when draining byte sources.
pub const READ_CHUNK_SIZE: usize = 8192;

/// Charset binding state of a stream.
#[derive(Debug, Clone)]
pub enum CharsetBinding {
    /// The charset name could not be resolved; writes fail.
    Unbound(String),
    /// The charset is resolved to a reader.
    Bound {
        /// Charset name as given by the caller.
        charset: String,
        /// Reader classifying bytes for this charset.
        reader: Arc<dyn CharsetReader>,
    },
}

impl CharsetBinding {
    /// Returns the charset name.
    #[must_use]
    pub fn charset(&self) -> &str {
        match self {
            Self::Unbound(charset) | Self::Bound { charset, .. } => charset,
        }
    }

    /// Returns true if a reader is bound.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        matches!(self, Self::Bound { .. })
    }
}

/// Character boundaries within the arena.
#[derive(Debug, Clone)]
enum Layout {
    /// Every character is `width` bytes wide.
    Fixed(usize),
    /// Start offset of every character.
    Indexed(Vec<usize>),
}

/// Ordered, seekable sequence of characters in a given charset.
#[derive(Debug, Clone)]
pub struct CharacterStream {
    factory: CharsetReaderFactory,
    binding: CharsetBinding,
    data: BytesMut,
    layout: Layout,
    /// Bytes of a character that is not complete yet.
    pending: Vec<u8>,
    /// Bytes still required before `pending` can be classified again.
    need: usize,
    /// Read cursor, in characters.
    cursor: usize,
    /// Bytes committed since the last flush, including discarded ones.
    committed_bytes: u64,
    /// Characters committed since the last flush, including discarded ones.
    committed_chars: u64,
}

impl CharacterStream {
    /// Creates a stream for `charset`, resolving its reader through the
    /// default factory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCharset`] if the charset is unknown.
    pub fn new(charset: &str) -> Result<Self> {
        Self::with_factory(CharsetReaderFactory::new(), charset)
    }

    /// Creates a stream resolving charsets through `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCharset`] if the charset is unknown.
    pub fn with_factory(factory: CharsetReaderFactory, charset: &str) -> Result<Self> {
        let reader = factory.resolve(charset)?;
        Ok(Self::bound(factory, charset, reader))
    }

    /// Creates a stream bound to an already resolved reader.
    #[must_use]
    pub fn with_reader(charset: &str, reader: Arc<dyn CharsetReader>) -> Self {
        Self::bound(CharsetReaderFactory::new(), charset, reader)
    }

    fn bound(factory: CharsetReaderFactory, charset: &str, reader: Arc<dyn CharsetReader>) -> Self {
        let layout = layout_for(reader.as_ref());
        Self {
            factory,
            binding: CharsetBinding::Bound {
                charset: charset.to_string(),
                reader,
            },
            data: BytesMut::new(),
            layout,
            pending: Vec::new(),
            need: 0,
            cursor: 0,
            committed_bytes: 0,
            committed_chars: 0,
        }
    }

    /// Returns the charset name.
    #[must_use]
    pub fn charset(&self) -> &str {
        self.binding.charset()
    }

    /// Returns the current binding.
    #[must_use]
    pub const fn binding(&self) -> &CharsetBinding {
        &self.binding
    }

    /// Rebinds the stream to another charset.
    ///
    /// Characters already in the stream are kept as they are; callers wanting
    /// consistent grouping for the new charset flush first. A partial
    /// character is re-classified by the new reader on the next write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCharset`] if the charset is unknown. The
    /// stream is then unbound and rejects writes until rebound.
    pub fn set_charset(&mut self, charset: &str) -> Result<()> {
        match self.factory.resolve(charset) {
            Ok(reader) => {
                self.adapt_layout(reader.as_ref());
                self.binding = CharsetBinding::Bound {
                    charset: charset.to_string(),
                    reader,
                };
                self.need = 0;
                Ok(())
            }
            Err(e) => {
                self.binding = CharsetBinding::Unbound(charset.to_string());
                Err(e)
            }
        }
    }

    /// Replaces the content with `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCharset`] if `bytes` is not valid in the
    /// charset, including a truncated final character.
    pub fn import_string(&mut self, bytes: impl AsRef<[u8]>) -> Result<()> {
        self.flush_contents();
        self.write(bytes.as_ref())?;
        self.finish()
    }

    /// Replaces the content with everything read from `src`.
    ///
    /// The source is drained in chunks of [`READ_CHUNK_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if reading fails and [`Error::MalformedCharset`]
    /// if the data is not valid in the charset.
    pub fn import_byte_stream<R: Read + ?Sized>(&mut self, src: &mut R) -> Result<()> {
        self.flush_contents();
        let mut buf = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = match src.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.write(&buf[..n])?;
        }
        self.finish()
    }

    /// Appends bytes to the stream.
    ///
    /// Complete characters are committed; a trailing partial character is
    /// held until later writes complete it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCharset`] if the stream is unbound and
    /// [`Error::MalformedCharset`] on an invalid sequence. Characters
    /// committed before the invalid sequence stay in the stream; the invalid
    /// bytes are dropped.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let reader = match &self.binding {
            CharsetBinding::Bound { reader, .. } => Arc::clone(reader),
            CharsetBinding::Unbound(charset) => {
                return Err(Error::UnsupportedCharset(charset.clone()));
            }
        };

        let mut input = bytes;
        loop {
            if self.pending.is_empty() {
                if let Some(width) = reader.fixed_width() {
                    let whole = input.len() / width * width;
                    let valid = input[..whole]
                        .chunks_exact(width)
                        .take_while(|unit| reader.classify(unit) == Classification::Valid(width))
                        .count()
                        * width;
                    if valid > 0 {
                        self.commit_run(&input[..valid], width);
                        input = &input[valid..];
                    }
                }
                if input.is_empty() {
                    break;
                }
                self.need = reader.initial_byte_count().max(1);
            }

            let take = self.need.min(input.len());
            self.pending.extend_from_slice(&input[..take]);
            input = &input[take..];
            self.need -= take;
            if self.need > 0 {
                if take > 0 && reader.classify(&self.pending) == Classification::Invalid {
                    self.pending.clear();
                    self.need = 0;
                    return Err(self.malformed());
                }
                break;
            }

            match reader.classify(&self.pending) {
                Classification::Valid(len) => {
                    let len = len.clamp(1, self.pending.len());
                    self.commit_pending(len);
                }
                Classification::NeedMore(more) => self.need = more.max(1),
                Classification::Invalid => {
                    self.pending.clear();
                    self.need = 0;
                    return Err(self.malformed());
                }
            }
        }

        Ok(())
    }

    /// Checks that no partial character is left over.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCharset`] if the last write ended in the
    /// middle of a character. The partial bytes are dropped.
    pub fn finish(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.pending.clear();
        self.need = 0;
        Err(self.malformed())
    }

    /// Reads up to `count` characters from the cursor.
    ///
    /// Returns `None` once the stream is exhausted; a zero `count` before
    /// that yields an empty group.
    pub fn read(&mut self, count: usize) -> Option<Vec<&[u8]>> {
        if self.cursor >= self.len() {
            return None;
        }
        let end = self.cursor.saturating_add(count).min(self.len());
        let start = self.cursor;
        self.cursor = end;
        let this = &*self;
        Some(
            (start..end)
                .map(|i| &this.data[this.char_range(i)])
                .collect(),
        )
    }

    /// Reads up to `count` characters from the cursor as one byte buffer.
    ///
    /// Returns `None` once the stream is exhausted.
    pub fn read_bytes(&mut self, count: usize) -> Option<Bytes> {
        if self.cursor >= self.len() {
            return None;
        }
        let end = self.cursor.saturating_add(count).min(self.len());
        let bytes = Bytes::copy_from_slice(&self.data[self.span(self.cursor, end)]);
        self.cursor = end;
        Some(bytes)
    }

    /// Reads the character at the cursor.
    pub fn next_char(&mut self) -> Option<&[u8]> {
        if self.cursor >= self.len() {
            return None;
        }
        let range = self.char_range(self.cursor);
        self.cursor += 1;
        Some(&self.data[range])
    }

    /// Returns the character at the cursor without moving it.
    #[must_use]
    pub fn peek(&self) -> Option<&[u8]> {
        self.char_at(self.cursor)
    }

    /// Returns the character at `index`.
    #[must_use]
    pub fn char_at(&self, index: usize) -> Option<&[u8]> {
        (index < self.len()).then(|| &self.data[self.char_range(index)])
    }

    /// Moves the cursor, clamping to the stream length.
    pub fn set_pointer(&mut self, offset: usize) {
        self.cursor = offset.min(self.len());
    }

    /// Returns the cursor position in characters.
    #[must_use]
    pub const fn pointer(&self) -> usize {
        self.cursor
    }

    /// Returns the number of characters in the stream.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.layout {
            Layout::Fixed(width) => self.data.len() / width,
            Layout::Indexed(starts) => starts.len(),
        }
    }

    /// Returns true if the stream holds no characters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the number of bytes held for complete characters.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Removes all content and resets the cursor. The binding is kept.
    pub fn flush_contents(&mut self) {
        self.data.clear();
        self.pending.clear();
        self.need = 0;
        self.cursor = 0;
        self.committed_bytes = 0;
        self.committed_chars = 0;
        if let CharsetBinding::Bound { reader, .. } = &self.binding {
            self.layout = layout_for(reader.as_ref());
        } else if let Layout::Indexed(starts) = &mut self.layout {
            starts.clear();
        }
    }

    /// Drops the characters before the cursor, which becomes zero.
    ///
    /// Streaming consumers call this after each chunk so the stream only
    /// holds unread characters. Error offsets keep counting from the last
    /// flush.
    pub fn discard_read(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let cut = self.span(0, self.cursor).end;
        self.data.advance(cut);
        if let Layout::Indexed(starts) = &mut self.layout {
            starts.drain(..self.cursor);
            for start in starts.iter_mut() {
                *start -= cut;
            }
        }
        self.cursor = 0;
    }

    fn char_range(&self, index: usize) -> Range<usize> {
        self.span(index, index + 1)
    }

    /// Byte range covering characters `start..end`.
    fn span(&self, start: usize, end: usize) -> Range<usize> {
        match &self.layout {
            Layout::Fixed(width) => start * width..end * width,
            Layout::Indexed(starts) => {
                let from = starts.get(start).copied().unwrap_or(self.data.len());
                let to = starts.get(end).copied().unwrap_or(self.data.len());
                from..to
            }
        }
    }

    fn commit_pending(&mut self, len: usize) {
        if let Layout::Fixed(width) = self.layout {
            if width != len {
                self.index_layout();
            }
        }
        if let Layout::Indexed(starts) = &mut self.layout {
            starts.push(self.data.len());
        }
        self.data.extend_from_slice(&self.pending[..len]);
        self.pending.drain(..len);
        self.committed_bytes += len as u64;
        self.committed_chars += 1;
    }

    /// Commits a run of characters that are all `width` bytes wide.
    fn commit_run(&mut self, bytes: &[u8], width: usize) {
        if let Layout::Fixed(current) = self.layout {
            if current != width {
                self.index_layout();
            }
        }
        if let Layout::Indexed(starts) = &mut self.layout {
            let base = self.data.len();
            starts.extend((0..bytes.len()).step_by(width).map(|offset| base + offset));
        }
        self.data.extend_from_slice(bytes);
        self.committed_bytes += bytes.len() as u64;
        self.committed_chars += (bytes.len() / width) as u64;
    }

    /// Switches to an explicit boundary index, keeping existing characters.
    fn index_layout(&mut self) {
        if let Layout::Fixed(width) = self.layout {
            let starts = (0..self.data.len()).step_by(width).collect();
            self.layout = Layout::Indexed(starts);
        }
    }

    fn adapt_layout(&mut self, reader: &dyn CharsetReader) {
        if self.data.is_empty() {
            self.layout = layout_for(reader);
            return;
        }
        match (&self.layout, reader.fixed_width()) {
            (Layout::Fixed(current), Some(width)) if *current == width => {}
            _ => self.index_layout(),
        }
    }

    fn malformed(&self) -> Error {
        Error::MalformedCharset {
            charset: self.charset().to_string(),
            byte_offset: self.committed_bytes,
            decoded_chars: self.committed_chars,
        }
    }
}

fn layout_for(reader: &dyn CharsetReader) -> Layout {
    match reader.fixed_width() {
        Some(width) => Layout::Fixed(width.max(1)),
        None => Layout::Indexed(Vec::new()),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn collect(stream: &mut CharacterStream) -> Vec<Vec<u8>> {
        let mut chars = Vec::new();
        while let Some(ch) = stream.next_char() {
            chars.push(ch.to_vec());
        }
        chars
    }

    #[test]
    fn test_utf8_grouping() {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream.import_string("a€b".as_bytes()).unwrap();
        assert_eq!(stream.len(), 3);
        assert_eq!(
            collect(&mut stream),
            vec![b"a".to_vec(), vec![0xE2, 0x82, 0xAC], b"b".to_vec()]
        );
    }

    #[test]
    fn test_partial_character_across_writes() {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream.write(&[b'x', 0xE2]).unwrap();
        assert_eq!(stream.len(), 1);
        stream.write(&[0x82]).unwrap();
        assert_eq!(stream.len(), 1);
        stream.write(&[0xAC, b'y']).unwrap();
        assert_eq!(stream.len(), 3);
        stream.finish().unwrap();
        assert_eq!(stream.char_at(1), Some(&[0xE2, 0x82, 0xAC][..]));
    }

    #[test]
    fn test_malformed_reports_position() {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        let err = stream.import_string([b'a', b'b', 0xE2, 0x41]).unwrap_err();
        match err {
            Error::MalformedCharset {
                charset,
                byte_offset,
                decoded_chars,
            } => {
                assert_eq!(charset, "utf-8");
                assert_eq!(byte_offset, 2);
                assert_eq!(decoded_chars, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_offset_survives_discard() {
        let mut stream = CharacterStream::new("us-ascii").unwrap();
        stream.write(b"hello").unwrap();
        stream.set_pointer(5);
        stream.discard_read();
        let err = stream.write(&[b'!', 0x80]).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedCharset {
                byte_offset: 6,
                decoded_chars: 6,
                ..
            }
        ));
    }

    #[test]
    fn test_truncated_final_character() {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        let err = stream.import_string([b'a', 0xE2, 0x82]).unwrap_err();
        assert!(matches!(err, Error::MalformedCharset { byte_offset: 1, .. }));
    }

    #[test]
    fn test_read_and_read_bytes() {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream.import_string("héllo".as_bytes()).unwrap();

        let chars = stream.read(2).unwrap();
        assert_eq!(chars, vec![&b"h"[..], &[0xC3, 0xA9][..]]);
        assert_eq!(stream.pointer(), 2);

        assert_eq!(stream.read_bytes(10).unwrap(), Bytes::from_static(b"llo"));
        assert!(stream.read_bytes(1).is_none());
        assert!(stream.read(1).is_none());
    }

    #[test]
    fn test_zero_count_read_is_not_exhaustion() {
        let mut stream = CharacterStream::new("iso-8859-1").unwrap();
        stream.import_string(b"abc").unwrap();

        assert_eq!(stream.read(0).unwrap(), Vec::<&[u8]>::new());
        assert_eq!(stream.read_bytes(0).unwrap(), Bytes::new());
        assert_eq!(stream.pointer(), 0);

        stream.set_pointer(3);
        assert!(stream.read(0).is_none());
        assert!(stream.read_bytes(0).is_none());
    }

    #[test]
    fn test_set_pointer_clamps() {
        let mut stream = CharacterStream::new("iso-8859-1").unwrap();
        stream.import_string(b"abc").unwrap();
        stream.set_pointer(100);
        assert_eq!(stream.pointer(), 3);
        stream.set_pointer(1);
        assert_eq!(stream.read_bytes(1).unwrap(), Bytes::from_static(b"b"));
    }

    #[test]
    fn test_fixed_width_two_bytes() {
        let mut stream = CharacterStream::new("utf-16").unwrap();
        stream.write(&[0x00, 0x41, 0x00]).unwrap();
        assert_eq!(stream.len(), 1);
        stream.write(&[0x42]).unwrap();
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.char_at(1), Some(&[0x00, 0x42][..]));
    }

    #[test]
    fn test_flush_keeps_binding() {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream.import_string(b"abc").unwrap();
        stream.set_pointer(2);
        stream.flush_contents();
        assert!(stream.is_empty());
        assert_eq!(stream.pointer(), 0);
        assert_eq!(stream.charset(), "utf-8");
        stream.write("€".as_bytes()).unwrap();
        assert_eq!(stream.len(), 1);
    }

    #[test]
    fn test_set_charset_keeps_characters() {
        let mut stream = CharacterStream::new("iso-8859-1").unwrap();
        stream.write(b"ab").unwrap();
        stream.set_charset("utf-8").unwrap();
        stream.write("€".as_bytes()).unwrap();
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.char_at(0), Some(&b"a"[..]));
        assert_eq!(stream.char_at(2), Some("€".as_bytes()));
    }

    #[test]
    fn test_unknown_charset_unbinds() {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream.write(b"a").unwrap();
        assert!(stream.set_charset("x-unknown").is_err());
        assert!(!stream.binding().is_bound());
        assert_eq!(stream.len(), 1);
        assert!(matches!(
            stream.write(b"b"),
            Err(Error::UnsupportedCharset(name)) if name == "x-unknown"
        ));
    }

    #[test]
    fn test_discard_read_variable_width() {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream.import_string("ab€cd".as_bytes()).unwrap();
        stream.set_pointer(3);
        stream.discard_read();
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.pointer(), 0);
        assert_eq!(stream.read_bytes(5).unwrap(), Bytes::from_static(b"cd"));
    }

    #[test]
    fn test_import_byte_stream() {
        let data = "x€".repeat(5000);
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream
            .import_byte_stream(&mut io::Cursor::new(data.as_bytes()))
            .unwrap();
        assert_eq!(stream.len(), 10_000);
        assert_eq!(stream.byte_len(), data.len());
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream.import_string(b"ab").unwrap();
        assert_eq!(stream.peek(), Some(&b"a"[..]));
        assert_eq!(stream.pointer(), 0);
        stream.next_char();
        assert_eq!(stream.peek(), Some(&b"b"[..]));
    }
}
