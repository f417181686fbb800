//! Property tests for character streams.
//!
//! Whatever a stream accepts it must hand back byte for byte, however the
//! input is split across writes.

#![allow(clippy::unwrap_used)]

use mailpress_charset::CharacterStream;
use proptest::prelude::*;

fn reemit(stream: &mut CharacterStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.read_bytes(7) {
        out.extend_from_slice(&chunk);
    }
    out
}

proptest! {
    #[test]
    fn utf8_bytes_reemitted_verbatim(text in "\\PC{0,200}") {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream.import_string(text.as_bytes()).unwrap();
        prop_assert_eq!(stream.len(), text.chars().count());
        prop_assert_eq!(reemit(&mut stream), text.as_bytes());
    }

    #[test]
    fn utf8_split_writes_match_single_write(text in "\\PC{0,120}", split in 1usize..9) {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        for piece in text.as_bytes().chunks(split) {
            stream.write(piece).unwrap();
        }
        stream.finish().unwrap();
        prop_assert_eq!(stream.len(), text.chars().count());
        prop_assert_eq!(reemit(&mut stream), text.as_bytes());
    }

    #[test]
    fn single_byte_charset_accepts_everything(data in proptest::collection::vec(any::<u8>(), 0..300)) {
        let mut stream = CharacterStream::new("iso-8859-1").unwrap();
        stream.import_string(&data).unwrap();
        prop_assert_eq!(stream.len(), data.len());
        prop_assert_eq!(reemit(&mut stream), data);
    }

    #[test]
    fn seek_then_read_matches_char_at(text in "\\PC{1,80}", offset in 0usize..100) {
        let mut stream = CharacterStream::new("utf-8").unwrap();
        stream.import_string(text.as_bytes()).unwrap();
        stream.set_pointer(offset);
        let expected = stream.char_at(offset).map(<[u8]>::to_vec);
        let got = stream.read_bytes(1).map(|b| b.to_vec());
        prop_assert_eq!(got, expected);
    }
}

#[test]
fn invalid_utf8_is_rejected_not_replaced() {
    let mut stream = CharacterStream::new("utf-8").unwrap();
    assert!(stream.import_string([0x66, 0x6F, 0xFF, 0x6F]).is_err());
    assert_eq!(stream.len(), 2);
}
