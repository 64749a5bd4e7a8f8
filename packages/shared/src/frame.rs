//! Length-prefixed frame encoding/decoding
//!
//! Wire format: [10-byte ASCII decimal length, left-justified, space-padded][payload]
//!
//! A zero-length payload behind a present header is a valid (empty) message.
//! Zero bytes where a header should start means the peer closed the stream.

use std::{
    borrow::Cow,
    io::{self, ErrorKind, Read},
};

use thiserror::Error;

/// Width of the textual length header in bytes
pub const HEADER_LENGTH: usize = 10;

/// Largest payload length representable in a header of `HEADER_LENGTH` digits
pub const MAX_PAYLOAD_LENGTH: u64 = 9_999_999_999;

/// Size of the scratch buffer used when draining a non-blocking reader
const READ_CHUNK_SIZE: usize = 4096;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Header must be {HEADER_LENGTH} bytes, got {0}")]
    HeaderLength(usize),

    #[error("Header {0:?} is not a non-negative integer")]
    InvalidHeader(String),

    #[error("Payload of {0} bytes does not fit in a {HEADER_LENGTH}-digit header")]
    PayloadTooLarge(usize),

    #[error("Stream ended in the middle of a frame")]
    Truncated,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One unit of the wire protocol.
///
/// The raw header bytes are kept next to the payload, so a relay can forward
/// exactly the header it received instead of encoding it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: [u8; HEADER_LENGTH],
    payload: Vec<u8>,
}

impl Frame {
    /// Build a frame around `payload`, encoding its length header.
    pub fn new(payload: impl Into<Vec<u8>>) -> Result<Self, FrameError> {
        let payload = payload.into();
        let header = encode_header(payload.len())?;
        Ok(Self { header, payload })
    }

    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Number of bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        HEADER_LENGTH + self.payload.len()
    }

    /// Append `header || payload` to `buf`.
    pub fn write_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.header);
        buf.extend_from_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.write_into(&mut buf);
        buf
    }
}

/// Encode `payload` as `header || payload`.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    Ok(Frame::new(payload)?.to_bytes())
}

pub(crate) fn encode_header(len: usize) -> Result<[u8; HEADER_LENGTH], FrameError> {
    if len as u64 > MAX_PAYLOAD_LENGTH {
        return Err(FrameError::PayloadTooLarge(len));
    }

    let text = format!("{:<width$}", len, width = HEADER_LENGTH);
    let mut header = [0u8; HEADER_LENGTH];
    header.copy_from_slice(text.as_bytes());
    Ok(header)
}

/// Parse a header into the payload length it announces.
pub fn decode_header(raw: &[u8]) -> Result<usize, FrameError> {
    if raw.len() != HEADER_LENGTH {
        return Err(FrameError::HeaderLength(raw.len()));
    }

    let text = String::from_utf8_lossy(raw);
    text.trim()
        .parse::<u64>()
        .ok()
        .filter(|len| *len <= MAX_PAYLOAD_LENGTH)
        .and_then(|len| usize::try_from(len).ok())
        .ok_or_else(|| FrameError::InvalidHeader(text.into_owned()))
}

/// Read one frame from a blocking reader.
///
/// Returns `Ok(None)` when the reader is already at end of stream. Short reads
/// are retried until the announced payload length is satisfied.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Frame>, FrameError> {
    let mut header = [0u8; HEADER_LENGTH];
    let filled = read_up_to(reader, &mut header)?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < HEADER_LENGTH {
        return Err(FrameError::Truncated);
    }

    let len = decode_header(&header)?;

    // Grow with the data actually received rather than trusting the header
    // with one large allocation.
    let mut payload = Vec::new();
    let received = reader.by_ref().take(len as u64).read_to_end(&mut payload)?;
    if received < len {
        return Err(FrameError::Truncated);
    }

    Ok(Some(Frame { header, payload }))
}

/// Fill `buf` until it is full or the reader reaches end of stream.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Why [`FrameDecoder::fill_from`] stopped reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// The reader has no more data right now
    WouldBlock,
    /// The peer closed the stream
    EndOfStream,
}

/// Incremental decoder for non-blocking streams.
///
/// Bytes are buffered across reads, so a frame delivered in arbitrary chunks
/// is only handed out once it is complete.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes received but not yet handed out as frames
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Read everything `reader` has available.
    ///
    /// Only meant for non-blocking readers: a blocking reader would park here
    /// until its peer closes.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> io::Result<FillOutcome> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => return Ok(FillOutcome::EndOfStream),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(FillOutcome::WouldBlock),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Pop the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        match self.frame_end(0)? {
            Some(end) => Ok(Some(self.take_frame(end))),
            None => Ok(None),
        }
    }

    /// Pop the next two frames together, or nothing if either is incomplete.
    pub fn next_pair(&mut self) -> Result<Option<(Frame, Frame)>, FrameError> {
        let Some(first_end) = self.frame_end(0)? else {
            return Ok(None);
        };
        let Some(second_end) = self.frame_end(first_end)? else {
            return Ok(None);
        };

        let first = self.take_frame(first_end);
        let second = self.take_frame(second_end - first_end);
        Ok(Some((first, second)))
    }

    /// Offset one past the frame starting at `start`, once fully buffered.
    fn frame_end(&self, start: usize) -> Result<Option<usize>, FrameError> {
        let rest = &self.buffer[start..];
        if rest.len() < HEADER_LENGTH {
            return Ok(None);
        }

        let len = decode_header(&rest[..HEADER_LENGTH])?;
        let end = start.saturating_add(HEADER_LENGTH).saturating_add(len);
        Ok((self.buffer.len() >= end).then_some(end))
    }

    fn take_frame(&mut self, end: usize) -> Frame {
        let mut bytes: Vec<u8> = self.buffer.drain(..end).collect();
        let payload = bytes.split_off(HEADER_LENGTH);
        let mut header = [0u8; HEADER_LENGTH];
        header.copy_from_slice(&bytes);
        Frame { header, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::VecDeque, io::Cursor};

    /// Reader that hands out scripted chunks, then a fixed terminal result.
    struct ChunkedReader {
        chunks: VecDeque<Vec<u8>>,
        exhausted: ErrorKind,
    }

    impl ChunkedReader {
        fn new(chunks: &[&[u8]], exhausted: ErrorKind) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                exhausted,
            }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(mut chunk) = self.chunks.pop_front() else {
                return match self.exhausted {
                    ErrorKind::UnexpectedEof => Ok(0),
                    kind => Err(io::Error::from(kind)),
                };
            };

            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.chunks.push_front(chunk.split_off(n));
            }
            Ok(n)
        }
    }

    #[test]
    fn test_encode_pads_header_to_the_left() {
        // テスト項目: ヘッダーが左詰め・スペース埋めの 10 バイトになる
        // given (前提条件):
        let payload = b"hi";

        // when (操作):
        let encoded = encode(payload).unwrap();

        // then (期待する結果):
        assert_eq!(encoded, b"2         hi".to_vec());
    }

    #[test]
    fn test_header_round_trip() {
        // テスト項目: エンコードしたヘッダーをデコードすると元の長さに戻る
        // given (前提条件):
        let payloads: [&[u8]; 4] = [b"", b"alice", "こんにちは".as_bytes(), &[0u8; 1500]];

        for payload in payloads {
            // when (操作):
            let encoded = encode(payload).unwrap();

            // then (期待する結果):
            assert_eq!(decode_header(&encoded[..HEADER_LENGTH]).unwrap(), payload.len());
            assert_eq!(&encoded[HEADER_LENGTH..], payload);
        }
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_encode_header_rejects_oversized_length() {
        // テスト項目: 10 桁に収まらない長さはエラーになる（切り詰めない）
        // given (前提条件):
        let len = (MAX_PAYLOAD_LENGTH + 1) as usize;

        // when (操作):
        let result = encode_header(len);

        // then (期待する結果):
        assert!(matches!(result, Err(FrameError::PayloadTooLarge(l)) if l == len));
        assert!(encode_header(MAX_PAYLOAD_LENGTH as usize).is_ok());
    }

    #[test]
    fn test_decode_header_rejects_wrong_width() {
        // テスト項目: 10 バイトでないヘッダーは拒否される
        assert!(matches!(
            decode_header(b"5    "),
            Err(FrameError::HeaderLength(5))
        ));
        assert!(matches!(
            decode_header(b"5          "),
            Err(FrameError::HeaderLength(11))
        ));
    }

    #[test]
    fn test_decode_header_rejects_non_numeric() {
        // テスト項目: 数値として解釈できないヘッダーは拒否される
        for raw in [b"abc       ", b"-1        ", b"          ", b"1 2       "] {
            assert!(
                matches!(decode_header(raw), Err(FrameError::InvalidHeader(_))),
                "header {:?} should be rejected",
                String::from_utf8_lossy(raw)
            );
        }
    }

    #[test]
    fn test_read_frame_end_of_stream() {
        // テスト項目: ヘッダーの位置で 0 バイトなら EndOfStream (None)
        // given (前提条件):
        let mut reader = Cursor::new(Vec::<u8>::new());

        // when (操作):
        let result = read_frame(&mut reader).unwrap();

        // then (期待する結果):
        assert!(result.is_none());
    }

    #[test]
    fn test_read_frame_empty_payload() {
        // テスト項目: ヘッダーがあり長さ 0 のフレームは空メッセージとして有効
        // given (前提条件):
        let mut reader = Cursor::new(b"0         ".to_vec());

        // when (操作):
        let frame = read_frame(&mut reader).unwrap().unwrap();

        // then (期待する結果):
        assert!(frame.payload().is_empty());
        assert_eq!(frame.header(), b"0         ");
    }

    #[test]
    fn test_read_frame_reassembles_chunks() {
        // テスト項目: 任意に分割されて届いたフレームを最後まで読み切る
        // given (前提条件):
        let mut reader = ChunkedReader::new(
            &[b"11 ", b"       hel", b"lo", b" world"],
            ErrorKind::UnexpectedEof,
        );

        // when (操作):
        let frame = read_frame(&mut reader).unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(frame.payload(), b"hello world");
        assert_eq!(frame.header(), b"11        ");
    }

    #[test]
    fn test_read_frame_truncated_payload() {
        // テスト項目: ペイロード途中でストリームが終わると Truncated
        // given (前提条件):
        let mut reader = Cursor::new(b"5         abc".to_vec());

        // when (操作):
        let result = read_frame(&mut reader);

        // then (期待する結果):
        assert!(matches!(result, Err(FrameError::Truncated)));
    }

    #[test]
    fn test_read_frame_truncated_header() {
        // テスト項目: ヘッダー途中でストリームが終わると Truncated
        let mut reader = Cursor::new(b"5   ".to_vec());
        assert!(matches!(read_frame(&mut reader), Err(FrameError::Truncated)));
    }

    #[test]
    fn test_decoder_waits_for_complete_frame() {
        // テスト項目: デコーダは完全なフレームが揃うまで何も返さない
        // given (前提条件):
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"5         ab");

        // when (操作):
        let partial = decoder.next_frame().unwrap();
        decoder.extend(b"cde3         xyz");
        let first = decoder.next_frame().unwrap();
        let second = decoder.next_frame().unwrap();
        let third = decoder.next_frame().unwrap();

        // then (期待する結果):
        assert!(partial.is_none());
        assert_eq!(first.unwrap().payload(), b"abcde");
        assert_eq!(second.unwrap().payload(), b"xyz");
        assert!(third.is_none());
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_decoder_pair_is_atomic() {
        // テスト項目: 2 フレーム目が不完全ならペアは取り出されない
        // given (前提条件):
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"5         alice2         h");

        // when (操作):
        let incomplete = decoder.next_pair().unwrap();
        let buffered_before = decoder.buffered();
        decoder.extend(b"i");
        let complete = decoder.next_pair().unwrap();

        // then (期待する結果):
        assert!(incomplete.is_none());
        assert_eq!(buffered_before, 26);
        let (username, message) = complete.unwrap();
        assert_eq!(username.payload(), b"alice");
        assert_eq!(message.payload(), b"hi");
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_decoder_reports_malformed_header() {
        // テスト項目: 不正なヘッダーはエラーとして報告される
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"not-a-num!payload");
        assert!(matches!(
            decoder.next_frame(),
            Err(FrameError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_fill_from_stops_on_would_block() {
        // テスト項目: WouldBlock で読み込みを止め、それまでのデータを保持する
        // given (前提条件):
        let mut reader = ChunkedReader::new(&[b"2         ", b"ok"], ErrorKind::WouldBlock);
        let mut decoder = FrameDecoder::new();

        // when (操作):
        let outcome = decoder.fill_from(&mut reader).unwrap();

        // then (期待する結果):
        assert_eq!(outcome, FillOutcome::WouldBlock);
        assert_eq!(decoder.next_frame().unwrap().unwrap().payload(), b"ok");
    }

    #[test]
    fn test_fill_from_reports_end_of_stream() {
        // テスト項目: 0 バイト読み込みで EndOfStream を返す
        let mut reader = ChunkedReader::new(&[b"0         "], ErrorKind::UnexpectedEof);
        let mut decoder = FrameDecoder::new();

        let outcome = decoder.fill_from(&mut reader).unwrap();

        assert_eq!(outcome, FillOutcome::EndOfStream);
        assert_eq!(decoder.buffered(), HEADER_LENGTH);
    }

    #[test]
    fn test_fill_from_propagates_other_errors() {
        // テスト項目: WouldBlock 以外の I/O エラーはそのまま返される
        let mut reader = ChunkedReader::new(&[], ErrorKind::ConnectionReset);
        let mut decoder = FrameDecoder::new();

        let result = decoder.fill_from(&mut reader);

        assert_eq!(result.unwrap_err().kind(), ErrorKind::ConnectionReset);
    }
}
