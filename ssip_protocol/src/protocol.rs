use log::trace;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed reply line: {0:?}")]
    MalformedFrame(String),
}

/// Status codes in this band are asynchronous event notifications rather
/// than replies to a command.
pub const EVENT_BAND: std::ops::RangeInclusive<u16> = 700..=799;

/// Status codes in this band mean the command was accepted.
pub const SUCCESS_BAND: std::ops::RangeInclusive<u16> = 200..=299;

/// One complete server reply: one or more coded lines, terminated by the
/// first line whose delimiter is a space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    /// 3-digit status code of the *final* line of the reply. Continuation
    /// lines of one reply share the same code by convention, so earlier
    /// codes are overwritten rather than kept.
    pub code: u16,

    /// Text of every line of the reply, in arrival order. Mostly human
    /// readable descriptions, but for some commands the lines carry data
    /// (listings, the message id assigned to an utterance).
    pub lines: Vec<String>,
}

impl ServerMessage {
    /// True for asynchronous event notifications (codes 700-799).
    pub fn is_event(&self) -> bool {
        EVENT_BAND.contains(&self.code)
    }

    /// True when the code is in the 2xx success band.
    pub fn is_success(&self) -> bool {
        SUCCESS_BAND.contains(&self.code)
    }
}

/// Decoding half of the connection.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        FrameReader { reader }
    }

    /// Read the next complete server message.
    ///
    /// Reads coded lines until one carries the space delimiter. A stream
    /// error or end-of-stream is surfaced as-is; no partial message is
    /// returned.
    pub fn read_message(&mut self) -> Result<ServerMessage, ProtocolError> {
        let mut message = ServerMessage {
            code: 0,
            lines: Vec::new(),
        };

        loop {
            let mut raw = String::new();
            if self.reader.read_line(&mut raw)? == 0 {
                return Err(ProtocolError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }

            let line = raw
                .strip_suffix("\r\n")
                .or_else(|| raw.strip_suffix('\n'))
                .unwrap_or(&raw);
            trace!("← {}", line);

            let (code, last, text) = parse_line(line)?;
            message.code = code;
            message.lines.push(text.to_string());
            if last {
                break;
            }
        }

        Ok(message)
    }
}

/// Split one reply line into (code, is-final, text).
///
/// Grammar: 3 decimal digits, then `-` (continuation) or space (final
/// line), then free text.
fn parse_line(line: &str) -> Result<(u16, bool, &str), ProtocolError> {
    let bytes = line.as_bytes();
    if bytes.len() < 4 {
        return Err(ProtocolError::MalformedFrame(line.to_string()));
    }
    if !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::MalformedFrame(line[..3].to_string()));
    }
    // The first four bytes are ASCII, so slicing at 3 and 4 is safe.
    let code = line[..3]
        .parse()
        .map_err(|_| ProtocolError::MalformedFrame(line[..3].to_string()))?;
    match bytes[3] {
        b'-' => Ok((code, false, &line[4..])),
        b' ' => Ok((code, true, &line[4..])),
        _ => Err(ProtocolError::MalformedFrame(line.to_string())),
    }
}

/// Encoding half of the connection.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        FrameWriter { writer }
    }

    /// Send one command line, CRLF terminated. No escaping is applied;
    /// use [`write_speak_line`](Self::write_speak_line) for speak payload
    /// lines.
    pub fn write_line(&mut self, line: &str) -> Result<(), ProtocolError> {
        trace!("→ {}", line);
        let mut framed = Vec::with_capacity(line.len() + 2);
        framed.extend_from_slice(line.as_bytes());
        framed.extend_from_slice(b"\r\n");
        self.writer.write_all(&framed)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Send one line of a speak payload body, with the dot-stuffing the
    /// protocol requires: a leading `.` gets one more `.` prepended so the
    /// lone-dot terminator line stays unambiguous.
    ///
    /// Embedded `\r`/`\n` are not handled here; the composing layer must
    /// split the text into logical lines first.
    pub fn write_speak_line(&mut self, line: &str) -> Result<(), ProtocolError> {
        if line.starts_with('.') {
            let mut stuffed = String::with_capacity(line.len() + 1);
            stuffed.push('.');
            stuffed.push_str(line);
            self.write_line(&stuffed)
        } else {
            self.write_line(line)
        }
    }

    /// Access the underlying stream (for shutdown, peer info).
    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode(input: &str) -> Result<ServerMessage, ProtocolError> {
        FrameReader::new(Cursor::new(input.to_string())).read_message()
    }

    #[test]
    fn test_single_line_reply() {
        let msg = decode("200 OK\r\n").unwrap();
        assert_eq!(msg.code, 200);
        assert_eq!(msg.lines, vec!["OK"]);
        assert!(msg.is_success());
        assert!(!msg.is_event());
    }

    #[test]
    fn test_multi_line_reply_keeps_order_and_final_code() {
        let msg = decode("250-espeak\r\n250-festival\r\n251 OK\r\n").unwrap();
        // Every line's code is parsed; the final line's code wins.
        assert_eq!(msg.code, 251);
        assert_eq!(msg.lines, vec!["espeak", "festival", "OK"]);
    }

    #[test]
    fn test_event_band_classification() {
        let msg = decode("702-42\r\n702 OK\r\n").unwrap();
        assert!(msg.is_event());
        assert_eq!(msg.lines[0], "42");
    }

    #[test]
    fn test_reader_stops_at_first_final_line() {
        let input = "200 OK\r\n300 LATER\r\n";
        let mut reader = FrameReader::new(Cursor::new(input.to_string()));
        assert_eq!(reader.read_message().unwrap().code, 200);
        assert_eq!(reader.read_message().unwrap().code, 300);
    }

    #[test]
    fn test_malformed_code_names_fragment() {
        match decode("2x0 OK\r\n") {
            Err(ProtocolError::MalformedFrame(fragment)) => assert_eq!(fragment, "2x0"),
            other => panic!("expected MalformedFrame, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_delimiter_is_malformed() {
        assert!(matches!(
            decode("200+OK\r\n"),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_short_line_is_malformed() {
        assert!(matches!(
            decode("20\r\n"),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_eof_mid_reply_is_an_error() {
        match decode("250-partial\r\n") {
            Err(ProtocolError::Io(err)) => {
                assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof)
            }
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_payload_line() {
        let msg = decode("200 \r\n").unwrap();
        assert_eq!(msg.lines, vec![""]);
    }

    #[test]
    fn test_write_line_appends_crlf() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_line("set self rate 10").unwrap();
        assert_eq!(writer.get_ref().as_slice(), b"set self rate 10\r\n");
    }

    #[test]
    fn test_speak_line_stuffs_leading_dot() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_speak_line(".hidden").unwrap();
        writer.write_speak_line("..double").unwrap();
        writer.write_speak_line(".").unwrap();
        writer.write_speak_line("plain").unwrap();
        assert_eq!(
            writer.get_ref().as_slice(),
            b"..hidden\r\n...double\r\n..\r\nplain\r\n" as &[u8]
        );
    }

    #[test]
    fn test_stuffed_lines_never_collide_with_terminator() {
        // A payload line that *is* a single dot goes out as "..", so the
        // bare "." terminator written via write_line stays unambiguous.
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_speak_line(".").unwrap();
        writer.write_line(".").unwrap();
        assert_eq!(writer.get_ref().as_slice(), b"..\r\n.\r\n" as &[u8]);
    }
}
