//! Wire framing in both directions.
//!
//! Host to device is line based: `C,NAME:VALUE,NAME:VALUE\n` on every tick and
//! `I,NAME:VALUE\n` for one-off initialisation. Device to host is free text
//! terminated by a single NUL byte.

use std::fmt::Write;

use crate::error::{Error, Result};

pub const TERMINATOR: u8 = 0x00;
/// Longest inbound message accepted; anything longer is dropped whole.
pub const MAX_FRAME_LEN: usize = 1024;

pub const UPDATE_START: char = 'C';
pub const INIT_START: char = 'I';
pub const COMMAND_SEPARATOR: char = ',';
pub const DATA_SEPARATOR: char = ':';
pub const LINE_END: char = '\n';

/// Init key for the device-side update rate (updates per second).
pub const UPDATE_RATE: &str = "UPDATE_RATE";
/// Init key for the device-side missed-update threshold.
pub const MISSED_UPDATES_ALLOWED: &str = "MISSED_UPDATES_ALLOWED";

/// One tick's worth of commands. An empty table still yields `C\n`, which keeps
/// the device's own watchdog fed.
pub fn build_update_frame(commands: &[(String, i32)]) -> String {
    let mut s = String::with_capacity(2 + commands.len() * 12);
    s.push(UPDATE_START);
    for (name, value) in commands {
        let _ = write!(s, "{COMMAND_SEPARATOR}{name}{DATA_SEPARATOR}{value}");
    }
    s.push(LINE_END);
    s
}

pub fn build_init_frame(name: &str, value: i32) -> String {
    format!("{INIT_START}{COMMAND_SEPARATOR}{name}{DATA_SEPARATOR}{value}{LINE_END}")
}

/// Reassembles NUL-terminated strings from arbitrarily split reads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Inside an overlong message; drop bytes through its terminator.
    discarding: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and iterate over every message completed so far.
    ///
    /// Messages not pulled from the iterator stay buffered and come out of the
    /// next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Messages<'_> {
        self.buf.extend_from_slice(bytes);
        Messages { decoder: self }
    }

    /// Bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

pub struct Messages<'a> {
    decoder: &'a mut FrameDecoder,
}

fn overflow() -> Error {
    Error::FrameOverflow {
        limit: MAX_FRAME_LEN,
    }
}

impl Iterator for Messages<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let d = &mut *self.decoder;
        let terminator = d.buf.iter().position(|&b| b == TERMINATOR);

        if d.discarding {
            let Some(end) = terminator else {
                d.buf.clear();
                return None;
            };
            d.buf.drain(..=end);
            d.discarding = false;
            return self.next();
        }

        match terminator {
            Some(end) if end > MAX_FRAME_LEN => {
                d.buf.drain(..=end);
                Some(Err(overflow()))
            }
            Some(end) => {
                let msg = String::from_utf8_lossy(&d.buf[..end]).into_owned();
                d.buf.drain(..=end);
                Some(Ok(msg))
            }
            None if d.buf.len() > MAX_FRAME_LEN => {
                d.buf.clear();
                d.discarding = true;
                Some(Err(overflow()))
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collect(d: &mut FrameDecoder, bytes: &[u8]) -> Vec<String> {
        d.feed(bytes).map(|m| m.unwrap()).collect()
    }

    #[test]
    fn update_frame_layout() {
        let cmds = vec![("BLINK".to_string(), 250), ("SRV1".to_string(), -5)];
        assert_eq!(build_update_frame(&cmds), "C,BLINK:250,SRV1:-5\n");
        assert_eq!(build_update_frame(&[]), "C\n");
    }

    #[test]
    fn init_frame_layout() {
        assert_eq!(build_init_frame(UPDATE_RATE, 16), "I,UPDATE_RATE:16\n");
    }

    #[test]
    fn split_across_feeds() {
        let mut d = FrameDecoder::new();
        assert_eq!(collect(&mut d, b"hello\0wor"), vec!["hello"]);
        assert_eq!(d.pending(), 3);
        assert_eq!(collect(&mut d, b"ld\0"), vec!["world"]);
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn several_in_one_feed() {
        let mut d = FrameDecoder::new();
        assert_eq!(collect(&mut d, b"a\0\0bc\0tail"), vec!["a", "", "bc"]);
        assert_eq!(d.pending(), 4);
    }

    #[test]
    fn byte_at_a_time() {
        let mut d = FrameDecoder::new();
        let mut out = Vec::new();
        for b in b"I?: FOO\0C?: BAR\0" {
            out.extend(collect(&mut d, &[*b]));
        }
        assert_eq!(out, vec!["I?: FOO", "C?: BAR"]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut d = FrameDecoder::new();
        assert_eq!(collect(&mut d, b"ok\xff\0"), vec!["ok\u{fffd}"]);
    }

    #[test]
    fn unpulled_messages_survive() {
        let mut d = FrameDecoder::new();
        let first = d.feed(b"one\0two\0").next().unwrap().unwrap();
        assert_eq!(first, "one");
        assert_eq!(collect(&mut d, b""), vec!["two"]);
    }

    #[test]
    fn overflow_drops_buffer_and_recovers() {
        let mut d = FrameDecoder::new();
        let junk = vec![b'x'; MAX_FRAME_LEN + 1];
        let res: Vec<_> = d.feed(&junk).collect();
        assert_eq!(res.len(), 1);
        assert!(matches!(res[0], Err(Error::FrameOverflow { .. })));
        assert_eq!(d.pending(), 0);
        // rest of the overlong message is skipped, not delivered
        assert_eq!(collect(&mut d, b"xxxx"), Vec::<String>::new());
        assert_eq!(d.pending(), 0);
        assert_eq!(collect(&mut d, b"xxxxxxTAIL\0fine\0"), vec!["fine"]);
        assert_eq!(collect(&mut d, b"next\0"), vec!["next"]);
    }

    #[test]
    fn overlong_message_in_one_read_is_rejected() {
        let mut d = FrameDecoder::new();
        let mut bytes = vec![b'z'; 4 * MAX_FRAME_LEN];
        bytes.push(TERMINATOR);
        bytes.extend_from_slice(b"fine\0");
        let res: Vec<_> = d.feed(&bytes).collect();
        assert_eq!(res.len(), 2);
        assert!(matches!(res[0], Err(Error::FrameOverflow { .. })));
        assert_eq!(res[1].as_ref().unwrap(), "fine");
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn message_at_limit_is_accepted() {
        let mut d = FrameDecoder::new();
        let mut bytes = vec![b'y'; MAX_FRAME_LEN];
        assert!(d.feed(&bytes).next().is_none());
        bytes.clear();
        bytes.push(TERMINATOR);
        let out = collect(&mut d, &bytes);
        assert_eq!(out[0].len(), MAX_FRAME_LEN);
    }
}
