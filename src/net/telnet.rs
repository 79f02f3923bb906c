const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    #[default]
    Data,
    Command,
    Option { verb: u8 },
    Subnegotiation { escaped: bool },
}

/// Strips telnet commands from the input stream and refuses every option
/// the peer offers or asks for.
#[derive(Debug, Default)]
pub struct TelnetFilter {
    state: State,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Filtered {
    pub data: Vec<u8>,
    /// Bytes owed back to the peer.
    pub replies: Vec<u8>,
}

impl TelnetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Filtered {
        let mut filtered = Filtered {
            data: Vec::with_capacity(chunk.len()),
            replies: Vec::new(),
        };
        for &byte in chunk {
            self.state = match self.state {
                State::Data if byte == IAC => State::Command,
                State::Data => {
                    filtered.data.push(byte);
                    State::Data
                }
                State::Command => match byte {
                    IAC => {
                        filtered.data.push(IAC);
                        State::Data
                    }
                    DO | DONT | WILL | WONT => State::Option { verb: byte },
                    SB => State::Subnegotiation { escaped: false },
                    _ => State::Data,
                },
                State::Option { verb } => {
                    match verb {
                        DO => filtered.replies.extend_from_slice(&[IAC, WONT, byte]),
                        WILL => filtered.replies.extend_from_slice(&[IAC, DONT, byte]),
                        _ => {}
                    }
                    State::Data
                }
                State::Subnegotiation { escaped: true } if byte == SE => State::Data,
                State::Subnegotiation { escaped: true } => State::Subnegotiation { escaped: false },
                State::Subnegotiation { escaped: false } => State::Subnegotiation {
                    escaped: byte == IAC,
                },
            };
        }
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let mut filter = TelnetFilter::new();
        let out = filter.feed(b"look\r\n");
        assert_eq!(out.data, b"look\r\n");
        assert!(out.replies.is_empty());
    }

    #[test]
    fn negotiation_is_stripped_and_refused() {
        let mut filter = TelnetFilter::new();
        let out = filter.feed(&[IAC, DO, 1, b'h', IAC, WILL, 31, b'i', IAC, WONT, 3]);
        assert_eq!(out.data, b"hi");
        assert_eq!(out.replies, vec![IAC, WONT, 1, IAC, DONT, 31]);
    }

    #[test]
    fn subnegotiation_split_across_reads() {
        let mut filter = TelnetFilter::new();
        let first = filter.feed(&[b'a', IAC, SB, 24, 0, b'x']);
        let second = filter.feed(&[IAC, IAC, b'y', IAC, SE, b'b']);
        assert_eq!(first.data, b"a");
        assert_eq!(second.data, b"b");
    }

    #[test]
    fn escaped_iac_is_data() {
        let mut filter = TelnetFilter::new();
        assert_eq!(filter.feed(&[IAC, IAC]).data, vec![IAC]);
        assert_eq!(filter.feed(&[IAC, 241, b'z']).data, b"z");
    }
}
