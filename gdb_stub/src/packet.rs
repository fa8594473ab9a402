//! RSP packet framing: `$<payload>#<checksum>` with ACK/NAK recovery and
//! run-length compression on send.

use debug_channel::DebugChannel;

use crate::hex;

pub const ACK: u8 = b'+';
pub const NAK: u8 = b'-';

/// Longest run the encoder will collapse. The count byte encodes
/// `run - 4 + b' '`, so 98 keeps it at `b'~'` and printable.
const MAX_RUN: usize = 98;

/// Payload location within the receive buffer: packets carrying a
/// sequence-id prefix deliver their payload at offset 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Payload {
    pub offset: usize,
    pub len: usize,
}

/// Receive one well-formed packet into `buf`, replying NAK until a frame
/// arrives whose checksum matches, then ACK.
///
/// A `$` inside a frame restarts accumulation (line noise resync). If the
/// first two payload bytes are a sequence id (third byte `:`), they are
/// echoed raw and the delivered payload starts after the colon.
pub fn recv_packet<C: DebugChannel>(chan: &mut C, buf: &mut [u8]) -> Result<Payload, C::Error> {
    'hunt: loop {
        while chan.get()? != b'$' {}

        'frame: loop {
            let mut checksum = 0u8;
            let mut len = 0usize;

            loop {
                let byte = chan.get()?;
                match byte {
                    b'$' => continue 'frame,
                    b'#' => break,
                    _ => {
                        if len >= buf.len() - 1 {
                            // Overlong frame; drop it and hunt for the next start.
                            log::debug!("dropping overlong packet");
                            continue 'hunt;
                        }
                        checksum = checksum.wrapping_add(byte);
                        buf[len] = byte;
                        len += 1;
                    }
                }
            }

            let hi = hex::from_hex_digit(chan.get()?);
            let lo = hex::from_hex_digit(chan.get()?);
            let sent = match (hi, lo) {
                (Some(hi), Some(lo)) => (hi << 4) | lo,
                _ => {
                    chan.put(NAK)?;
                    continue 'hunt;
                }
            };

            if sent != checksum {
                log::debug!("checksum mismatch: got {sent:#04x}, computed {checksum:#04x}");
                chan.put(NAK)?;
                continue 'hunt;
            }

            chan.put(ACK)?;

            if len >= 3 && buf[2] == b':' {
                chan.put(buf[0])?;
                chan.put(buf[1])?;
                return Ok(Payload {
                    offset: 3,
                    len: len - 3,
                });
            }
            return Ok(Payload { offset: 0, len });
        }
    }
}

/// Send `payload` framed and run-length compressed, retransmitting the whole
/// frame until the peer ACKs it. The checksum covers the bytes as emitted.
pub fn send_packet<C: DebugChannel>(chan: &mut C, payload: &[u8]) -> Result<(), C::Error> {
    loop {
        chan.put(b'$')?;
        let mut checksum = 0u8;

        let mut idx = 0usize;
        while idx < payload.len() {
            let byte = payload[idx];
            let mut run = 1usize;
            while run < MAX_RUN && idx + run < payload.len() && payload[idx + run] == byte {
                run += 1;
            }

            if run > 3 {
                let count = (run - 4) as u8 + b' ';
                for out in [byte, b'*', count] {
                    chan.put(out)?;
                    checksum = checksum.wrapping_add(out);
                }
                idx += run;
            } else {
                chan.put(byte)?;
                checksum = checksum.wrapping_add(byte);
                idx += 1;
            }
        }

        chan.put(b'#')?;
        chan.put(hex::high_digit(checksum))?;
        chan.put(hex::low_digit(checksum))?;
        chan.flush()?;

        if chan.get()? == ACK {
            return Ok(());
        }
        log::debug!("peer rejected frame, retransmitting");
    }
}
