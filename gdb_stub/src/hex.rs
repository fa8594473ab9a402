//! Hex-ASCII conversion for register and memory blobs, and a cursor for the
//! numeric fields embedded in command payloads.

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// ASCII hex digit for the high nibble of `byte`.
pub const fn high_digit(byte: u8) -> u8 {
    HEX_DIGITS[(byte >> 4) as usize]
}

/// ASCII hex digit for the low nibble of `byte`.
pub const fn low_digit(byte: u8) -> u8 {
    HEX_DIGITS[(byte & 0xf) as usize]
}

pub fn from_hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(10 + byte - b'a'),
        b'A'..=b'F' => Some(10 + byte - b'A'),
        _ => None,
    }
}

/// Encode `src` as hex ASCII into `dst`, high nibble first per byte.
/// Returns the number of characters written (two per input byte, truncated
/// to what fits).
pub fn encode_hex(src: &[u8], dst: &mut [u8]) -> usize {
    let mut idx = 0usize;
    for &b in src {
        if idx + 2 > dst.len() {
            break;
        }
        dst[idx] = high_digit(b);
        dst[idx + 1] = low_digit(b);
        idx += 2;
    }
    idx
}

/// Decode hex ASCII in `src` into raw bytes in `dst`. `src` must have even
/// length, hold only hex digits, and fit in `dst`.
pub fn decode_hex(src: &[u8], dst: &mut [u8]) -> Result<usize, ()> {
    if src.len() % 2 != 0 {
        return Err(());
    }
    let mut out = 0usize;
    for pair in src.chunks_exact(2) {
        if out >= dst.len() {
            return Err(());
        }
        let hi = from_hex_digit(pair[0]).ok_or(())?;
        let lo = from_hex_digit(pair[1]).ok_or(())?;
        dst[out] = (hi << 4) | lo;
        out += 1;
    }
    Ok(out)
}

/// Cursor over a command payload for the `<hex>,<hex>:<data>` argument
/// grammar shared by several commands.
pub struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Greedily consume hex digits into an unsigned value, stopping before
    /// the first non-digit. `None` when no digit is present at the cursor.
    pub fn hex_u32(&mut self) -> Option<u32> {
        let mut value = 0u32;
        let mut digits = 0usize;
        while let Some(&b) = self.buf.get(self.pos) {
            let Some(digit) = from_hex_digit(b) else {
                break;
            };
            value = (value << 4) | u32::from(digit);
            digits += 1;
            self.pos += 1;
        }
        if digits == 0 {
            return None;
        }
        Some(value)
    }

    /// Consume `byte` if it is next; leave the cursor alone otherwise.
    pub fn expect(&mut self, byte: u8) -> bool {
        if self.buf.get(self.pos) == Some(&byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Everything after the cursor.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }
}
