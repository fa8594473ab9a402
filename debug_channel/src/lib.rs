#![no_std]

//! Byte-oriented debug transport used by the in-target debug stub.
//!
//! The stub core only ever needs three operations from its transport: read
//! one byte (blocking), write one byte, and flush. Two concrete channels
//! satisfy that contract: a plain serial line, and a host-loader tunnel that
//! moves whole buffers per request/response exchange and therefore needs a
//! byte-level adapter in front of it.

/// Serial fallback line rate when no loader tunnel is present.
pub const SERIAL_BAUD: u32 = 57_600;

/// Blocking byte channel between the debug stub and the host.
pub trait DebugChannel {
    /// Error type returned by channel operations.
    type Error;

    /// Read a single byte, blocking until one is available.
    fn get(&mut self) -> Result<u8, Self::Error>;

    /// Write a single byte.
    fn put(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// Flush any buffered output. Default is a no-op.
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Write an entire buffer.
    fn put_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        for &b in buf {
            self.put(b)?;
        }
        Ok(())
    }
}

/// Host-loader packet tunnel: one call sends a buffer to the loader and/or
/// receives the loader's next buffer.
pub trait TunnelPort {
    type Error;

    /// Perform one exchange. `out` may be empty (receive-only); when `input`
    /// is `None` nothing is received. Returns the number of bytes received.
    fn exchange(&mut self, out: &[u8], input: Option<&mut [u8]>) -> Result<usize, Self::Error>;

    /// Whether the host-side loader answers on this tunnel at all.
    fn probe(&mut self) -> bool;
}

/// Serial channel that can be (re)configured to a fixed line rate before use.
pub trait SerialPort: DebugChannel {
    fn configure(&mut self, baud: u32);
}

/// Byte-level adapter over a [`TunnelPort`].
///
/// Reads are served from a staging buffer refilled one exchange at a time;
/// writes accumulate until [`DebugChannel::flush`], the buffer filling up, or
/// a read that needs a refill (the pending output rides along on the refill
/// exchange, so an ACK written just before a blocking read still reaches the
/// host).
pub struct TunnelChannel<P, const N: usize = 1024> {
    port: P,
    rx: [u8; N],
    rx_pos: usize,
    rx_len: usize,
    tx: [u8; N],
    tx_len: usize,
}

impl<P: TunnelPort, const N: usize> TunnelChannel<P, N> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            rx: [0u8; N],
            rx_pos: 0,
            rx_len: 0,
            tx: [0u8; N],
            tx_len: 0,
        }
    }

    pub fn into_port(self) -> P {
        self.port
    }

    fn refill(&mut self) -> Result<(), P::Error> {
        self.rx_len = self.port.exchange(&self.tx[..self.tx_len], Some(&mut self.rx))?;
        self.tx_len = 0;
        self.rx_pos = 0;
        Ok(())
    }
}

impl<P: TunnelPort, const N: usize> DebugChannel for TunnelChannel<P, N> {
    type Error = P::Error;

    fn get(&mut self) -> Result<u8, Self::Error> {
        while self.rx_pos >= self.rx_len {
            self.refill()?;
        }
        let byte = self.rx[self.rx_pos];
        self.rx_pos += 1;
        Ok(byte)
    }

    fn put(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.tx[self.tx_len] = byte;
        self.tx_len += 1;
        if self.tx_len >= N {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.tx_len > 0 {
            self.port.exchange(&self.tx[..self.tx_len], None)?;
            self.tx_len = 0;
        }
        Ok(())
    }
}

/// The transport in use for a debug session, chosen once at startup.
pub enum Link<P, S, const N: usize = 1024> {
    Tunnel(TunnelChannel<P, N>),
    Serial(S),
}

impl<P, S, const N: usize> Link<P, S, N>
where
    P: TunnelPort,
    S: SerialPort<Error = P::Error>,
{
    /// Probe for the loader tunnel; fall back to the serial line at the
    /// fixed debug baud rate when the loader does not answer.
    pub fn select(mut port: P, mut serial: S) -> Self {
        if port.probe() {
            Link::Tunnel(TunnelChannel::new(port))
        } else {
            serial.configure(SERIAL_BAUD);
            Link::Serial(serial)
        }
    }
}

impl<P, S, const N: usize> DebugChannel for Link<P, S, N>
where
    P: TunnelPort,
    S: SerialPort<Error = P::Error>,
{
    type Error = P::Error;

    fn get(&mut self) -> Result<u8, Self::Error> {
        match self {
            Link::Tunnel(t) => t.get(),
            Link::Serial(s) => s.get(),
        }
    }

    fn put(&mut self, byte: u8) -> Result<(), Self::Error> {
        match self {
            Link::Tunnel(t) => t.put(byte),
            Link::Serial(s) => s.put(byte),
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        match self {
            Link::Tunnel(t) => t.flush(),
            Link::Serial(s) => s.flush(),
        }
    }
}
