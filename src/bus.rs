//! Bus adapter (C2): send/receive CAN frames with deadlines, filtered to
//! the IDs this protocol cares about.

use std::time::{Duration, Instant};

use crate::frame::{CanFrame, RECEIVE_FILTER};

/// Capability contract for a CAN transport.
///
/// Implementors only need to provide raw `send`/`try_recv`; filtering,
/// deadlines and draining are provided once here so every transport
/// (SocketCAN, a simulator, anything else) behaves identically.
pub trait BusAdapter {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends a single frame.
    fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error>;

    /// Returns the next frame waiting on the bus, if any, without blocking.
    fn try_recv(&mut self) -> Result<Option<CanFrame>, Self::Error>;

    /// Blocks until a frame in [`RECEIVE_FILTER`] arrives or `deadline`
    /// elapses, whichever is first.
    fn recv(&mut self, deadline: Duration) -> Result<Option<CanFrame>, Self::Error> {
        let start = Instant::now();
        loop {
            if let Some(frame) = self.try_recv()? {
                if frame
                    .frame_id()
                    .map(|id| RECEIVE_FILTER.contains(&id))
                    .unwrap_or(false)
                {
                    return Ok(Some(frame));
                }
                continue;
            }
            if start.elapsed() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(1).min(deadline));
        }
    }

    /// Consumes buffered frames until a 250 ms quiet window or a cap of 100
    /// frames is reached, whichever comes first.
    fn drain(&mut self) -> Result<(), Self::Error> {
        const QUIET_WINDOW: Duration = Duration::from_millis(250);
        const CAP: usize = 100;
        for _ in 0..CAP {
            match self.recv(QUIET_WINDOW)? {
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }
}

/// In-memory bus used by tests and the end-to-end scenarios: a TX queue the
/// test harness inspects, and an RX queue the test harness feeds.
#[derive(Debug, Default)]
pub struct SimulatedBus {
    pub sent: Vec<CanFrame>,
    pub pending: std::collections::VecDeque<CanFrame>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a frame that a subsequent `recv`/`try_recv` will return.
    pub fn push(&mut self, frame: CanFrame) {
        self.pending.push_back(frame);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("simulated bus error")]
pub struct SimulatedBusError;

impl BusAdapter for SimulatedBus {
    type Error = SimulatedBusError;

    fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        self.sent.push(frame.clone());
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<CanFrame>, Self::Error> {
        Ok(self.pending.pop_front())
    }
}

#[cfg(feature = "socketcan-bus")]
mod socketcan_bus {
    use super::*;
    use socketcan::{CanFrame as SocketCanFrame, ExtendedId, Frame, Id, Socket, SocketOptions};
    use std::time::Duration;

    /// Linux SocketCAN transport.
    pub struct SocketCanBus {
        socket: socketcan::CanSocket,
    }

    impl SocketCanBus {
        /// Opens `interface` (e.g. `"can0"`) and enables a short read
        /// timeout so `try_recv` never blocks the caller for longer than a
        /// tick; actual deadline handling is layered on top by
        /// [`BusAdapter::recv`].
        pub fn open(interface: &str) -> std::io::Result<Self> {
            let socket = socketcan::CanSocket::open(interface)?;
            socket.set_read_timeout(Duration::from_millis(5))?;
            Ok(SocketCanBus { socket })
        }
    }

    impl BusAdapter for SocketCanBus {
        // `Socket::read_frame`/`write_frame` both yield `io::Result`; keep
        // this transport on the same error type rather than an unrelated
        // `socketcan::Error` that `send` would need to convert into.
        type Error = std::io::Error;

        fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
            let id = ExtendedId::new(frame.id()).expect("29-bit id always fits ExtendedId");
            let out = SocketCanFrame::new(Id::Extended(id), frame.data())
                .expect("payload is always <= 8 bytes");
            self.socket.write_frame(&out)
        }

        fn try_recv(&mut self) -> Result<Option<CanFrame>, Self::Error> {
            match self.socket.read_frame() {
                Ok(frame) => {
                    let id = match frame.id() {
                        Id::Extended(id) => id.as_raw(),
                        Id::Standard(id) => id.as_raw() as u32,
                    };
                    Ok(Some(CanFrame::new(id, frame.data())))
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
                Err(e) => Err(e),
            }
        }
    }
}

#[cfg(feature = "socketcan-bus")]
pub use socketcan_bus::SocketCanBus;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameId;

    #[test]
    fn recv_filters_out_ids_not_in_receive_filter() {
        let mut bus = SimulatedBus::new();
        bus.push(CanFrame::new(FrameId::Cmd.as_u32(), &[1, 2, 3]));
        bus.push(CanFrame::new(FrameId::Ack.as_u32(), &[0; 8]));
        let frame = bus.recv(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(frame.frame_id(), Some(FrameId::Ack));
    }

    #[test]
    fn recv_times_out_with_nothing_pending() {
        let mut bus = SimulatedBus::new();
        assert!(bus.recv(Duration::from_millis(5)).unwrap().is_none());
    }

    #[test]
    fn drain_stops_at_first_gap() {
        let mut bus = SimulatedBus::new();
        bus.push(CanFrame::new(FrameId::Ack.as_u32(), &[0; 8]));
        bus.push(CanFrame::new(FrameId::Ack.as_u32(), &[0; 8]));
        bus.drain().unwrap();
        assert!(bus.pending.is_empty());
    }
}
