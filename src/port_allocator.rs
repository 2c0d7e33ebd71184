use std::collections::HashSet;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use tracing::trace;

/// Returned by [`PortAllocator::allocate`] when every candidate in the
/// configured range is either handed out already or currently accepting
/// connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PortExhaustion {
    pub base: u16,
    pub span: u16,
}

impl std::fmt::Display for PortExhaustion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "no free port in {}..{}",
            self.base,
            u32::from(self.base) + u32::from(self.span)
        )
    }
}

impl std::error::Error for PortExhaustion {}

/// Hands out unique, currently-unbound TCP ports from a bounded range.
///
/// A candidate is accepted only if it has not been handed out already and a
/// live connect attempt to it fails. Between the probe and the bind by the
/// spawned server another process may still claim the port; the allocation
/// is not retried in that case.
#[derive(Debug)]
pub(crate) struct PortAllocator {
    base: u16,
    span: u16,
    taken: HashSet<u16>,
}

impl PortAllocator {
    const PROBE_TIMEOUT: Duration = Duration::from_millis(50);

    pub fn new(base: u16, span: u16) -> Self {
        PortAllocator {
            base,
            span,
            taken: HashSet::new(),
        }
    }

    /// Next free port at or above the base, or [`PortExhaustion`] once the
    /// whole span has been scanned.
    pub fn allocate(&mut self) -> anyhow::Result<u16> {
        for offset in 0..self.span {
            let candidate = u32::from(self.base) + u32::from(offset);
            let Ok(port) = u16::try_from(candidate) else {
                break;
            };
            if self.taken.contains(&port) {
                continue;
            }
            if Self::something_listens(port) {
                trace!(port, "candidate already accepts connections, skipping");
                continue;
            }
            self.taken.insert(port);
            return Ok(port);
        }
        Err(PortExhaustion {
            base: self.base,
            span: self.span,
        }
        .into())
    }

    /// Return a port to the pool once its run has been torn down.
    pub fn release(&mut self, port: u16) {
        self.taken.remove(&port);
    }

    fn something_listens(port: u16) -> bool {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        TcpStream::connect_timeout(&addr, Self::PROBE_TIMEOUT).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn allocated_ports_are_unique() {
        let mut alloc = PortAllocator::new(40200, 64);
        let first = alloc.allocate().unwrap();
        let second = alloc.allocate().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn listening_ports_are_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut alloc = PortAllocator::new(port, 16);
        let got = alloc.allocate().unwrap();
        assert_ne!(got, port);
    }

    #[test]
    fn exhaustion_is_a_typed_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut alloc = PortAllocator::new(port, 1);
        let err = alloc.allocate().unwrap_err();
        assert!(err.downcast_ref::<PortExhaustion>().is_some());
    }

    #[test]
    fn released_ports_can_be_handed_out_again() {
        let mut alloc = PortAllocator::new(40300, 64);
        let port = alloc.allocate().unwrap();
        alloc.release(port);
        assert_eq!(alloc.allocate().unwrap(), port);
    }

    #[test]
    fn scan_stops_at_the_end_of_the_port_space() {
        let mut alloc = PortAllocator::new(u16::MAX, 16);
        // only u16::MAX itself is a candidate; either it is free or the
        // allocator must report exhaustion instead of wrapping around
        match alloc.allocate() {
            Ok(port) => assert_eq!(port, u16::MAX),
            Err(err) => {
                assert!(err.downcast_ref::<PortExhaustion>().is_some());
            }
        }
    }
}
