use rosproxy_common::{PortRange, ProxyError, Result};
use std::io;
use std::sync::Mutex;
use tokio::net::TcpListener;
use tracing::debug;

/// Hands out listening sockets for rendezvous proxies
///
/// Without a range the operating system picks the port. With a range, ports
/// are tried starting after the last one handed out, so a port released by a
/// dropped proxy is the last candidate to be reused.
pub struct PortAllocator {
    bind_host: String,
    range: Option<PortRange>,
    cursor: Mutex<usize>,
}

impl PortAllocator {
    pub fn new(bind_host: impl Into<String>, range: Option<PortRange>) -> Self {
        Self {
            bind_host: bind_host.into(),
            range,
            cursor: Mutex::new(0),
        }
    }

    /// Bind a listener on a free port
    pub async fn bind(&self) -> Result<TcpListener> {
        let Some(range) = self.range else {
            return TcpListener::bind((self.bind_host.as_str(), 0))
                .await
                .map_err(|e| ProxyError::Bind(format!("{}:0: {}", self.bind_host, e)));
        };

        let start = self.next_offset(range);
        for step in 0..range.len() {
            let offset = (start + step) % range.len();
            let port = range.min + offset as u16;

            match TcpListener::bind((self.bind_host.as_str(), port)).await {
                Ok(listener) => {
                    self.advance(offset + 1);
                    return Ok(listener);
                }
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => continue,
                Err(e) => debug!("Skipping port {}: {}", port, e),
            }
        }

        Err(ProxyError::PortRangeExhausted {
            min: range.min,
            max: range.max,
        })
    }

    fn next_offset(&self, range: PortRange) -> usize {
        match self.cursor.lock() {
            Ok(cursor) => *cursor % range.len(),
            Err(poisoned) => *poisoned.into_inner() % range.len(),
        }
    }

    fn advance(&self, offset: usize) {
        match self.cursor.lock() {
            Ok(mut cursor) => *cursor = offset,
            Err(poisoned) => *poisoned.into_inner() = offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn free_range(len: u16) -> PortRange {
        // Find a run of free ports by probing upwards from an OS-assigned one
        loop {
            let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base = probe.local_addr().unwrap().port();
            drop(probe);
            if base.checked_add(len).is_none() {
                continue;
            }
            let mut all_free = true;
            for port in base..base + len {
                if TcpListener::bind(("127.0.0.1", port)).await.is_err() {
                    all_free = false;
                    break;
                }
            }
            if all_free {
                return PortRange::new(base, base + len - 1).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_any_port_without_range() {
        let allocator = PortAllocator::new("127.0.0.1", None);
        let listener = allocator.bind().await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_range_is_respected_and_rotates() {
        let range = free_range(3).await;
        let allocator = PortAllocator::new("127.0.0.1", Some(range));

        let first = allocator.bind().await.unwrap();
        let first_port = first.local_addr().unwrap().port();
        assert!(range.contains(first_port));
        drop(first);

        // The released port is not handed out again right away
        let second = allocator.bind().await.unwrap();
        let second_port = second.local_addr().unwrap().port();
        assert!(range.contains(second_port));
        assert_ne!(first_port, second_port);
    }

    #[tokio::test]
    async fn test_exhausted_range() {
        let range = free_range(2).await;
        let allocator = PortAllocator::new("127.0.0.1", Some(range));

        let _a = allocator.bind().await.unwrap();
        let _b = allocator.bind().await.unwrap();

        let err = allocator.bind().await.unwrap_err();
        assert!(matches!(err, ProxyError::PortRangeExhausted { .. }));
    }
}
