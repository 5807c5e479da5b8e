//! Inter-stage packet buffers.
//!
//! A [`PacketBuffer`] is the fixed-capacity FIFO shared by two adjacent
//! stages: exactly one producer and one consumer. It is split at creation
//! into a [`BufferWriter`] and a [`BufferReader`] half, so the type system
//! enforces the single-writer/single-reader discipline.
//!
//! Backpressure is structural: the writer blocks when the buffer is full,
//! the reader blocks when it is empty (subject to the receive timeout).
//! Every blocking wait observes the pipeline cancellation token, so an
//! abort unblocks both halves in bounded time. End of stream is signalled
//! by dropping the writer; the reader drains what is queued and then
//! reports an empty batch.

use crate::error::{Error, Result};
use crate::packet::Packet;
use kanal::{bounded_async, AsyncReceiver, AsyncSender};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Create a packet buffer of `capacity` slots between two stages.
///
/// `receive_timeout` bounds how long the reader may wait on an empty
/// buffer; `None` means block indefinitely. `cancel` is the pipeline-wide
/// cancellation token observed at every blocking wait.
pub fn packet_buffer(
    capacity: usize,
    receive_timeout: Option<Duration>,
    cancel: CancellationToken,
) -> (BufferWriter, BufferReader) {
    let capacity = capacity.max(1);
    let (tx, rx) = bounded_async::<Packet>(capacity);
    let writer = BufferWriter {
        tx,
        capacity,
        cancel: cancel.clone(),
    };
    let reader = BufferReader {
        rx,
        capacity,
        timeout: receive_timeout,
        cancel,
    };
    (writer, reader)
}

/// Producer half of a packet buffer.
pub struct BufferWriter {
    tx: AsyncSender<Packet>,
    capacity: usize,
    cancel: CancellationToken,
}

impl BufferWriter {
    /// Write a batch of packets, blocking while the buffer is full.
    ///
    /// Returns the number of packets accepted. Cancellation (pipeline
    /// abort) or a vanished reader surfaces as [`Error::Cancelled`];
    /// packets accepted before that point stay queued for the reader.
    pub async fn write(&self, packets: impl IntoIterator<Item = Packet>) -> Result<usize> {
        let mut accepted = 0;
        for packet in packets {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                res = self.tx.send(packet) => {
                    if res.is_err() {
                        // Reader side is gone; nothing more will ever drain.
                        return Err(Error::Cancelled);
                    }
                    accepted += 1;
                }
            }
        }
        Ok(accepted)
    }

    /// Number of packets currently queued.
    pub fn occupancy(&self) -> usize {
        self.tx.len()
    }

    /// Buffer capacity in packets.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer half of a packet buffer.
pub struct BufferReader {
    rx: AsyncReceiver<Packet>,
    capacity: usize,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl BufferReader {
    /// Read up to `max_count` packets.
    ///
    /// Blocks for the first packet (subject to the receive timeout), then
    /// takes whatever else is already queued up to the bound, without
    /// waiting again. An empty batch means the writer finished and the
    /// buffer has drained, meaning end of stream.
    pub async fn read(&self, max_count: usize) -> Result<Vec<Packet>> {
        let max_count = max_count.max(1);

        let first = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            res = self.recv_one() => res?,
        };
        let Some(first) = first else {
            return Ok(Vec::new());
        };

        let mut batch = Vec::with_capacity(max_count.min(self.capacity));
        batch.push(first);
        while batch.len() < max_count {
            match self.rx.try_recv() {
                Ok(Some(packet)) => batch.push(packet),
                // Empty or closed; what we have is the batch.
                Ok(None) | Err(_) => break,
            }
        }
        Ok(batch)
    }

    /// Wait for one packet. `Ok(None)` means the writer is gone and the
    /// buffer is drained.
    async fn recv_one(&self) -> Result<Option<Packet>> {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.rx.recv()).await {
                Ok(Ok(packet)) => Ok(Some(packet)),
                Ok(Err(_)) => Ok(None),
                Err(_) => Err(Error::Timeout(limit.as_millis() as u64)),
            },
            None => match self.rx.recv().await {
                Ok(packet) => Ok(Some(packet)),
                Err(_) => Ok(None),
            },
        }
    }

    /// Number of packets currently queued.
    pub fn occupancy(&self) -> usize {
        self.rx.len()
    }

    /// Buffer capacity in packets.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create a read-only occupancy probe for the monitor.
    pub fn probe(&self) -> OccupancyProbe {
        OccupancyProbe {
            rx: self.rx.clone(),
            capacity: self.capacity,
        }
    }
}

/// Read-only view of a buffer's occupancy, for monitoring.
///
/// Holds a receiver clone but never receives; it only reads the queue
/// length counter.
#[derive(Clone)]
pub struct OccupancyProbe {
    rx: AsyncReceiver<Packet>,
    capacity: usize,
}

impl OccupancyProbe {
    /// Number of packets currently queued.
    pub fn occupancy(&self) -> usize {
        self.rx.len()
    }

    /// Buffer capacity in packets.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn packets(n: usize) -> Vec<Packet> {
        (0..n).map(|i| Packet::new(&[i as u8; 8][..])).collect()
    }

    #[tokio::test]
    async fn test_write_then_read_fifo() {
        let (writer, reader) = packet_buffer(16, None, CancellationToken::new());

        let accepted = writer.write(packets(5)).await.unwrap();
        assert_eq!(accepted, 5);

        let batch = reader.read(16).await.unwrap();
        assert_eq!(batch.len(), 5);
        for (i, pkt) in batch.iter().enumerate() {
            assert_eq!(pkt.payload()[0], i as u8);
        }
    }

    #[tokio::test]
    async fn test_occupancy_never_exceeds_capacity() {
        let (writer, reader) = packet_buffer(4, None, CancellationToken::new());

        writer.write(packets(4)).await.unwrap();
        assert_eq!(writer.occupancy(), 4);
        assert!(writer.occupancy() <= writer.capacity());

        let batch = reader.read(2).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(reader.occupancy(), 2);
    }

    #[tokio::test]
    async fn test_min_capacity_is_one() {
        let (writer, reader) = packet_buffer(0, None, CancellationToken::new());
        assert_eq!(writer.capacity(), 1);

        writer.write(packets(1)).await.unwrap();
        assert_eq!(reader.read(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_writer_blocks_when_full() {
        let (writer, _reader) = packet_buffer(2, None, CancellationToken::new());

        writer.write(packets(2)).await.unwrap();

        // A third write must block until space appears.
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            writer.write(packets(1)),
        )
        .await;
        assert!(blocked.is_err(), "write on a full buffer should block");
    }

    #[tokio::test]
    async fn test_reader_eos_after_writer_drop() {
        let (writer, reader) = packet_buffer(8, None, CancellationToken::new());

        writer.write(packets(3)).await.unwrap();
        drop(writer);

        // Queued packets drain first, then EOS.
        let batch = reader.read(8).await.unwrap();
        assert_eq!(batch.len(), 3);
        let batch = reader.read(8).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (_writer, reader) =
            packet_buffer(8, Some(Duration::from_millis(20)), CancellationToken::new());

        let start = Instant::now();
        let result = reader.read(1).await;
        assert!(matches!(result, Err(Error::Timeout(20))));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_reader() {
        let cancel = CancellationToken::new();
        let (_writer, reader) = packet_buffer(8, None, cancel.clone());

        let task = tokio::spawn(async move { reader.read(1).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(100), task)
            .await
            .expect("cancelled read must unblock in bounded time")
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_writer() {
        let cancel = CancellationToken::new();
        let (writer, _reader) = packet_buffer(1, None, cancel.clone());

        writer.write(packets(1)).await.unwrap();

        let task = tokio::spawn(async move { writer.write(packets(1)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(100), task)
            .await
            .expect("cancelled write must unblock in bounded time")
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_probe_reads_occupancy() {
        let (writer, reader) = packet_buffer(8, None, CancellationToken::new());
        let probe = reader.probe();

        assert_eq!(probe.occupancy(), 0);
        writer.write(packets(3)).await.unwrap();
        assert_eq!(probe.occupancy(), 3);
        assert_eq!(probe.capacity(), 8);

        // The probe must not disturb the data path.
        let batch = reader.read(8).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(probe.occupancy(), 0);
    }
}
