// Rust guideline compliant 2026-03-05

//! Wire codec for sensor records.
//!
//! One record is 18 bytes: `u16 sensor_id`, `f64 value`, `i64 timestamp`
//! (epoch seconds), all little-endian. The original gateway read these fields
//! raw in host order and relied on a shared platform ABI; this codec pins the
//! framing to little-endian so peers and gateway agree regardless of host.
//!
//! [`encode_record`] is exported for sensor-node simulators and tests.

use domain::SensorRecord;
use tokio::io::{AsyncRead, AsyncReadExt as _};

/// Encoded size of one record on the wire.
pub const RECORD_WIRE_LEN: usize = 18;

/// Encode a record into its 18-byte wire frame.
#[must_use]
pub fn encode_record(record: &SensorRecord) -> [u8; RECORD_WIRE_LEN] {
    let mut frame = [0u8; RECORD_WIRE_LEN];
    frame[0..2].copy_from_slice(&record.sensor_id.to_le_bytes());
    frame[2..10].copy_from_slice(&record.value.to_le_bytes());
    frame[10..18].copy_from_slice(&record.timestamp.to_le_bytes());
    frame
}

/// Decode an 18-byte wire frame into a record.
#[must_use]
pub fn decode_record(frame: &[u8; RECORD_WIRE_LEN]) -> SensorRecord {
    // Slice bounds are fixed; the conversions cannot fail.
    let mut sensor_id = [0u8; 2];
    sensor_id.copy_from_slice(&frame[0..2]);
    let mut value = [0u8; 8];
    value.copy_from_slice(&frame[2..10]);
    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&frame[10..18]);
    SensorRecord {
        sensor_id: u16::from_le_bytes(sensor_id),
        value: f64::from_le_bytes(value),
        timestamp: i64::from_le_bytes(timestamp),
    }
}

/// Read one full record from `reader`.
///
/// Returns `Ok(None)` on end-of-stream: either a clean hang-up at a record
/// boundary or a hang-up mid-record. In the latter case the partial record is
/// dropped, never partially delivered.
///
/// # Errors
///
/// Propagates any I/O error other than `UnexpectedEof`.
pub async fn read_record<R>(reader: &mut R) -> std::io::Result<Option<SensorRecord>>
where
    R: AsyncRead + Unpin + Send,
{
    let mut frame = [0u8; RECORD_WIRE_LEN];
    match reader.read_exact(&mut frame).await {
        Ok(_) => Ok(Some(decode_record(&frame))),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{RECORD_WIRE_LEN, decode_record, encode_record, read_record};
    use domain::SensorRecord;

    #[test]
    fn encode_layout_is_little_endian() {
        let record = SensorRecord { sensor_id: 0x0102, value: 1.0, timestamp: 0x0A0B };
        let frame = encode_record(&record);
        assert_eq!(frame[0..2], [0x02, 0x01]);
        assert_eq!(frame[2..10], 1.0_f64.to_le_bytes());
        assert_eq!(frame[10..12], [0x0B, 0x0A]);
        assert!(frame[12..].iter().all(|b| *b == 0));
    }

    #[test]
    fn decode_inverts_encode() {
        let record = SensorRecord { sensor_id: 42, value: -12.75, timestamp: 1_700_000_123 };
        assert_eq!(decode_record(&encode_record(&record)), record);
    }

    #[tokio::test]
    async fn read_consumes_exactly_one_record() {
        let first = SensorRecord { sensor_id: 1, value: 20.0, timestamp: 10 };
        let second = SensorRecord { sensor_id: 2, value: 21.0, timestamp: 11 };
        let mut bytes = vec![];
        bytes.extend_from_slice(&encode_record(&first));
        bytes.extend_from_slice(&encode_record(&second));

        let mut reader = bytes.as_slice();
        assert_eq!(read_record(&mut reader).await.unwrap(), Some(first));
        assert_eq!(read_record(&mut reader).await.unwrap(), Some(second));
        assert_eq!(read_record(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn partial_record_is_dropped_on_eof() {
        let record = SensorRecord { sensor_id: 1, value: 20.0, timestamp: 10 };
        let mut bytes = encode_record(&record).to_vec();
        bytes.truncate(RECORD_WIRE_LEN - 5);

        let mut reader = bytes.as_slice();
        assert_eq!(read_record(&mut reader).await.unwrap(), None);
    }
}
