use crate::cbor::{self, CborError, Value};
use crate::cid::ContentId;
use crate::index::buckets::BucketSlot;
use crate::store::StoreId;

/// Describes one committed content DAG held by (or interesting to) the node.
///
/// The stable fields (content id, size, store id, frequency, bucket id) are
/// what the persistent map stores; the bucket back-pointer is runtime-only
/// and reconstructed when the index loads.
#[derive(Debug, Clone)]
pub struct ContentRef {
    /// Root content id of the DAG.
    pub payload_cid: ContentId,
    /// Total size of the DAG in bytes.
    pub payload_size: u64,
    /// Sub-store holding the DAG's blocks.
    pub store_id: StoreId,
    /// Observed accesses since insertion.
    pub freq: u64,
    /// Label of the frequency bucket currently containing this record.
    pub bucket_id: u64,
    /// Back-pointer into the bucket list. Not persisted.
    pub(crate) slot: Option<BucketSlot>,
}

impl ContentRef {
    /// Creates a record for freshly committed content.
    ///
    /// Frequency starts at zero: insertion itself does not count as an
    /// access, only subsequent reads do.
    pub fn new(payload_cid: ContentId, payload_size: u64, store_id: StoreId) -> Self {
        Self {
            payload_cid,
            payload_size,
            store_id,
            freq: 0,
            bucket_id: 0,
            slot: None,
        }
    }

    /// Serializes the stable fields in fixed order.
    pub fn encode(&self) -> Result<Vec<u8>, CborError> {
        let value = Value::Map(vec![
            ("cid".to_string(), Value::bytes(self.payload_cid.as_bytes())),
            ("size".to_string(), Value::Unsigned(self.payload_size)),
            ("store".to_string(), Value::Unsigned(self.store_id.0)),
            ("freq".to_string(), Value::Unsigned(self.freq)),
            ("bucket".to_string(), Value::Unsigned(self.bucket_id)),
        ]);
        cbor::encode(&value)
    }

    /// Decodes a record; the bucket back-pointer starts unset.
    pub fn decode(data: &[u8]) -> Result<Self, CborError> {
        let value = cbor::decode(data)?;
        let cid_bytes = value
            .get("cid")
            .and_then(Value::as_bytes)
            .ok_or(CborError::Field("cid"))?;
        let payload_cid = ContentId::from_slice(cid_bytes).map_err(|_| CborError::Field("cid"))?;
        let payload_size = value
            .get("size")
            .and_then(Value::as_unsigned)
            .ok_or(CborError::Field("size"))?;
        let store_id = value
            .get("store")
            .and_then(Value::as_unsigned)
            .ok_or(CborError::Field("store"))?;
        let freq = value
            .get("freq")
            .and_then(Value::as_unsigned)
            .ok_or(CborError::Field("freq"))?;
        let bucket_id = value
            .get("bucket")
            .and_then(Value::as_unsigned)
            .ok_or(CborError::Field("bucket"))?;

        Ok(Self {
            payload_cid,
            payload_size,
            store_id: StoreId(store_id),
            freq,
            bucket_id,
            slot: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut record = ContentRef::new(ContentId::of(b"content"), 56000, StoreId(7));
        record.freq = 3;
        record.bucket_id = 4;

        let bytes = record.encode().unwrap();
        let decoded = ContentRef::decode(&bytes).unwrap();

        assert_eq!(decoded.payload_cid, record.payload_cid);
        assert_eq!(decoded.payload_size, 56000);
        assert_eq!(decoded.store_id, StoreId(7));
        assert_eq!(decoded.freq, 3);
        assert_eq!(decoded.bucket_id, 4);
        assert!(decoded.slot.is_none());
    }

    #[test]
    fn test_encoding_is_stable() {
        let record = ContentRef::new(ContentId::of(b"content"), 100, StoreId(1));
        assert_eq!(record.encode().unwrap(), record.encode().unwrap());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(ContentRef::decode(b"junk").is_err());

        // a map missing the size field
        let value = Value::Map(vec![(
            "cid".to_string(),
            Value::bytes(&[0u8; 32]),
        )]);
        let bytes = cbor::encode(&value).unwrap();
        assert!(ContentRef::decode(&bytes).is_err());
    }
}
