//! Common Packet Format (CPF) item lists.
//!
//! The SendRRData/SendUnitData payload is `interface_handle(4) +
//! timeout(2) + item_count(2) + items`; each item is `type_id(2) +
//! length(2) + data(length)`.

use crate::codec::primitives::{decode_udint, decode_uint, encode_udint, encode_uint};
use crate::automata::SliceSource;
use crate::error::{CipError, Result};

pub const ITEM_NULL_ADDRESS: u16 = 0x0000;
pub const ITEM_CONNECTED_ADDRESS: u16 = 0x00A1;
pub const ITEM_UNCONNECTED_DATA: u16 = 0x00B2;
pub const ITEM_CONNECTED_DATA: u16 = 0x00B1;
pub const ITEM_LIST_IDENTITY: u16 = 0x000C;
pub const ITEM_LIST_SERVICES: u16 = 0x0100;
pub const ITEM_SOCKADDR_O_TO_T: u16 = 0x8000;
pub const ITEM_SOCKADDR_T_TO_O: u16 = 0x8001;

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub type_id: u16,
    pub data: Vec<u8>,
}

impl Item {
    pub fn new(type_id: u16, data: Vec<u8>) -> Self {
        Item { type_id, data }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommonPacketFormat {
    pub interface_handle: u32,
    pub timeout: u16,
    pub items: Vec<Item>,
}

impl CommonPacketFormat {
    pub fn new(items: Vec<Item>) -> Self {
        CommonPacketFormat {
            interface_handle: 0,
            timeout: 0,
            items,
        }
    }

    /// Convenience for the common "one address item, one data item" shape
    /// used by SendRRData requests carrying an Unconnected-Send.
    pub fn unconnected(data: Vec<u8>) -> Self {
        Self::new(vec![
            Item::new(ITEM_NULL_ADDRESS, Vec::new()),
            Item::new(ITEM_UNCONNECTED_DATA, data),
        ])
    }

    pub fn find(&self, type_id: u16) -> Option<&Item> {
        self.items.iter().find(|item| item.type_id == type_id)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(CipError::frame(0, "truncated CPF header"));
        }
        let mut src = SliceSource::new(bytes);
        let interface_handle = decode_udint(&mut src)?;
        let timeout = decode_uint(&mut src)?;
        let item_count = decode_uint(&mut src)? as usize;

        let mut offset = 8;
        let mut items = Vec::with_capacity(item_count);
        for _ in 0..item_count {
            let header = bytes
                .get(offset..offset + 4)
                .ok_or_else(|| CipError::frame(offset, "truncated CPF item header"))?;
            let mut hsrc = SliceSource::new(header);
            let type_id = decode_uint(&mut hsrc)?;
            let length = decode_uint(&mut hsrc)? as usize;
            offset += 4;
            let data = bytes
                .get(offset..offset + length)
                .ok_or_else(|| CipError::frame(offset, "truncated CPF item data"))?
                .to_vec();
            offset += length;
            items.push(Item::new(type_id, data));
        }

        Ok(CommonPacketFormat {
            interface_handle,
            timeout,
            items,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_udint(self.interface_handle, &mut out);
        encode_uint(self.timeout, &mut out);
        encode_uint(self.items.len() as u16, &mut out);
        for item in &self.items {
            encode_uint(item.type_id, &mut out);
            encode_uint(item.data.len() as u16, &mut out);
            out.extend_from_slice(&item.data);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_unconnected_send_shape() {
        let cpf = CommonPacketFormat::unconnected(vec![0x52, 0x01, 0x02]);
        let bytes = cpf.encode();
        let decoded = CommonPacketFormat::decode(&bytes).unwrap();
        assert_eq!(decoded, cpf);
        assert_eq!(
            decoded.find(ITEM_UNCONNECTED_DATA).unwrap().data,
            vec![0x52, 0x01, 0x02]
        );
    }

    #[test]
    fn decode_rejects_truncated_item_data() {
        let mut bytes = Vec::new();
        encode_udint(0, &mut bytes);
        encode_uint(0, &mut bytes);
        encode_uint(1, &mut bytes);
        encode_uint(ITEM_UNCONNECTED_DATA, &mut bytes);
        encode_uint(10, &mut bytes); // claims 10 bytes of data, none present
        assert!(CommonPacketFormat::decode(&bytes).is_err());
    }
}
