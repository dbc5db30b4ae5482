//! Names for inventory vectors, as used in logs.
//!
//! The `inv` and `getheaders` payloads are rust-bitcoin's
//! [`Inventory`] and [`GetHeadersMessage`](bitcoin::p2p::message_blockdata::GetHeadersMessage).
//! Dogecoin inherits the type numbers unchanged.

use bitcoin::p2p::message_blockdata::Inventory;

/// BIP 37 reply `merkleblock`, decoded as an unknown type by rust-bitcoin.
const FILTERED_BLOCK: u32 = 3;
/// BIP 144 filtered witness block.
const FILTERED_WITNESS_BLOCK: u32 = 0x4000_0003;

/// Short name of the kind of object `inv` refers to.
pub fn inventory_name(inv: &Inventory) -> &'static str {
    match inv {
        Inventory::Error | Inventory::Unknown { inv_type: 0, .. } => "error",
        Inventory::Transaction(_) => "tx",
        Inventory::Block(_) => "block",
        Inventory::Unknown {
            inv_type: FILTERED_BLOCK,
            ..
        } => "filtered-block",
        Inventory::CompactBlock(_) => "cmpct-block",
        Inventory::WTx(_) => "wtx",
        Inventory::WitnessTransaction(_) => "witness-tx",
        Inventory::WitnessBlock(_) => "witness-block",
        Inventory::Unknown {
            inv_type: FILTERED_WITNESS_BLOCK,
            ..
        } => "filtered-witness-block",
        Inventory::Unknown { .. } => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::consensus::encode::{deserialize, serialize};
    use bitcoin::hashes::Hash;
    use bitcoin::BlockHash;

    fn inv_bytes(inv_type: u32) -> Vec<u8> {
        let mut bytes = inv_type.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xab; 32]);
        bytes
    }

    #[test]
    fn test_names_of_decoded_vectors() {
        for (inv_type, name) in [
            (1, "tx"),
            (2, "block"),
            (3, "filtered-block"),
            (4, "cmpct-block"),
            (0x4000_0001, "witness-tx"),
            (0x4000_0002, "witness-block"),
            (0x4000_0003, "filtered-witness-block"),
            (99, "unknown"),
        ] {
            let inv: Inventory = deserialize(&inv_bytes(inv_type)).unwrap();
            assert_eq!(inventory_name(&inv), name, "type {inv_type:#x}");
        }
        assert_eq!(inventory_name(&Inventory::Error), "error");
    }

    #[test]
    fn test_inventory_list() {
        let inventory = vec![
            Inventory::Block(BlockHash::from_byte_array([1; 32])),
            Inventory::Unknown {
                inv_type: 99,
                hash: [2; 32],
            },
        ];
        let bytes = serialize(&inventory);
        assert_eq!(bytes.len(), 1 + 2 * 36);
        assert_eq!(deserialize::<Vec<Inventory>>(&bytes).unwrap(), inventory);
    }
}
