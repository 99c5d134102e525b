//! Minimal ABI encoding for static arguments.

use alloy_core::primitives::{Address, B256, Bytes};

use crate::plan::{ArgValue, Operation};

/// Encode the argument words, head only (every supported type is static).
fn encode_words(args: &[ArgValue]) -> Vec<u8> {
    args.iter().flat_map(|arg| arg.to_word().0).collect()
}

/// ABI-encode a call: 4-byte selector followed by one word per argument.
pub fn encode_call(operation: &Operation, args: &[ArgValue]) -> Bytes {
    let mut data = operation.selector().to_vec();
    data.extend(encode_words(args));
    data.into()
}

/// Creation data: contract bytecode followed by the encoded constructor arguments.
pub fn encode_creation(bytecode: &[u8], args: &[ArgValue]) -> Bytes {
    let mut data = bytecode.to_vec();
    data.extend(encode_words(args));
    data.into()
}

/// The first 32-byte word of call output.
pub fn first_word(output: &[u8]) -> Option<B256> {
    output.get(..32).map(B256::from_slice)
}

/// Decode the first output word as an address.
///
/// Fails if the 12 high bytes are not zero, which means the word is not an address.
pub fn decode_address(output: &[u8]) -> anyhow::Result<Address> {
    let word = first_word(output)
        .ok_or_else(|| anyhow::anyhow!("Call returned {} bytes, expected a word", output.len()))?;

    if word[..12].iter().any(|b| *b != 0) {
        anyhow::bail!("Returned word {} is not an address", word);
    }

    Ok(Address::from_word(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_transfer_ownership() {
        let to = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
            .parse::<Address>()
            .unwrap();
        let data = encode_call(
            &Operation::transact("transferOwnership(address)"),
            &[ArgValue::Address(to)],
        );

        assert_eq!(data.len(), 4 + 32);
        assert_eq!(
            hex::encode(&data),
            "f2fde38b00000000000000000000000070997970c51812dc3a010c7d01b50e0d17dc79c8"
        );
    }

    #[test]
    fn test_encode_creation_appends_args() {
        let data = encode_creation(&[0x60, 0x80], &[ArgValue::uint(432000), ArgValue::uint(432000)]);

        assert_eq!(data.len(), 2 + 64);
        assert_eq!(&data[..2], &[0x60, 0x80]);
        // 432000 = 0x069780
        assert_eq!(&data[31..34], &[0x06, 0x97, 0x80]);
    }

    #[test]
    fn test_decode_address() {
        let address = Address::with_last_byte(7);
        let output = address.into_word();
        assert_eq!(decode_address(output.as_slice()).unwrap(), address);

        assert!(decode_address(&[0u8; 16]).is_err());
        assert!(decode_address(B256::repeat_byte(0xff).as_slice()).is_err());
    }
}
