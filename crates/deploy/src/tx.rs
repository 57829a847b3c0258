//! Legacy (EIP-155) transaction encoding and local signing.

use std::fmt;

use alloy_core::{
    primitives::{Address, B256, Bytes, TxHash, U256, keccak256},
    rlp::{Encodable, Header},
};
use anyhow::Context;
use k256::ecdsa::{RecoveryId, Signature, SigningKey};

/// An unsigned legacy transaction. `to == None` creates a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub chain_id: u64,
}

impl LegacyTx {
    /// A contract-creation transaction carrying `initcode`.
    pub fn create(chain_id: u64, nonce: u64, gas_price: u128, gas_limit: u64, initcode: Bytes) -> Self {
        Self {
            nonce,
            gas_price,
            gas_limit,
            to: None,
            value: U256::ZERO,
            input: initcode,
            chain_id,
        }
    }

    /// RLP payload signed under EIP-155:
    /// `[nonce, gasPrice, gas, to, value, data, chainId, 0, 0]`.
    pub fn signing_payload(&self) -> Vec<u8> {
        let to = self.to_field();
        encode_list(&[
            &self.nonce,
            &self.gas_price,
            &self.gas_limit,
            &to,
            &self.value,
            &self.input,
            &self.chain_id,
            &0u8,
            &0u8,
        ])
    }

    pub fn signing_hash(&self) -> B256 {
        keccak256(self.signing_payload())
    }

    /// RLP of the signed transaction: `[nonce, gasPrice, gas, to, value, data, v, r, s]`.
    pub fn encode_signed(&self, v: u64, r: U256, s: U256) -> Vec<u8> {
        let to = self.to_field();
        encode_list(&[
            &self.nonce,
            &self.gas_price,
            &self.gas_limit,
            &to,
            &self.value,
            &self.input,
            &v,
            &r,
            &s,
        ])
    }

    fn to_field(&self) -> Bytes {
        match self.to {
            Some(address) => Bytes::copy_from_slice(address.as_slice()),
            None => Bytes::new(),
        }
    }
}

fn encode_list(fields: &[&dyn Encodable]) -> Vec<u8> {
    let payload_length: usize = fields.iter().map(|field| field.length()).sum();
    let mut out = Vec::with_capacity(payload_length + 9);
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    for field in fields {
        field.encode(&mut out);
    }
    out
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub raw: Bytes,
    pub hash: TxHash,
    pub from: Address,
}

/// A secp256k1 key held in memory for the duration of one deployment.
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl LocalSigner {
    /// Create a signer from a 32-byte private key as hex (with or without 0x prefix).
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, anyhow::Error> {
        let private_key_hex = private_key_hex.trim();
        let private_key_hex = private_key_hex
            .strip_prefix("0x")
            .unwrap_or(private_key_hex);

        // Decoding errors are reported without echoing the input.
        let private_key_bytes: [u8; 32] = hex::decode(private_key_hex)
            .map_err(|_| anyhow::anyhow!("Private key is not valid hex"))?
            .try_into()
            .map_err(|_| anyhow::anyhow!("Private key must be exactly 32 bytes"))?;

        let key = SigningKey::from_bytes(&private_key_bytes.into())
            .map_err(|e| anyhow::anyhow!("Invalid secp256k1 private key: {}", e))?;

        // Uncompressed point: 0x04 marker followed by the 64-byte public key.
        let public_key_point = key.verifying_key().to_encoded_point(false);
        let hash = keccak256(&public_key_point.as_bytes()[1..]);
        let address = Address::from_slice(&hash[12..]);

        Ok(Self { key, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte prehash, returning the signature and its recovery id.
    pub fn sign_hash(&self, hash: &B256) -> Result<(Signature, RecoveryId), anyhow::Error> {
        self.key
            .sign_prehash_recoverable(hash.as_slice())
            .context("Failed to sign transaction hash")
    }

    /// Sign `tx` under EIP-155 replay protection.
    pub fn sign(&self, tx: &LegacyTx) -> Result<SignedTx, anyhow::Error> {
        let (signature, recovery_id) = self.sign_hash(&tx.signing_hash())?;

        let bytes = signature.to_bytes();
        let r = U256::from_be_slice(&bytes[..32]);
        let s = U256::from_be_slice(&bytes[32..]);
        let v = u64::from(recovery_id.to_byte()) + 35 + 2 * tx.chain_id;

        let raw = Bytes::from(tx.encode_signed(v, r, s));
        let hash = keccak256(&raw);

        Ok(SignedTx {
            raw,
            hash,
            from: self.address,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;
    use k256::ecdsa::VerifyingKey;

    use super::*;

    const EIP155_KEY: &str = "0x4646464646464646464646464646464646464646464646464646464646464646";

    fn eip155_example() -> LegacyTx {
        LegacyTx {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: Some(address!("3535353535353535353535353535353535353535")),
            value: U256::from(1_000_000_000_000_000_000u128),
            input: Bytes::new(),
            chain_id: 1,
        }
    }

    #[test]
    fn test_eip155_signing_payload() {
        let tx = eip155_example();
        assert_eq!(
            hex::encode(tx.signing_payload()),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            hex::encode(tx.signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_address_from_private_key() {
        let signer = LocalSigner::from_private_key(EIP155_KEY).unwrap();
        assert_eq!(
            signer.address(),
            address!("9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F")
        );

        let unprefixed = LocalSigner::from_private_key(&EIP155_KEY[2..]).unwrap();
        assert_eq!(unprefixed.address(), signer.address());
    }

    #[test]
    fn test_signature_recovers_signer() {
        let signer = LocalSigner::from_private_key(EIP155_KEY).unwrap();
        let tx = LegacyTx::create(31337, 0, 1_000_000_000, 500_000, Bytes::from(vec![0x60, 0x00]));
        let hash = tx.signing_hash();

        let (signature, recovery_id) = signer.sign_hash(&hash).unwrap();
        let recovered =
            VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id).unwrap();
        assert_eq!(&recovered, signer.key.verifying_key());
    }

    #[test]
    fn test_signed_tx_uses_eip155_v() {
        let signer = LocalSigner::from_private_key(EIP155_KEY).unwrap();
        let signed = signer.sign(&eip155_example()).unwrap();

        // Chain id 1: v is 37 or 38, encoded as a single byte right after the empty data field.
        let raw = hex::encode(&signed.raw);
        assert!(raw.starts_with("f86c098504a817c80082520894"));
        assert!(raw.contains("880de0b6b3a76400008025a0") || raw.contains("880de0b6b3a76400008026a0"));
        assert_eq!(signed.hash, keccak256(&signed.raw));
        assert_eq!(signed.from, signer.address());
    }

    #[test]
    fn test_creation_tx_has_empty_to() {
        let tx = LegacyTx::create(1, 0, 1, 21_000, Bytes::from(vec![0xfe]));
        let payload = tx.signing_payload();
        // nonce 0 (0x80), gas price 1 (0x01), gas 21000 (0x825208), empty to (0x80)
        assert_eq!(&payload[1..7], &[0x80, 0x01, 0x82, 0x52, 0x08, 0x80]);
    }

    #[test]
    fn test_invalid_private_keys() {
        assert!(LocalSigner::from_private_key("0x1234").is_err());
        assert!(LocalSigner::from_private_key("not hex at all").is_err());
        assert!(LocalSigner::from_private_key(&"00".repeat(32)).is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = LocalSigner::from_private_key(EIP155_KEY).unwrap();
        let debug = format!("{:?}", signer);
        assert!(!debug.contains("4646464646"));
    }
}
