//! Ledger transactions: transfers, data payloads and multisig authorization.

use crate::crypto::key_pair::{PrivateKey, verify};
use crate::types::account_id::AccountId;
use crate::types::bytes::Bytes;
use crate::types::encoding::{Encode, EncodeSink};
use crate::types::hash::Hash;
use std::collections::{BTreeSet, HashSet};
use syncledger_derive::BinaryCodec;

/// Payload type used when the caller does not name one.
pub const DEFAULT_DATA_TYPE: &str = "generic";

/// One leg of a batch transfer.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct BatchEntry {
    pub to: AccountId,
    pub amount: u128,
}

impl BatchEntry {
    pub fn new(to: impl Into<AccountId>, amount: u128) -> Self {
        Self {
            to: to.into(),
            amount,
        }
    }
}

/// What a transaction moves.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub enum Transfer {
    /// Value to one receiver. An amount of zero makes it data-only.
    Single { to: AccountId, amount: u128 },
    /// Several receivers funded by a single debit of the sender.
    Batch(Vec<BatchEntry>),
    /// No value moves; only the fee is charged.
    Data,
}

impl Transfer {
    /// Sum of transferred amounts, `None` on overflow.
    pub fn total_amount(&self) -> Option<u128> {
        match self {
            Transfer::Single { amount, .. } => Some(*amount),
            Transfer::Batch(entries) => entries
                .iter()
                .try_fold(0u128, |acc, e| acc.checked_add(e.amount)),
            Transfer::Data => Some(0),
        }
    }

    /// Accounts credited by this transfer.
    pub fn recipients(&self) -> Vec<&AccountId> {
        match self {
            Transfer::Single { to, amount } if *amount > 0 => vec![to],
            Transfer::Single { .. } | Transfer::Data => Vec::new(),
            Transfer::Batch(entries) => entries.iter().map(|e| &e.to).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct SignatureEntry {
    pub public_key: Bytes,
    pub signature: Bytes,
}

/// Threshold authorization attached to a transaction.
///
/// `authorized_keys` is a sorted set, so two transactions declaring the same
/// keys in a different order encode identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, BinaryCodec)]
pub struct Multisig {
    pub authorized_keys: BTreeSet<Bytes>,
    pub required_signatures: u32,
    pub signatures: Vec<SignatureEntry>,
}

impl Multisig {
    pub fn new(authorized_keys: impl IntoIterator<Item = Bytes>, required_signatures: u32) -> Self {
        Self {
            authorized_keys: authorized_keys.into_iter().collect(),
            required_signatures,
            signatures: Vec::new(),
        }
    }

    /// A threshold that no key set can satisfy.
    pub fn is_malformed(&self) -> bool {
        self.required_signatures as usize > self.authorized_keys.len()
    }

    /// Shallow admission check: enough signatures are declared.
    pub fn declares_threshold(&self) -> bool {
        self.signatures.len() >= self.required_signatures as usize
    }

    /// Counts distinct authorized keys with a valid signature over `message`.
    ///
    /// Signers outside `authorized_keys`, bad signatures and repeat
    /// submissions from an already credited key are ignored.
    pub fn valid_signers(&self, message: &[u8]) -> usize {
        let mut credited: HashSet<&Bytes> = HashSet::new();
        for entry in &self.signatures {
            if credited.contains(&entry.public_key)
                || !self.authorized_keys.contains(&entry.public_key)
            {
                continue;
            }
            if verify(&entry.public_key, message, &entry.signature) {
                credited.insert(&entry.public_key);
            }
        }
        credited.len()
    }
}

/// A ledger transaction.
///
/// The `id` is assigned once at construction and covered by both the Merkle
/// leaf and the multisig signing message.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct Transaction {
    pub id: Hash,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub from: AccountId,
    pub transfer: Transfer,
    pub fee: u128,
    pub data_type: String,
    pub data: Bytes,
    pub multisig: Option<Multisig>,
}

impl Transaction {
    pub fn builder(from: impl Into<AccountId>, transfer: Transfer) -> TransactionBuilder {
        TransactionBuilder::new(from.into(), transfer)
    }

    /// Reward issuance to `miner`. Carries no fee.
    pub fn reward(miner: AccountId, amount: u128, timestamp: u64, salt: u64) -> Self {
        Self::builder(
            AccountId::issuer(),
            Transfer::Single { to: miner, amount },
        )
        .data_type("reward")
        .timestamp(timestamp)
        .salt(salt)
        .build()
    }

    /// Derives a transaction id from its identifying parts.
    pub fn derive_id(timestamp: u64, from: &AccountId, transfer: &Transfer, salt: u64) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"TXID");
        timestamp.encode(&mut h);
        from.encode(&mut h);
        transfer.encode(&mut h);
        salt.encode(&mut h);
        h.finalize()
    }

    pub fn is_reward(&self) -> bool {
        self.from.is_issuer()
    }

    /// Amounts plus fee, `None` on overflow.
    pub fn total_debit(&self) -> Option<u128> {
        self.transfer.total_amount()?.checked_add(self.fee)
    }

    /// Canonical encoding with multisig signatures stripped.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_unsigned(&mut out);
        out
    }

    fn encode_unsigned<S: EncodeSink>(&self, out: &mut S) {
        out.write(b"TX");
        self.id.encode(out);
        self.timestamp.encode(out);
        self.from.encode(out);
        self.transfer.encode(out);
        self.fee.encode(out);
        self.data_type.encode(out);
        self.data.encode(out);
        match &self.multisig {
            Some(m) => {
                true.encode(out);
                m.authorized_keys.encode(out);
                m.required_signatures.encode(out);
            }
            None => false.encode(out),
        }
    }

    /// Adds `key`'s signature over [`signing_bytes`](Self::signing_bytes).
    ///
    /// Returns `false` if the transaction carries no multisig declaration.
    pub fn sign_multisig(&mut self, key: &PrivateKey) -> bool {
        let message = self.signing_bytes();
        let Some(multisig) = self.multisig.as_mut() else {
            return false;
        };
        multisig.signatures.push(SignatureEntry {
            public_key: key.public_key(),
            signature: key.sign(&message),
        });
        true
    }

    /// Full authorization predicate.
    ///
    /// Transactions without multisig, with a zero threshold or with an empty
    /// key set pass trivially.
    pub fn verify_authorization(&self) -> bool {
        let Some(multisig) = &self.multisig else {
            return true;
        };
        if multisig.required_signatures == 0 || multisig.authorized_keys.is_empty() {
            return true;
        }
        multisig.valid_signers(&self.signing_bytes()) >= multisig.required_signatures as usize
    }
}

/// Builder for [`Transaction`]. The id is derived in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    from: AccountId,
    transfer: Transfer,
    fee: u128,
    data_type: String,
    data: Bytes,
    multisig: Option<Multisig>,
    timestamp: Option<u64>,
    salt: u64,
}

impl TransactionBuilder {
    fn new(from: AccountId, transfer: Transfer) -> Self {
        Self {
            from,
            transfer,
            fee: 0,
            data_type: DEFAULT_DATA_TYPE.to_string(),
            data: Bytes::default(),
            multisig: None,
            timestamp: None,
            salt: 0,
        }
    }

    pub fn fee(mut self, fee: u128) -> Self {
        self.fee = fee;
        self
    }

    pub fn data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    pub fn data(mut self, data_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.data_type = data_type.into();
        self.data = data.into();
        self
    }

    pub fn multisig(mut self, authorized_keys: impl IntoIterator<Item = Bytes>, required: u32) -> Self {
        self.multisig = Some(Multisig::new(authorized_keys, required));
        self
    }

    /// Attaches a complete multisig record, signatures included.
    pub fn multisig_record(mut self, multisig: Multisig) -> Self {
        self.multisig = Some(multisig);
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Disambiguates otherwise identical transactions in the id derivation.
    pub fn salt(mut self, salt: u64) -> Self {
        self.salt = salt;
        self
    }

    pub fn build(self) -> Transaction {
        let timestamp = self.timestamp.unwrap_or_else(unix_now);
        Transaction {
            id: Transaction::derive_id(timestamp, &self.from, &self.transfer, self.salt),
            timestamp,
            from: self.from,
            transfer: self.transfer,
            fee: self.fee,
            data_type: self.data_type,
            data: self.data,
            multisig: self.multisig,
        }
    }
}

/// Current wall-clock time in whole seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::Decode;

    fn transfer(to: &str, amount: u128) -> Transfer {
        Transfer::Single {
            to: AccountId::from(to),
            amount,
        }
    }

    fn multisig_tx(keys: &[&PrivateKey], required: u32) -> Transaction {
        Transaction::builder("treasury", transfer("bob", 10))
            .fee(1)
            .timestamp(1_700_000_000)
            .multisig(keys.iter().map(|k| k.public_key()), required)
            .build()
    }

    #[test]
    fn id_depends_on_salt() {
        let a = Transaction::builder("alice", transfer("bob", 1))
            .timestamp(1)
            .build();
        let b = Transaction::builder("alice", transfer("bob", 1))
            .timestamp(1)
            .salt(1)
            .build();
        assert_ne!(a.id, b.id);
        assert_eq!(
            a.id,
            Transaction::derive_id(1, &AccountId::from("alice"), &transfer("bob", 1), 0)
        );
    }

    #[test]
    fn total_debit_sums_batch_and_fee() {
        let tx = Transaction::builder(
            "alice",
            Transfer::Batch(vec![BatchEntry::new("bob", 10), BatchEntry::new("carol", 15)]),
        )
        .fee(2)
        .build();
        assert_eq!(tx.total_debit(), Some(27));
    }

    #[test]
    fn total_debit_overflow_is_none() {
        let tx = Transaction::builder(
            "alice",
            Transfer::Batch(vec![BatchEntry::new("bob", u128::MAX), BatchEntry::new("carol", 1)]),
        )
        .build();
        assert_eq!(tx.total_debit(), None);
    }

    #[test]
    fn data_only_recipients_are_empty() {
        assert!(transfer("bob", 0).recipients().is_empty());
        assert!(Transfer::Data.recipients().is_empty());
        assert_eq!(transfer("bob", 3).recipients().len(), 1);
    }

    #[test]
    fn without_multisig_passes() {
        let tx = Transaction::builder("alice", transfer("bob", 1)).build();
        assert!(tx.verify_authorization());
    }

    #[test]
    fn threshold_met_by_distinct_keys() {
        let (k1, k2, k3) = (PrivateKey::new(), PrivateKey::new(), PrivateKey::new());
        let mut tx = multisig_tx(&[&k1, &k2, &k3], 2);

        assert!(tx.sign_multisig(&k1));
        assert!(!tx.verify_authorization());
        assert!(tx.sign_multisig(&k3));
        assert!(tx.verify_authorization());
    }

    #[test]
    fn duplicate_signer_counts_once() {
        let (k1, k2) = (PrivateKey::new(), PrivateKey::new());
        let mut tx = multisig_tx(&[&k1, &k2], 2);

        tx.sign_multisig(&k1);
        tx.sign_multisig(&k1);
        let multisig = tx.multisig.as_ref().unwrap();
        assert!(multisig.declares_threshold());
        assert_eq!(multisig.valid_signers(&tx.signing_bytes()), 1);
        assert!(!tx.verify_authorization());
    }

    #[test]
    fn unauthorized_signer_never_counts() {
        let (k1, k2, outsider) = (PrivateKey::new(), PrivateKey::new(), PrivateKey::new());
        let mut tx = multisig_tx(&[&k1, &k2], 2);

        tx.sign_multisig(&k1);
        tx.sign_multisig(&outsider);
        assert!(!tx.verify_authorization());
    }

    #[test]
    fn signatures_do_not_change_signing_bytes() {
        let k1 = PrivateKey::new();
        let mut tx = multisig_tx(&[&k1], 1);
        let before = tx.signing_bytes();
        tx.sign_multisig(&k1);
        assert_eq!(before, tx.signing_bytes());
    }

    #[test]
    fn tampering_breaks_signatures() {
        let k1 = PrivateKey::new();
        let mut tx = multisig_tx(&[&k1], 1);
        tx.sign_multisig(&k1);
        assert!(tx.verify_authorization());

        tx.fee = 0;
        assert!(!tx.verify_authorization());
    }

    #[test]
    fn forged_signature_is_ignored() {
        let k1 = PrivateKey::new();
        let mut tx = multisig_tx(&[&k1], 1);
        if let Some(m) = tx.multisig.as_mut() {
            m.signatures.push(SignatureEntry {
                public_key: k1.public_key(),
                signature: Bytes::new([7u8; 64]),
            });
        }
        assert!(!tx.verify_authorization());
    }

    #[test]
    fn zero_threshold_passes_trivially() {
        let k1 = PrivateKey::new();
        let tx = multisig_tx(&[&k1], 0);
        assert!(tx.verify_authorization());
    }

    #[test]
    fn sign_without_multisig_is_refused() {
        let mut tx = Transaction::builder("alice", transfer("bob", 1)).build();
        assert!(!tx.sign_multisig(&PrivateKey::new()));
    }

    #[test]
    fn malformed_threshold_is_detected() {
        let k1 = PrivateKey::new();
        let tx = multisig_tx(&[&k1], 2);
        assert!(tx.multisig.unwrap().is_malformed());
    }

    #[test]
    fn authorized_key_order_does_not_affect_encoding() {
        let (k1, k2) = (PrivateKey::new(), PrivateKey::new());
        let a = multisig_tx(&[&k1, &k2], 1);
        let b = multisig_tx(&[&k2, &k1], 1);
        assert_eq!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn decodes_what_it_encodes() {
        let k1 = PrivateKey::new();
        let mut tx = multisig_tx(&[&k1], 1);
        tx.sign_multisig(&k1);
        let decoded = Transaction::from_bytes(&tx.to_bytes()).unwrap();
        assert_eq!(decoded, tx);
        assert!(decoded.verify_authorization());
    }

    #[test]
    fn reward_comes_from_issuer() {
        let tx = Transaction::reward(AccountId::from("miner"), 50, 10, 3);
        assert!(tx.is_reward());
        assert_eq!(tx.fee, 0);
        assert_eq!(tx.total_debit(), Some(50));
    }
}
