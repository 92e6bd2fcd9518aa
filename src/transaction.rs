use serde::{Deserialize, Serialize};
use chrono::Utc;
use log::debug;
use rsa::RsaPublicKey;

use crate::{Result, LedgerError, utils, crypto::KeyPair, FEE_RATE, NATIVE_ASSET, NETWORK_SENDER};

/// Transaction kinds
///
/// Reward transactions, user transfers, and the two legs of a cross-shard
/// settlement share one structure but differ in validation rules, so the
/// kind is carried explicitly.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Regular value transfer between two addresses on any shard pair
    #[default]
    Transfer,
    /// Mining subsidy from the reserved network identity
    Reward,
    /// Source-shard leg of a cross-shard settlement
    CrossShardDebit,
    /// Destination-shard leg of a cross-shard settlement
    CrossShardCredit,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Transfer => write!(f, "transfer"),
            TransactionKind::Reward => write!(f, "reward"),
            TransactionKind::CrossShardDebit => write!(f, "cross-shard debit"),
            TransactionKind::CrossShardCredit => write!(f, "cross-shard credit"),
        }
    }
}

/// A signed value transfer
///
/// The content hash covers (sender, recipient, amount, asset, timestamp, fee)
/// with the signature field fixed to the empty string; the kind tag and the
/// attached signature never feed the digest. A transaction is immutable once
/// signed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Validation path for this transaction
    #[serde(default)]
    pub kind: TransactionKind,
    /// Address of the sender
    pub sender: String,
    /// Address of the recipient
    pub recipient: String,
    /// Amount being transferred
    pub amount: f64,
    /// Asset identifier, defaulted to the native token
    pub asset: String,
    /// Unix timestamp (seconds) stamped at creation
    pub timestamp: i64,
    /// Fee, fixed at 1% of the amount by policy
    pub fee: f64,
    /// Detached PSS signature over the content hash, lowercase hex.
    /// Empty until `sign` is called.
    #[serde(default)]
    pub signature: String,
}

impl Transaction {
    /// Create a new transfer of the native asset
    ///
    /// # Arguments
    /// * `sender` - The sender's address
    /// * `recipient` - The recipient's address
    /// * `amount` - The amount to transfer
    ///
    /// # Example
    /// ```
    /// use qfc::transaction::Transaction;
    ///
    /// let tx = Transaction::new("a1f3".to_string(), "b2c4".to_string(), 10.0).unwrap();
    /// assert_eq!(tx.asset, "QFC");
    /// assert!((tx.fee - 0.1).abs() < 1e-9);
    /// ```
    pub fn new(sender: String, recipient: String, amount: f64) -> Result<Self> {
        Self::new_with_asset(sender, recipient, amount, NATIVE_ASSET.to_string())
    }

    /// Create a new transfer of an arbitrary asset
    pub fn new_with_asset(
        sender: String,
        recipient: String,
        amount: f64,
        asset: String,
    ) -> Result<Self> {
        if sender.is_empty() || recipient.is_empty() {
            return Err(LedgerError::TransactionValidationFailed(
                "Sender and recipient addresses cannot be empty".to_string(),
            ));
        }

        if sender == recipient {
            return Err(LedgerError::TransactionValidationFailed(
                "Sender and recipient cannot be the same".to_string(),
            ));
        }

        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::TransactionValidationFailed(
                "Transaction amount must be positive".to_string(),
            ));
        }

        let transaction = Transaction {
            kind: TransactionKind::Transfer,
            sender,
            recipient,
            amount,
            asset,
            timestamp: Utc::now().timestamp(),
            fee: amount * FEE_RATE,
            signature: String::new(),
        };

        debug!("Created transfer {}", transaction.short_hash());
        Ok(transaction)
    }

    /// Create a mining subsidy from the reserved network identity
    ///
    /// Reward transactions are never signed; intake skips signature and
    /// balance checks for them.
    pub fn reward(miner: String, amount: f64) -> Result<Self> {
        if miner.is_empty() {
            return Err(LedgerError::TransactionValidationFailed(
                "Miner address cannot be empty".to_string(),
            ));
        }

        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::TransactionValidationFailed(
                "Reward amount must be positive".to_string(),
            ));
        }

        Ok(Transaction {
            kind: TransactionKind::Reward,
            sender: NETWORK_SENDER.to_string(),
            recipient: miner,
            amount,
            asset: NATIVE_ASSET.to_string(),
            timestamp: Utc::now().timestamp(),
            fee: amount * FEE_RATE,
            signature: String::new(),
        })
    }

    /// Clone this transaction as one leg of a cross-shard settlement
    ///
    /// The content hash is unchanged, so both legs of a settlement are
    /// identifiable as the same transfer.
    pub fn leg(&self, kind: TransactionKind) -> Transaction {
        let mut leg = self.clone();
        leg.kind = kind;
        leg
    }

    /// The canonical signing payload: every content field plus an empty
    /// signature slot, key-sorted.
    fn signing_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "sender": self.sender,
            "recipient": self.recipient,
            "amount": self.amount,
            "asset": self.asset,
            "timestamp": self.timestamp,
            "fee": self.fee,
            "signature": "",
        })
    }

    /// Content digest over the canonical encoding, hex-encoded
    ///
    /// Two transactions hash equal exactly when (sender, recipient, amount,
    /// asset, timestamp, fee) are equal.
    pub fn calculate_hash(&self) -> String {
        utils::calculate_hash(self.signing_payload().to_string())
    }

    /// First 8 hex characters of the content hash, for logs and display
    pub fn short_hash(&self) -> String {
        self.calculate_hash()[..8].to_string()
    }

    /// Sign the content digest and attach the signature
    ///
    /// Signing is the terminal state transition: a signed transaction cannot
    /// be signed again.
    ///
    /// # Example
    /// ```
    /// use qfc::transaction::Transaction;
    /// use qfc::crypto::KeyPair;
    ///
    /// let keypair = KeyPair::generate().unwrap();
    /// let mut tx = Transaction::new("a1".to_string(), "b2".to_string(), 5.0).unwrap();
    /// tx.sign(&keypair).unwrap();
    /// assert!(tx.verify(keypair.public_key()));
    /// ```
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<()> {
        if !self.signature.is_empty() {
            return Err(LedgerError::TransactionValidationFailed(
                "Transaction is already signed".to_string(),
            ));
        }

        let digest = utils::hex_to_bytes(&self.calculate_hash())?;
        let signature = keypair.sign(&digest)?;
        self.signature = utils::bytes_to_hex(&signature);

        debug!("Signed transaction {}", self.short_hash());
        Ok(())
    }

    /// Verify the attached signature against the content digest
    ///
    /// Returns `false` for unsigned transactions, malformed signature
    /// encodings, and signatures that do not verify under the given key.
    pub fn verify(&self, public_key: &RsaPublicKey) -> bool {
        if self.signature.is_empty() {
            return false;
        }

        let digest = match utils::hex_to_bytes(&self.calculate_hash()) {
            Ok(digest) => digest,
            Err(_) => return false,
        };
        let signature = match utils::hex_to_bytes(&self.signature) {
            Ok(signature) => signature,
            Err(_) => return false,
        };

        crate::crypto::verify(public_key, &digest, &signature)
    }

    /// Amount plus fee: what the sender's balance must cover
    pub fn total_cost(&self) -> f64 {
        self.amount + self.fee
    }

    /// Whether this is a subsidy from the reserved network identity
    pub fn is_reward(&self) -> bool {
        self.sender == NETWORK_SENDER
    }

    /// Whether this is one leg of a cross-shard settlement
    pub fn is_cross_shard_leg(&self) -> bool {
        matches!(
            self.kind,
            TransactionKind::CrossShardDebit | TransactionKind::CrossShardCredit
        )
    }

    /// Validate the transaction fields on entry
    pub fn validate(&self) -> Result<()> {
        if self.sender.is_empty() || self.recipient.is_empty() {
            return Err(LedgerError::TransactionValidationFailed(
                "Invalid addresses".to_string(),
            ));
        }

        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(LedgerError::TransactionValidationFailed(
                "Transaction amount must be positive".to_string(),
            ));
        }

        if self.asset.is_empty() {
            return Err(LedgerError::UnknownAsset(self.asset.clone()));
        }

        Ok(())
    }

    /// Key-sorted JSON wire encoding
    pub fn to_json(&self) -> Result<String> {
        utils::canonical_json(self)
    }

    /// Parse a transaction from its wire encoding, validating on entry
    pub fn from_json(json: &str) -> Result<Self> {
        let transaction: Transaction = serde_json::from_str(json)?;
        transaction.validate()?;
        Ok(transaction)
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> {}: {} {} ({})",
            self.short_hash(),
            self.sender,
            self.recipient,
            self.amount,
            self.asset,
            self.kind
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn test_keypair() -> &'static KeyPair {
        static KEYPAIR: OnceLock<KeyPair> = OnceLock::new();
        KEYPAIR.get_or_init(|| KeyPair::generate().unwrap())
    }

    #[test]
    fn test_transaction_creation() {
        let tx = Transaction::new("a1f3".to_string(), "b2c4".to_string(), 100.0).unwrap();

        assert_eq!(tx.sender, "a1f3");
        assert_eq!(tx.recipient, "b2c4");
        assert_eq!(tx.amount, 100.0);
        assert_eq!(tx.asset, NATIVE_ASSET);
        assert_eq!(tx.kind, TransactionKind::Transfer);
        assert!(tx.signature.is_empty());
        assert!((tx.fee - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_total_cost_is_amount_plus_fee() {
        let tx = Transaction::new("a1".to_string(), "b2".to_string(), 10.0).unwrap();
        assert!((tx.total_cost() - 10.1).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_amounts_rejected() {
        assert!(Transaction::new("a1".to_string(), "b2".to_string(), 0.0).is_err());
        assert!(Transaction::new("a1".to_string(), "b2".to_string(), -5.0).is_err());
        assert!(Transaction::new("a1".to_string(), "b2".to_string(), f64::NAN).is_err());
    }

    #[test]
    fn test_empty_and_self_addresses_rejected() {
        assert!(Transaction::new(String::new(), "b2".to_string(), 1.0).is_err());
        assert!(Transaction::new("a1".to_string(), String::new(), 1.0).is_err());
        assert!(Transaction::new("a1".to_string(), "a1".to_string(), 1.0).is_err());
    }

    #[test]
    fn test_content_addressing() {
        let mut a = Transaction::new("a1".to_string(), "b2".to_string(), 10.0).unwrap();
        let mut b = Transaction::new("a1".to_string(), "b2".to_string(), 10.0).unwrap();
        a.timestamp = 1_700_000_000;
        b.timestamp = 1_700_000_000;
        assert_eq!(a.calculate_hash(), b.calculate_hash());

        b.amount = 11.0;
        assert_ne!(a.calculate_hash(), b.calculate_hash());
    }

    #[test]
    fn test_hash_ignores_signature_and_kind() {
        let mut tx = Transaction::new("a1".to_string(), "b2".to_string(), 10.0).unwrap();
        let before = tx.calculate_hash();

        tx.sign(test_keypair()).unwrap();
        assert_eq!(tx.calculate_hash(), before);
        assert_eq!(tx.leg(TransactionKind::CrossShardDebit).calculate_hash(), before);
    }

    #[test]
    fn test_sign_and_verify_round_trip() {
        let mut tx = Transaction::new("a1".to_string(), "b2".to_string(), 10.0).unwrap();
        tx.sign(test_keypair()).unwrap();

        assert!(!tx.signature.is_empty());
        assert!(tx.verify(test_keypair().public_key()));
    }

    #[test]
    fn test_verify_with_foreign_key_fails() {
        let mut tx = Transaction::new("a1".to_string(), "b2".to_string(), 10.0).unwrap();
        tx.sign(test_keypair()).unwrap();

        let other = KeyPair::generate().unwrap();
        assert!(!tx.verify(other.public_key()));
    }

    #[test]
    fn test_unsigned_never_verifies() {
        let tx = Transaction::new("a1".to_string(), "b2".to_string(), 10.0).unwrap();
        assert!(!tx.verify(test_keypair().public_key()));
    }

    #[test]
    fn test_double_sign_rejected() {
        let mut tx = Transaction::new("a1".to_string(), "b2".to_string(), 10.0).unwrap();
        tx.sign(test_keypair()).unwrap();
        assert!(tx.sign(test_keypair()).is_err());
    }

    #[test]
    fn test_reward_transaction() {
        let tx = Transaction::reward("c3aa".to_string(), 50.0).unwrap();

        assert_eq!(tx.kind, TransactionKind::Reward);
        assert_eq!(tx.sender, NETWORK_SENDER);
        assert!(tx.is_reward());
        assert!(tx.signature.is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let mut tx = Transaction::new("a1".to_string(), "b2".to_string(), 10.0).unwrap();
        tx.sign(test_keypair()).unwrap();

        let json = tx.to_json().unwrap();
        let parsed = Transaction::from_json(&json).unwrap();
        assert_eq!(tx, parsed);
    }
}
