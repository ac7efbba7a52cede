use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::chain::Blockchain;
use super::crypto::{sha256_hex, verify_signature, Address, DigitalSignature, Wallet};

/// Errors that can occur when signing or validating a transaction
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Missing or empty field: {0}")]
    MissingField(&'static str),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: i64 },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Signing key does not match the sender address")]
    IdentityMismatch,
}

/// An intent to move value from one identity to another.
///
/// Constructed unsigned; once included in an appended block it is never
/// touched again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address
    pub from: Address,

    /// Recipient's address
    pub to: Address,

    /// Amount being transferred
    pub amount: u64,

    /// Flat fee collected into the block reward
    pub gas: u64,

    /// Signature over the transaction's signing digest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<DigitalSignature>,
}

impl Transaction {
    /// Creates a new unsigned transaction
    pub fn new(from: Address, to: Address, amount: u64, gas: u64) -> Self {
        Transaction {
            from,
            to,
            amount,
            gas,
            signature: None,
        }
    }

    /// Builds a transaction sent from `wallet`'s own address and signs it
    pub fn new_signed(wallet: &Wallet, to: Address, amount: u64, gas: u64) -> Self {
        let mut transaction = Self::new(wallet.address().clone(), to, amount, gas);
        transaction.signature = Some(wallet.sign(transaction.signing_digest().as_bytes()));
        transaction
    }

    /// The digest signed by the sender: SHA-256 over a JSON object of
    /// `from`, `to`, `amount` and `gas`. The JSON framing keeps field
    /// boundaries unambiguous.
    pub fn signing_digest(&self) -> String {
        let payload = serde_json::json!({
            "from": self.from.0,
            "to": self.to.0,
            "amount": self.amount,
            "gas": self.gas,
        });

        sha256_hex(payload.to_string().as_bytes())
    }

    /// Signs the transaction with a wallet
    ///
    /// Fails with `IdentityMismatch` when the wallet does not hold the
    /// sender's key; the transaction is left unsigned in that case.
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        if wallet.address() != &self.from {
            return Err(TransactionError::IdentityMismatch);
        }

        self.signature = Some(wallet.sign(self.signing_digest().as_bytes()));
        Ok(())
    }

    /// Whether this transaction originates from the ledger's mint authority
    pub fn is_mint(&self, mint_address: &Address) -> bool {
        &self.from == mint_address
    }

    /// Validates the transaction against the ledger's current state.
    ///
    /// Pure: no side effects on the transaction or the chain. Mint-origin
    /// transactions skip the balance check but must still carry a valid
    /// signature.
    pub fn validate(&self, chain: &Blockchain) -> Result<(), TransactionError> {
        if self.from.is_empty() {
            return Err(TransactionError::MissingField("from"));
        }
        if self.to.is_empty() {
            return Err(TransactionError::MissingField("to"));
        }
        if self.amount == 0 {
            return Err(TransactionError::MissingField("amount"));
        }

        if !self.is_mint(chain.mint_address()) {
            let required = self.amount.saturating_add(self.gas);
            let available = chain.balance_of(&self.from);

            if (available as i128) < required as i128 {
                return Err(TransactionError::InsufficientBalance {
                    required,
                    available,
                });
            }
        }

        let signature = self
            .signature
            .as_ref()
            .ok_or(TransactionError::InvalidSignature)?;
        let public_key = self
            .from
            .to_public_key()
            .map_err(|_| TransactionError::InvalidSignature)?;

        let verified = verify_signature(self.signing_digest().as_bytes(), signature, &public_key)
            .map_err(|_| TransactionError::InvalidSignature)?;

        if !verified {
            return Err(TransactionError::InvalidSignature);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::chain::ChainConfig;

    fn funded_chain() -> (Blockchain, Wallet) {
        let holder = Wallet::new();
        let config = ChainConfig::new(Wallet::new(), holder.address().clone());
        (Blockchain::new(config), holder)
    }

    #[test]
    fn test_sign_and_validate() {
        let (chain, holder) = funded_chain();
        let recipient = Wallet::new();

        let mut transaction =
            Transaction::new(holder.address().clone(), recipient.address().clone(), 100, 10);
        transaction.sign(&holder).unwrap();

        assert!(transaction.signature.is_some());
        assert!(transaction.validate(&chain).is_ok());
    }

    #[test]
    fn test_sign_with_foreign_wallet_is_rejected() {
        let (chain, holder) = funded_chain();
        let recipient = Wallet::new();
        let stranger = Wallet::new();

        let mut transaction =
            Transaction::new(holder.address().clone(), recipient.address().clone(), 100, 10);
        let result = transaction.sign(&stranger);

        assert!(matches!(result, Err(TransactionError::IdentityMismatch)));
        assert!(transaction.signature.is_none());

        // An unsigned transaction fails validation on its signature.
        assert!(matches!(
            transaction.validate(&chain),
            Err(TransactionError::InvalidSignature)
        ));
    }

    #[test]
    fn test_zero_amount_is_rejected() {
        let (chain, holder) = funded_chain();
        let recipient = Wallet::new();

        let mut transaction =
            Transaction::new(holder.address().clone(), recipient.address().clone(), 0, 10);
        transaction.sign(&holder).unwrap();

        assert!(matches!(
            transaction.validate(&chain),
            Err(TransactionError::MissingField("amount"))
        ));
    }

    #[test]
    fn test_empty_recipient_is_rejected() {
        let (chain, holder) = funded_chain();

        let mut transaction =
            Transaction::new(holder.address().clone(), Address(String::new()), 100, 0);
        transaction.sign(&holder).unwrap();

        assert!(matches!(
            transaction.validate(&chain),
            Err(TransactionError::MissingField("to"))
        ));
    }

    #[test]
    fn test_insufficient_balance_is_rejected() {
        let (chain, _) = funded_chain();
        let pauper = Wallet::new();
        let recipient = Wallet::new();

        let mut transaction =
            Transaction::new(pauper.address().clone(), recipient.address().clone(), 100, 10);
        transaction.sign(&pauper).unwrap();

        assert!(matches!(
            transaction.validate(&chain),
            Err(TransactionError::InsufficientBalance {
                required: 110,
                available: 0
            })
        ));
    }

    #[test]
    fn test_tampered_transaction_fails_validation() {
        let (chain, holder) = funded_chain();
        let recipient = Wallet::new();

        let mut transaction =
            Transaction::new(holder.address().clone(), recipient.address().clone(), 100, 10);
        transaction.sign(&holder).unwrap();

        transaction.amount = 1_000_000;

        assert!(matches!(
            transaction.validate(&chain),
            Err(TransactionError::InvalidSignature)
        ));
    }

    #[test]
    fn test_mint_transaction_skips_balance_check() {
        let holder = Wallet::new();
        let mint = Wallet::new();
        let chain = Blockchain::new(ChainConfig::new(mint.clone(), holder.address().clone()));

        // The mint never holds a positive replayed balance; issuance is
        // still valid as long as its signature checks out.
        let reward = Transaction::new_signed(&mint, holder.address().clone(), 297, 0);
        assert!(chain.balance_of(mint.address()) < 0);
        assert!(reward.validate(&chain).is_ok());
    }

    #[test]
    fn test_signing_digest_separates_fields() {
        let a = Wallet::new();
        let b = Wallet::new();

        // amount=1, gas=23 must not collide with amount=12, gas=3.
        let first = Transaction::new(a.address().clone(), b.address().clone(), 1, 23);
        let second = Transaction::new(a.address().clone(), b.address().clone(), 12, 3);

        assert_ne!(first.signing_digest(), second.signing_digest());
    }
}
