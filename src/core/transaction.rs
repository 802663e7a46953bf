// Transactions follow the UTXO model: each input claims exactly one earlier output,
// and each output locks a value to a public key hash until some later input spends it.

use crate::core::{Blockchain, BLOCK_REWARD};
use crate::error::{BlockchainError, Result};
use crate::utils::{
    deserialize, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, serialize,
    sha256_digest,
};
use crate::wallet::{hash_pub_key, pub_key_hash_from_address, validate_address, Wallets};
use data_encoding::HEXLOWER;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

const SUBSIDY: u64 = BLOCK_REWARD;

/// Output index carried by the single input of a coinbase transaction.
pub const COINBASE_VOUT: i64 = -1;

/// Prior transactions keyed by id, as needed by [`Transaction::sign`] and
/// [`Transaction::verify`].
pub type PrevTransactions = HashMap<Vec<u8>, Transaction>;

#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: i64,
    signature: Vec<u8>,
    // Raw X || Y of the spender. In a coinbase this carries the free-text note.
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> i64 {
        self.vout
    }

    /// The referenced output index, or `None` for the coinbase sentinel.
    pub fn output_index(&self) -> Option<usize> {
        usize::try_from(self.vout).ok()
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        hash_pub_key(self.pub_key.as_slice()).eq(pub_key_hash)
    }

    #[cfg(test)]
    pub(crate) fn signature_mut(&mut self) -> &mut Vec<u8> {
        &mut self.signature
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        if value == 0 {
            return Err(BlockchainError::InvalidTransaction(
                "Output value must be positive".to_string(),
            ));
        }

        let mut output = TXOutput {
            value,
            pub_key_hash: vec![],
        };
        output.lock(address)?;
        Ok(output)
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    fn lock(&mut self, address: &str) -> Result<()> {
        self.pub_key_hash = pub_key_hash_from_address(address)?;
        Ok(())
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Mints the block reward to `to`, with `note` stored in the input's key field.
    ///
    /// The signature field is never checked for a coinbase; it holds random bytes so
    /// two rewards to the same address with the same note still get distinct ids.
    pub fn new_coinbase_tx(to: &str, note: &str) -> Result<Transaction> {
        let txout = TXOutput::new(SUBSIDY, to)?;
        let tx_input = TXInput {
            txid: vec![],
            vout: COINBASE_VOUT,
            signature: Uuid::new_v4().as_bytes().to_vec(),
            pub_key: note.as_bytes().to_vec(),
        };

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![txout],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Builds, identifies and signs a transfer of `amount` from `from` to `to`.
    pub fn new_utxo_transaction(
        from: &str,
        to: &str,
        amount: u64,
        wallets: &Wallets,
        blockchain: &Blockchain,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::InvalidTransaction(
                "Amount must be positive".to_string(),
            ));
        }
        if !validate_address(from) {
            return Err(BlockchainError::InvalidAddress(format!(
                "Invalid from address: {from}"
            )));
        }
        if !validate_address(to) {
            return Err(BlockchainError::InvalidAddress(format!(
                "Invalid to address: {to}"
            )));
        }

        let wallet = wallets
            .get_wallet(from)
            .ok_or_else(|| BlockchainError::WalletNotFound(from.to_string()))?;
        let public_key_hash = hash_pub_key(wallet.get_public_key());

        let (accumulated, valid_outputs) =
            blockchain.find_spendable_outputs(public_key_hash.as_slice(), amount)?;
        if accumulated < amount {
            return Err(BlockchainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        // When I spend more than I send, the change output goes back to `from`
        let mut tx = Self::build_unsigned(
            wallet.get_public_key(),
            from,
            to,
            amount,
            accumulated,
            &valid_outputs,
        )?;
        blockchain.sign_transaction(&mut tx, wallet.get_pkcs8())?;
        Ok(tx)
    }

    /// Assembles an unsigned transfer spending `spendable` (txid, output index) pairs
    /// worth `accumulated` in total. Any excess over `amount` goes back to `from`.
    pub fn build_unsigned(
        public_key: &[u8],
        from: &str,
        to: &str,
        amount: u64,
        accumulated: u64,
        spendable: &[(Vec<u8>, usize)],
    ) -> Result<Transaction> {
        if accumulated < amount {
            return Err(BlockchainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }
        if spendable.is_empty() {
            return Err(BlockchainError::InvalidTransaction(
                "Transfer must spend at least one output".to_string(),
            ));
        }

        let inputs = spendable
            .iter()
            .map(|(txid, out)| TXInput {
                txid: txid.clone(),
                vout: *out as i64,
                signature: vec![],
                pub_key: public_key.to_vec(),
            })
            .collect();

        let mut outputs = vec![TXOutput::new(amount, to)?];
        if accumulated > amount {
            outputs.push(TXOutput::new(accumulated - amount, from)?);
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .vin
            .iter()
            .map(|input| TXInput {
                txid: input.txid.clone(),
                vout: input.vout,
                signature: vec![],
                pub_key: vec![],
            })
            .collect();
        Transaction {
            id: self.id.clone(),
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    fn referenced_output<'a>(
        input: &TXInput,
        prev_txs: &'a PrevTransactions,
    ) -> Result<&'a TXOutput> {
        let txid_hex = HEXLOWER.encode(input.get_txid());
        let prev_tx = prev_txs
            .get(input.get_txid())
            .ok_or_else(|| BlockchainError::TransactionNotFound(txid_hex.clone()))?;
        let index = input.output_index().ok_or_else(|| {
            BlockchainError::InvalidTransaction(format!(
                "Negative output index {} for {txid_hex}",
                input.get_vout()
            ))
        })?;
        prev_tx.vout.get(index).ok_or_else(|| {
            BlockchainError::InvalidTransaction(format!(
                "Output index {index} out of range for {txid_hex}"
            ))
        })
    }

    // The message for input `idx` is the id of the trimmed copy with only that
    // input's key field set to the referenced output's public key hash.
    fn signing_message(
        tx_copy: &mut Transaction,
        idx: usize,
        prev_txs: &PrevTransactions,
    ) -> Result<Vec<u8>> {
        let pub_key_hash = Self::referenced_output(&tx_copy.vin[idx], prev_txs)?
            .get_pub_key_hash()
            .to_vec();
        tx_copy.vin[idx].pub_key = pub_key_hash;
        let message = tx_copy.hash();
        tx_copy.vin[idx].pub_key.clear();
        message
    }

    /// Signs every input in place. A coinbase is left untouched.
    pub fn sign(&mut self, pkcs8: &[u8], prev_txs: &PrevTransactions) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        // I sign each input against its own message, so a signature for one input
        // never verifies for another.
        let mut tx_copy = self.trimmed_copy();
        for idx in 0..self.vin.len() {
            let message = Self::signing_message(&mut tx_copy, idx, prev_txs)?;
            self.vin[idx].signature = ecdsa_p256_sha256_sign_digest(pkcs8, &message)?;
            debug!(
                "Signed input {idx} of {}",
                HEXLOWER.encode(self.id.as_slice())
            );
        }
        Ok(())
    }

    /// Checks every input's signature and key ownership.
    ///
    /// `Ok(false)` means a signature or key mismatch; `Err` means the transaction
    /// references something that does not exist.
    pub fn verify(&self, prev_txs: &PrevTransactions) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter().enumerate() {
            // I first make sure the key in the input is the one the output was locked to
            let referenced = Self::referenced_output(vin, prev_txs)?;
            if !vin.uses_key(referenced.get_pub_key_hash()) {
                debug!("Input {idx} key does not own the referenced output");
                return Ok(false);
            }

            let message = Self::signing_message(&mut tx_copy, idx, prev_txs)?;
            if !ecdsa_p256_sha256_sign_verify(
                vin.pub_key.as_slice(),
                vin.signature.as_slice(),
                message.as_slice(),
            ) {
                debug!("Input {idx} signature mismatch");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Sum of the outputs this transaction's inputs claim.
    pub fn input_value(&self, prev_txs: &PrevTransactions) -> Result<u64> {
        if self.is_coinbase() {
            return Ok(0);
        }

        let mut total = 0u64;
        for vin in &self.vin {
            let value = Self::referenced_output(vin, prev_txs)?.get_value();
            total = total.checked_add(value).ok_or_else(|| {
                BlockchainError::InvalidTransaction("Input value overflow".to_string())
            })?;
        }
        Ok(total)
    }

    pub fn output_value(&self) -> Result<u64> {
        let mut total = 0u64;
        for vout in &self.vout {
            total = total.checked_add(vout.get_value()).ok_or_else(|| {
                BlockchainError::InvalidTransaction("Output value overflow".to_string())
            })?;
        }
        Ok(total)
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == COINBASE_VOUT
    }

    /// The free-text note of a coinbase transaction.
    pub fn coinbase_note(&self) -> Option<String> {
        if !self.is_coinbase() {
            return None;
        }
        Some(String::from_utf8_lossy(self.vin[0].pub_key.as_slice()).into_owned())
    }

    // I hash everything except the id itself. Transfer signatures are left out
    // because the id is fixed before signing, so I clear them here and the id stays
    // the same once the inputs are signed. A coinbase keeps its random signature
    // bytes, they are what keep two identical rewards apart.
    fn hash(&self) -> Result<Vec<u8>> {
        let coinbase = self.is_coinbase();
        let vin = self
            .vin
            .iter()
            .map(|input| TXInput {
                signature: if coinbase {
                    input.signature.clone()
                } else {
                    vec![]
                },
                ..input.clone()
            })
            .collect();
        let tx_copy = Transaction {
            id: vec![],
            vin,
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(&tx_copy.serialize()?))
    }

    /// Whether the stored id is the digest of the current contents.
    pub fn has_valid_id(&self) -> Result<bool> {
        Ok(self.id == self.hash()?)
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }

    #[cfg(test)]
    pub(crate) fn vin_mut(&mut self) -> &mut Vec<TXInput> {
        &mut self.vin
    }

    #[cfg(test)]
    pub(crate) fn id_mut(&mut self) -> &mut Vec<u8> {
        &mut self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    // Coinbase transactions paying `wallet`, plus the (txid, index) pairs to spend them.
    fn fund(wallet: &Wallet, count: usize) -> (PrevTransactions, Vec<(Vec<u8>, usize)>) {
        let mut prev_txs = PrevTransactions::new();
        let mut spendable = vec![];
        for i in 0..count {
            let coinbase =
                Transaction::new_coinbase_tx(&wallet.get_address(), &format!("fund {i}")).unwrap();
            spendable.push((coinbase.get_id().to_vec(), 0));
            prev_txs.insert(coinbase.get_id().to_vec(), coinbase);
        }
        (prev_txs, spendable)
    }

    fn signed_transfer(inputs: usize) -> (Transaction, PrevTransactions, Wallet) {
        let sender = Wallet::new().unwrap();
        let recipient = Wallet::new().unwrap();
        let (prev_txs, spendable) = fund(&sender, inputs);
        let accumulated = SUBSIDY * inputs as u64;

        let mut tx = Transaction::build_unsigned(
            sender.get_public_key(),
            &sender.get_address(),
            &recipient.get_address(),
            accumulated - 1,
            accumulated,
            &spendable,
        )
        .unwrap();
        tx.sign(sender.get_pkcs8(), &prev_txs).unwrap();
        (tx, prev_txs, sender)
    }

    #[test]
    fn test_coinbase_structure() {
        let address = Wallet::new().unwrap().get_address();
        let tx = Transaction::new_coinbase_tx(&address, "genesis").unwrap();

        assert!(tx.is_coinbase());
        assert_eq!(tx.get_vin().len(), 1);
        assert!(tx.get_vin()[0].get_txid().is_empty());
        assert_eq!(tx.get_vin()[0].get_vout(), COINBASE_VOUT);
        assert_eq!(tx.get_vout()[0].get_value(), BLOCK_REWARD);
        assert_eq!(tx.coinbase_note().as_deref(), Some("genesis"));
        assert_eq!(tx.get_id().len(), 32);
        assert!(tx.verify(&PrevTransactions::new()).unwrap());
    }

    #[test]
    fn test_coinbase_ids_are_unique() {
        let address = Wallet::new().unwrap().get_address();
        let first = Transaction::new_coinbase_tx(&address, "same").unwrap();
        let second = Transaction::new_coinbase_tx(&address, "same").unwrap();
        assert_ne!(first.get_id(), second.get_id());
    }

    #[test]
    fn test_coinbase_rejects_invalid_address() {
        let result = Transaction::new_coinbase_tx("not-an-address", "");
        assert!(matches!(result, Err(BlockchainError::InvalidAddress(_))));
    }

    #[test]
    fn test_change_output_only_when_needed() {
        let sender = Wallet::new().unwrap();
        let recipient = Wallet::new().unwrap().get_address();
        let (_, spendable) = fund(&sender, 1);

        let exact = Transaction::build_unsigned(
            sender.get_public_key(),
            &sender.get_address(),
            &recipient,
            SUBSIDY,
            SUBSIDY,
            &spendable,
        )
        .unwrap();
        assert_eq!(exact.get_vout().len(), 1);

        let with_change = Transaction::build_unsigned(
            sender.get_public_key(),
            &sender.get_address(),
            &recipient,
            SUBSIDY - 10,
            SUBSIDY,
            &spendable,
        )
        .unwrap();
        assert_eq!(with_change.get_vout().len(), 2);
        assert_eq!(with_change.get_vout()[1].get_value(), 10);
        assert!(with_change.get_vout()[1]
            .is_locked_with_key(&hash_pub_key(sender.get_public_key())));
        assert!(!with_change.is_coinbase());
    }

    #[test]
    fn test_build_rejects_shortfall() {
        let sender = Wallet::new().unwrap();
        let (_, spendable) = fund(&sender, 1);
        let result = Transaction::build_unsigned(
            sender.get_public_key(),
            &sender.get_address(),
            &sender.get_address(),
            SUBSIDY + 1,
            SUBSIDY,
            &spendable,
        );
        assert!(matches!(
            result,
            Err(BlockchainError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_sign_then_verify_multiple_inputs() {
        let (tx, prev_txs, _) = signed_transfer(3);
        assert_eq!(tx.get_vin().len(), 3);
        assert!(tx.get_vin().iter().all(|vin| vin.get_signature().len() == 64));
        assert!(tx.verify(&prev_txs).unwrap());
    }

    #[test]
    fn test_tampered_signature_fails() {
        let (mut tx, prev_txs, _) = signed_transfer(2);
        for idx in 0..tx.get_vin().len() {
            let mut tampered = tx.clone();
            tampered.vin_mut()[idx].signature_mut()[10] ^= 0xFF;
            assert!(!tampered.verify(&prev_txs).unwrap());
        }
        tx.vin_mut()[0].signature_mut().clear();
        assert!(!tx.verify(&prev_txs).unwrap());
    }

    #[test]
    fn test_signatures_are_not_interchangeable() {
        let (mut tx, prev_txs, _) = signed_transfer(2);
        let first = tx.get_vin()[0].get_signature().to_vec();
        let second = tx.get_vin()[1].get_signature().to_vec();
        *tx.vin_mut()[0].signature_mut() = second;
        *tx.vin_mut()[1].signature_mut() = first;
        assert!(!tx.verify(&prev_txs).unwrap());
    }

    #[test]
    fn test_foreign_key_cannot_spend() {
        let owner = Wallet::new().unwrap();
        let thief = Wallet::new().unwrap();
        let (prev_txs, spendable) = fund(&owner, 1);

        let mut tx = Transaction::build_unsigned(
            thief.get_public_key(),
            &thief.get_address(),
            &thief.get_address(),
            SUBSIDY,
            SUBSIDY,
            &spendable,
        )
        .unwrap();
        tx.sign(thief.get_pkcs8(), &prev_txs).unwrap();
        assert!(!tx.verify(&prev_txs).unwrap());
    }

    #[test]
    fn test_missing_prior_transaction_is_reported() {
        let (tx, _, sender) = signed_transfer(1);
        let result = tx.verify(&PrevTransactions::new());
        assert!(matches!(result, Err(BlockchainError::TransactionNotFound(_))));

        let mut unsigned = tx.clone();
        let sign_result = unsigned.sign(sender.get_pkcs8(), &PrevTransactions::new());
        assert!(matches!(
            sign_result,
            Err(BlockchainError::TransactionNotFound(_))
        ));
    }

    #[test]
    fn test_value_accounting() {
        let (tx, prev_txs, _) = signed_transfer(2);
        assert_eq!(tx.input_value(&prev_txs).unwrap(), 2 * SUBSIDY);
        assert_eq!(tx.output_value().unwrap(), 2 * SUBSIDY);
    }

    #[test]
    fn test_id_survives_signing() {
        let sender = Wallet::new().unwrap();
        let recipient = Wallet::new().unwrap();
        let (prev_txs, spendable) = fund(&sender, 2);

        let mut tx = Transaction::build_unsigned(
            sender.get_public_key(),
            &sender.get_address(),
            &recipient.get_address(),
            SUBSIDY,
            2 * SUBSIDY,
            &spendable,
        )
        .unwrap();
        let unsigned_id = tx.get_id().to_vec();
        assert!(tx.has_valid_id().unwrap());

        tx.sign(sender.get_pkcs8(), &prev_txs).unwrap();
        assert_eq!(tx.get_id(), unsigned_id.as_slice());
        assert!(tx.has_valid_id().unwrap());
    }

    #[test]
    fn test_relabelled_or_edited_transaction_has_invalid_id() {
        let (tx, _, _) = signed_transfer(1);
        let address = Wallet::new().unwrap().get_address();
        let coinbase = Transaction::new_coinbase_tx(&address, "reward").unwrap();
        assert!(coinbase.has_valid_id().unwrap());

        let mut relabelled = tx.clone();
        *relabelled.id_mut() = coinbase.get_id().to_vec();
        assert!(!relabelled.has_valid_id().unwrap());

        let mut edited = tx.clone();
        edited.vin_mut()[0].pub_key = Wallet::new().unwrap().get_public_key().to_vec();
        assert!(!edited.has_valid_id().unwrap());

        let mut renoted = coinbase.clone();
        renoted.vin_mut()[0].signature = vec![0u8; 16];
        assert!(!renoted.has_valid_id().unwrap());
    }

    #[test]
    fn test_encoding_preserves_id_and_signatures() {
        let (tx, prev_txs, _) = signed_transfer(1);
        let decoded = Transaction::deserialize(&tx.serialize().unwrap()).unwrap();
        assert_eq!(decoded, tx);
        assert!(decoded.verify(&prev_txs).unwrap());
    }
}
