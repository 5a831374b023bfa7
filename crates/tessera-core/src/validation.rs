//! Transaction validation.
//!
//! Checks are split by what they need:
//!
//! - [`validate_structure`] and [`check_time_range`] are context-free.
//! - [`resolve_inputs`], [`check_conservation`], [`check_new_outputs`] and
//!   [`verify_witnesses`] run against a UTXO lookup and, inside a block,
//!   against sets shared by all transactions of that block.
//!
//! Block validation calls the pieces in a fixed order so that each failure
//! maps to one error. [`validate_transaction`] runs the same pipeline for a
//! loose transaction headed for the pool.

use std::collections::{BTreeMap, HashSet};

use crate::constants::{MAX_INPUTS, MAX_OUTPUTS};
use crate::error::{BlockError, TransactionError};
use crate::traits::SpendPredicate;
use crate::types::{AssetId, Hash256, Transaction, TxInput, Utxo};

/// Context-free shape checks shared by coinbase and regular transactions.
pub fn validate_structure(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(TransactionError::EmptyInputsOrOutputs);
    }
    if tx.inputs.len() > MAX_INPUTS {
        return Err(TransactionError::TooManyInputs(tx.inputs.len()));
    }
    if tx.outputs.len() > MAX_OUTPUTS {
        return Err(TransactionError::TooManyOutputs(tx.outputs.len()));
    }
    if let Some(i) = tx.outputs.iter().position(|o| o.amount == 0) {
        return Err(TransactionError::ZeroAmountOutput(i));
    }
    for output in &tx.outputs {
        if tx.total_output(&output.asset_id).is_none() {
            return Err(TransactionError::ValueOverflow);
        }
    }
    Ok(())
}

/// A transaction with a non-zero `time_range` may not be confirmed by a
/// block timestamped after it.
pub fn check_time_range(tx: &Transaction, timestamp: u64) -> Result<(), TransactionError> {
    if tx.time_range != 0 && timestamp > tx.time_range {
        return Err(TransactionError::Expired {
            time_range: tx.time_range,
            timestamp,
        });
    }
    Ok(())
}

/// Look up the UTXO behind every spend input of transaction `index`.
///
/// `spent` collects output IDs already claimed earlier in the block (or in
/// this transaction); claiming one twice is a double spend, as is claiming
/// one `lookup` does not know.
pub fn resolve_inputs<F>(
    tx: &Transaction,
    index: usize,
    lookup: F,
    spent: &mut HashSet<Hash256>,
) -> Result<Vec<Utxo>, BlockError>
where
    F: Fn(&Hash256) -> Option<Utxo>,
{
    let mut resolved = Vec::with_capacity(tx.inputs.len());
    for (input_index, input) in tx.inputs.iter().enumerate() {
        let TxInput::Spend(spend) = input else {
            continue;
        };
        if !spent.insert(spend.output_id) {
            return Err(BlockError::DoubleSpend {
                output_id: spend.output_id,
                in_block: true,
            });
        }
        let utxo = lookup(&spend.output_id).ok_or(BlockError::DoubleSpend {
            output_id: spend.output_id,
            in_block: false,
        })?;
        if !utxo.matches(spend) {
            return Err(BlockError::InputMismatch {
                tx: index,
                input: input_index,
            });
        }
        resolved.push(utxo);
    }
    Ok(resolved)
}

/// Per-asset input total must equal per-asset output total.
///
/// Input amounts come from the spend inputs, which [`resolve_inputs`] has
/// already matched against their UTXOs. Sums are taken in u128 so no
/// realistic transaction can overflow them.
pub fn check_conservation(tx: &Transaction, index: usize) -> Result<(), BlockError> {
    let mut balances: BTreeMap<AssetId, (u128, u128)> = BTreeMap::new();
    for input in &tx.inputs {
        if let TxInput::Spend(spend) = input {
            balances.entry(spend.asset_id).or_default().0 += spend.amount as u128;
        }
    }
    for output in &tx.outputs {
        balances.entry(output.asset_id).or_default().1 += output.amount as u128;
    }
    match balances.into_iter().find(|(_, (inputs, outputs))| inputs != outputs) {
        Some((asset, (inputs, outputs))) => Err(BlockError::Conservation {
            tx: index,
            asset,
            inputs,
            outputs,
        }),
        None => Ok(()),
    }
}

/// The outputs a transaction creates must not already exist.
///
/// `created` collects IDs created earlier in the same block. Returns the new
/// IDs in position order.
pub fn check_new_outputs<F>(tx: &Transaction, exists: F, created: &mut HashSet<Hash256>) -> Result<Vec<Hash256>, BlockError>
where
    F: Fn(&Hash256) -> bool,
{
    let ids = tx.output_ids();
    for id in &ids {
        if exists(id) || !created.insert(*id) {
            return Err(BlockError::DuplicateOutput(*id));
        }
    }
    Ok(ids)
}

/// Every spend input's witness must satisfy its control program.
pub fn verify_witnesses(tx: &Transaction, index: usize, predicate: &dyn SpendPredicate) -> Result<(), BlockError> {
    for (input_index, input) in tx.inputs.iter().enumerate() {
        if let TxInput::Spend(spend) = input {
            predicate
                .check(&spend.control_program, &tx.sig_hash(input_index), &spend.arguments)
                .map_err(|source| BlockError::Witness {
                    tx: index,
                    input: input_index,
                    source,
                })?;
        }
    }
    Ok(())
}

/// Validate a loose transaction against a UTXO view.
///
/// Runs the block-level transaction checks with `index` 0 and fresh in-block
/// sets, after rejecting anything that mints. Returns the UTXOs it spends.
pub fn validate_transaction<F>(
    tx: &Transaction,
    timestamp: u64,
    lookup: F,
    predicate: &dyn SpendPredicate,
) -> Result<Vec<Utxo>, BlockError>
where
    F: Fn(&Hash256) -> Option<Utxo>,
{
    if tx.has_coinbase_input() {
        return Err(BlockError::Coinbase("coinbase input outside a block".into()));
    }
    let wrap = |source| BlockError::Transaction { index: 0, source };
    validate_structure(tx).map_err(wrap)?;
    check_time_range(tx, timestamp).map_err(wrap)?;

    let spent = resolve_inputs(tx, 0, &lookup, &mut HashSet::new())?;
    check_conservation(tx, 0)?;
    check_new_outputs(tx, |id| lookup(id).is_some(), &mut HashSet::new())?;
    verify_witnesses(tx, 0, predicate)?;
    Ok(spent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NATIVE_ASSET;
    use crate::program::{StandardPredicate, anyone_can_spend};
    use crate::types::{SpendInput, TxOutput};
    use std::collections::HashMap;

    fn utxo(tag: u8, amount: u64) -> Utxo {
        let tx_id = Hash256([tag; 32]);
        Utxo::from_output(tx_id, 0, &TxOutput::new(NATIVE_ASSET, amount, anyone_can_spend()), 1, false)
    }

    fn spend_of(u: &Utxo) -> TxInput {
        TxInput::Spend(SpendInput {
            output_id: u.output_id,
            source_id: u.source_id,
            source_position: u.source_position,
            asset_id: u.asset_id,
            amount: u.amount,
            control_program: u.control_program.clone(),
            arguments: vec![],
        })
    }

    fn tx(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Transaction {
        Transaction {
            version: 1,
            time_range: 0,
            inputs,
            outputs,
        }
    }

    fn out(amount: u64) -> TxOutput {
        TxOutput::new(NATIVE_ASSET, amount, anyone_can_spend())
    }

    fn view(utxos: &[Utxo]) -> HashMap<Hash256, Utxo> {
        utxos.iter().map(|u| (u.output_id, u.clone())).collect()
    }

    // --- Structure ---

    #[test]
    fn structure_rejects_empty_sides() {
        let u = utxo(1, 10);
        assert_eq!(validate_structure(&tx(vec![], vec![out(1)])), Err(TransactionError::EmptyInputsOrOutputs));
        assert_eq!(validate_structure(&tx(vec![spend_of(&u)], vec![])), Err(TransactionError::EmptyInputsOrOutputs));
    }

    #[test]
    fn structure_rejects_zero_amount_and_overflow() {
        let u = utxo(1, 10);
        assert_eq!(
            validate_structure(&tx(vec![spend_of(&u)], vec![out(5), out(0)])),
            Err(TransactionError::ZeroAmountOutput(1))
        );
        assert_eq!(
            validate_structure(&tx(vec![spend_of(&u)], vec![out(u64::MAX), out(1)])),
            Err(TransactionError::ValueOverflow)
        );
    }

    #[test]
    fn structure_rejects_too_many_outputs() {
        let u = utxo(1, 10);
        let outputs = vec![out(1); MAX_OUTPUTS + 1];
        assert_eq!(
            validate_structure(&tx(vec![spend_of(&u)], outputs)),
            Err(TransactionError::TooManyOutputs(MAX_OUTPUTS + 1))
        );
    }

    #[test]
    fn time_range_zero_is_unbounded() {
        let mut t = tx(vec![], vec![]);
        assert!(check_time_range(&t, u64::MAX).is_ok());
        t.time_range = 100;
        assert!(check_time_range(&t, 100).is_ok());
        assert!(matches!(check_time_range(&t, 101), Err(TransactionError::Expired { .. })));
    }

    // --- Inputs ---

    #[test]
    fn missing_utxo_is_double_spend_outside_block() {
        let u = utxo(1, 10);
        let t = tx(vec![spend_of(&u)], vec![out(10)]);
        let err = resolve_inputs(&t, 3, |_| None, &mut HashSet::new()).unwrap_err();
        assert_eq!(err, BlockError::DoubleSpend { output_id: u.output_id, in_block: false });
    }

    #[test]
    fn repeated_input_is_double_spend_in_block() {
        let u = utxo(1, 10);
        let map = view(&[u.clone()]);
        let t = tx(vec![spend_of(&u), spend_of(&u)], vec![out(20)]);
        let err = resolve_inputs(&t, 0, |id| map.get(id).cloned(), &mut HashSet::new()).unwrap_err();
        assert_eq!(err, BlockError::DoubleSpend { output_id: u.output_id, in_block: true });
    }

    #[test]
    fn input_claiming_wrong_amount_is_mismatch() {
        let u = utxo(1, 10);
        let map = view(&[u.clone()]);
        let mut input = spend_of(&u);
        if let TxInput::Spend(s) = &mut input {
            s.amount = 11;
        }
        let t = tx(vec![input], vec![out(11)]);
        let err = resolve_inputs(&t, 2, |id| map.get(id).cloned(), &mut HashSet::new()).unwrap_err();
        assert_eq!(err, BlockError::InputMismatch { tx: 2, input: 0 });
    }

    // --- Conservation ---

    #[test]
    fn conservation_requires_exact_balance() {
        let u = utxo(1, 1_000);
        assert!(check_conservation(&tx(vec![spend_of(&u)], vec![out(600), out(400)]), 0).is_ok());

        let err = check_conservation(&tx(vec![spend_of(&u)], vec![out(999)]), 1).unwrap_err();
        assert_eq!(
            err,
            BlockError::Conservation { tx: 1, asset: NATIVE_ASSET, inputs: 1_000, outputs: 999 }
        );
    }

    #[test]
    fn conservation_is_per_asset() {
        let u = utxo(1, 10);
        let other = AssetId(Hash256([7; 32]));
        let t = tx(vec![spend_of(&u)], vec![out(5), TxOutput::new(other, 5, anyone_can_spend())]);
        let err = check_conservation(&t, 0).unwrap_err();
        assert!(matches!(err, BlockError::Conservation { outputs: 5, .. }));
    }

    // --- Outputs / witnesses ---

    #[test]
    fn existing_output_is_duplicate() {
        let u = utxo(1, 10);
        let t = tx(vec![spend_of(&u)], vec![out(10)]);
        let first = t.output_ids()[0];
        assert_eq!(
            check_new_outputs(&t, |id| *id == first, &mut HashSet::new()),
            Err(BlockError::DuplicateOutput(first))
        );
        let mut created = HashSet::new();
        assert!(check_new_outputs(&t, |_| false, &mut created).is_ok());
        assert!(check_new_outputs(&t, |_| false, &mut created).is_err());
    }

    #[test]
    fn unknown_program_fails_witness() {
        let mut u = utxo(1, 10);
        u.control_program = vec![0x00];
        let t = tx(vec![spend_of(&u)], vec![out(10)]);
        assert!(matches!(
            verify_witnesses(&t, 4, &StandardPredicate),
            Err(BlockError::Witness { tx: 4, input: 0, .. })
        ));
    }

    // --- Loose transactions ---

    #[test]
    fn loose_transaction_pipeline() {
        let u = utxo(1, 10);
        let map = view(&[u.clone()]);
        let t = tx(vec![spend_of(&u)], vec![out(4), out(6)]);
        let spent = validate_transaction(&t, 0, |id| map.get(id).cloned(), &StandardPredicate).unwrap();
        assert_eq!(spent, vec![u]);
    }

    #[test]
    fn loose_coinbase_rejected() {
        let t = tx(vec![TxInput::Coinbase { arbitrary: vec![] }], vec![out(1)]);
        assert!(matches!(
            validate_transaction(&t, 0, |_| None, &StandardPredicate),
            Err(BlockError::Coinbase(_))
        ));
    }
}
