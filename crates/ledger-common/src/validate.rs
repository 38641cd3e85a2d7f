//! Pure validation of a proposed double-entry transfer (spec §4.1).

use std::collections::BTreeMap;

use crate::error::Error;

/// Validates a proposed transfer and flattens it into a `changes` mapping
/// suitable for persistence.
///
/// - Fails with [`Error::Unbalanced`] if `sum(debit) != sum(credit)`.
/// - Fails with [`Error::DuplicatedAccount`] if any account id appears on both
///   sides. This keeps the Apply-phase predicate unambiguous (no account ever
///   needs two deltas landed in the same phase), and is semantically harmless
///   since the caller can net the amounts before calling in.
/// - Debit amounts are stored positive, credit amounts negative; the returned
///   map always sums to exactly zero (invariant I1).
pub fn validate(
    debit: &BTreeMap<String, u64>,
    credit: &BTreeMap<String, u64>,
) -> Result<BTreeMap<String, i64>, Error> {
    for account in debit.keys() {
        if credit.contains_key(account) {
            return Err(Error::DuplicatedAccount(account.clone()));
        }
    }

    let debit_sum: u128 = debit.values().map(|amt| *amt as u128).sum();
    let credit_sum: u128 = credit.values().map(|amt| *amt as u128).sum();
    if debit_sum != credit_sum {
        return Err(Error::Unbalanced);
    }

    let mut changes = BTreeMap::new();
    for (account, amount) in debit {
        changes.insert(account.clone(), *amount as i64);
    }
    for (account, amount) in credit {
        changes.insert(account.clone(), -(*amount as i64));
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn balances_and_nets_signs() {
        let debit = map(&[("A0001", 2000), ("A0002", 20)]);
        let credit = map(&[("L0001", 2020)]);
        let changes = validate(&debit, &credit).expect("should validate");
        assert_eq!(changes.get("A0001"), Some(&2000));
        assert_eq!(changes.get("A0002"), Some(&20));
        assert_eq!(changes.get("L0001"), Some(&-2020));
        assert_eq!(changes.values().sum::<i64>(), 0);
    }

    #[test]
    fn rejects_unbalanced() {
        let debit = map(&[("A0001", 2000), ("A0002", 20)]);
        let credit = map(&[("L0001", 2000)]);
        assert!(matches!(validate(&debit, &credit), Err(Error::Unbalanced)));
    }

    #[test]
    fn rejects_duplicated_account() {
        let debit = map(&[("A0001", 5)]);
        let credit = map(&[("A0001", 5)]);
        assert!(matches!(
            validate(&debit, &credit),
            Err(Error::DuplicatedAccount(ref a)) if a == "A0001"
        ));
    }

    #[test]
    fn empty_sides_balance_trivially() {
        let debit = BTreeMap::new();
        let credit = BTreeMap::new();
        let changes = validate(&debit, &credit).expect("empty transfer balances");
        assert!(changes.is_empty());
    }
}
