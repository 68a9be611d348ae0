use std::collections::{btree_map::Entry, BTreeMap};
use std::fmt::Write as _;

use rust_decimal::Decimal;
use solana_sdk::{native_token::LAMPORTS_PER_SOL, pubkey::Pubkey};
use thiserror::Error;

/// What the balance report needs from a landed transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Static keys followed by loaded writable then loaded readonly keys.
    pub account_keys: Vec<Pubkey>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalanceEntry>,
    pub post_token_balances: Vec<TokenBalanceEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenBalanceEntry {
    pub account_index: u8,
    pub mint: String,
    pub owner: Option<Pubkey>,
    pub ui_amount: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("account {0} not found in transaction")]
    AccountNotFound(Pubkey),
    #[error("balance list has no entry for account index {0}")]
    MissingBalance(usize),
    #[error("token balance refers to account index {0} outside the account list")]
    UnknownAccountIndex(u8),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeDiff {
    pub before_lamports: u64,
    pub after_lamports: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenDiff {
    pub address: Pubkey,
    pub mint: String,
    pub before: String,
    pub after: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceDiff {
    pub native: NativeDiff,
    pub tokens: BTreeMap<u8, TokenDiff>,
}

impl BalanceDiff {
    /// Correlates pre/post balances for the token accounts `owner` holds.
    pub fn from_record(owner: &Pubkey, record: &TransactionRecord) -> Result<Self, ReportError> {
        let index = record
            .account_keys
            .iter()
            .position(|key| key == owner)
            .ok_or(ReportError::AccountNotFound(*owner))?;

        let native = NativeDiff {
            before_lamports: *record
                .pre_balances
                .get(index)
                .ok_or(ReportError::MissingBalance(index))?,
            after_lamports: *record
                .post_balances
                .get(index)
                .ok_or(ReportError::MissingBalance(index))?,
        };

        let mut tokens: BTreeMap<u8, TokenDiff> = BTreeMap::new();
        let owned = |entry: &&TokenBalanceEntry| entry.owner.as_ref() == Some(owner);

        for post in record.post_token_balances.iter().filter(owned) {
            token_diff(&mut tokens, record, post)?.after = post.ui_amount.clone();
        }
        for pre in record.pre_token_balances.iter().filter(owned) {
            token_diff(&mut tokens, record, pre)?.before = pre.ui_amount.clone();
        }

        Ok(Self { native, tokens })
    }

    pub fn render(&self) -> String {
        let mut out = String::from("Transaction details:\n");
        let _ = writeln!(
            out,
            "\t[Before SOL balance: {} lamports/{} SOL ===>  After SOL balance: {} lamports/{} SOL]",
            self.native.before_lamports,
            lamports_to_sol(self.native.before_lamports),
            self.native.after_lamports,
            lamports_to_sol(self.native.after_lamports),
        );
        for token in self.tokens.values() {
            let _ = writeln!(
                out,
                "\tToken address: {} (mint {})\n\t\t[Before amount: {} ===> After amount: {}]",
                token.address, token.mint, token.before, token.after
            );
        }
        out
    }
}

fn token_diff<'a>(
    tokens: &'a mut BTreeMap<u8, TokenDiff>,
    record: &TransactionRecord,
    entry: &TokenBalanceEntry,
) -> Result<&'a mut TokenDiff, ReportError> {
    match tokens.entry(entry.account_index) {
        Entry::Occupied(slot) => Ok(slot.into_mut()),
        Entry::Vacant(slot) => {
            let address = record
                .account_keys
                .get(usize::from(entry.account_index))
                .copied()
                .ok_or(ReportError::UnknownAccountIndex(entry.account_index))?;
            Ok(slot.insert(TokenDiff {
                address,
                mint: entry.mint.clone(),
                before: "0".to_string(),
                after: "0".to_string(),
            }))
        }
    }
}

pub fn lamports_to_sol(lamports: u64) -> Decimal {
    (Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_SOL)).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const WSOL: &str = "So11111111111111111111111111111111111111112";

    fn entry(index: u8, mint: &str, owner: Pubkey, amount: &str) -> TokenBalanceEntry {
        TokenBalanceEntry {
            account_index: index,
            mint: mint.to_string(),
            owner: Some(owner),
            ui_amount: amount.to_string(),
        }
    }

    fn record(owner: Pubkey) -> TransactionRecord {
        let other = Pubkey::new_unique();
        TransactionRecord {
            account_keys: vec![owner, Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique()],
            pre_balances: vec![2_500_000_000, 0, 2_039_280, 0],
            post_balances: vec![1_499_995_000, 0, 2_039_280, 0],
            pre_token_balances: vec![
                entry(2, WSOL, owner, "1"),
                entry(3, USDC, other, "500"),
            ],
            post_token_balances: vec![
                entry(1, USDC, owner, "142.5"),
                entry(2, WSOL, owner, "0"),
                entry(3, USDC, other, "357.5"),
            ],
        }
    }

    #[test]
    fn correlates_native_and_token_balances() {
        let owner = Pubkey::new_unique();
        let rec = record(owner);
        let diff = BalanceDiff::from_record(&owner, &rec).expect("diff");

        assert_eq!(diff.native.before_lamports, 2_500_000_000);
        assert_eq!(diff.native.after_lamports, 1_499_995_000);
        assert_eq!(diff.tokens.len(), 2, "foreign owner must be filtered");

        let usdc = &diff.tokens[&1];
        assert_eq!(usdc.address, rec.account_keys[1]);
        assert_eq!((usdc.before.as_str(), usdc.after.as_str()), ("0", "142.5"));
        let wsol = &diff.tokens[&2];
        assert_eq!((wsol.before.as_str(), wsol.after.as_str()), ("1", "0"));
    }

    #[test]
    fn entry_only_before_defaults_after_to_zero() {
        let owner = Pubkey::new_unique();
        let mut rec = record(owner);
        rec.post_token_balances.retain(|e| e.account_index != 2);
        let diff = BalanceDiff::from_record(&owner, &rec).expect("diff");
        assert_eq!(diff.tokens[&2].before, "1");
        assert_eq!(diff.tokens[&2].after, "0");
    }

    #[test]
    fn missing_owner_is_account_not_found() {
        let owner = Pubkey::new_unique();
        let rec = record(Pubkey::new_unique());
        assert_eq!(
            BalanceDiff::from_record(&owner, &rec),
            Err(ReportError::AccountNotFound(owner))
        );
    }

    #[test]
    fn token_index_outside_key_list_fails() {
        let owner = Pubkey::new_unique();
        let rec = TransactionRecord {
            account_keys: vec![owner],
            pre_balances: vec![10],
            post_balances: vec![5],
            pre_token_balances: vec![],
            post_token_balances: vec![entry(9, USDC, owner, "1.5")],
        };
        assert_eq!(
            BalanceDiff::from_record(&owner, &rec),
            Err(ReportError::UnknownAccountIndex(9))
        );
    }

    #[test]
    fn render_is_stable() {
        let owner = Pubkey::new_unique();
        let rec = record(owner);
        let first = BalanceDiff::from_record(&owner, &rec).unwrap().render();
        let second = BalanceDiff::from_record(&owner, &rec).unwrap().render();
        assert_eq!(first, second);

        let mut lines = first.lines();
        assert_eq!(lines.next(), Some("Transaction details:"));
        assert_eq!(
            lines.next(),
            Some(
                "\t[Before SOL balance: 2500000000 lamports/2.5 SOL ===>  After SOL balance: 1499995000 lamports/1.499995 SOL]"
            )
        );
        assert!(lines.next().unwrap().contains(&rec.account_keys[1].to_string()));
        assert_eq!(lines.next(), Some("\t\t[Before amount: 0 ===> After amount: 142.5]"));
    }

    #[test]
    fn lamports_render_without_trailing_zeros() {
        assert_eq!(lamports_to_sol(0).to_string(), "0");
        assert_eq!(lamports_to_sol(1_000_000_000).to_string(), "1");
        assert_eq!(lamports_to_sol(1).to_string(), "0.000000001");
    }
}
