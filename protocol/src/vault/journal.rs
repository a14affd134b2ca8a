//! Undo journal for in-flight vault operations.
//!
//! Each step of a deposit or withdraw that changes state pushes the entry
//! that reverses it. If a later step fails, the vault replays the journal
//! newest-first. Ledgers end up where the operation found them; funds
//! already released from the venue end up idle in custody.

use crate::AccountId;

/// The inverse of one committed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Undo {
    /// Underlying pulled into custody from `to`; send it back.
    ReturnAssets { to: AccountId, amount: u64 },
    /// Shares minted to `holder`; burn them.
    BurnShares { holder: AccountId, shares: u64 },
    /// Shares burned from `holder`; mint them back.
    MintShares { holder: AccountId, shares: u64 },
    /// Share allowance spent; restore the previous value.
    RestoreShareAllowance {
        owner: AccountId,
        spender: AccountId,
        allowance: u64,
    },
    /// Venue approval granted; revoke it.
    RevokeVenueApproval,
    /// Funds released from the venue into custody. Not re-supplied: they
    /// stay idle, where they still count toward total assets.
    HoldReleased { amount: u64 },
}

/// Steps committed so far by the current operation.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    entries: Vec<Undo>,
}

impl Journal {
    pub(crate) fn push(&mut self, undo: Undo) {
        self.entries.push(undo);
    }

    /// Entries newest-first, consuming the journal.
    pub(crate) fn into_reverse(self) -> impl Iterator<Item = Undo> {
        self.entries.into_iter().rev()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_newest_first() {
        let mut journal = Journal::default();
        journal.push(Undo::ReturnAssets {
            to: "alice".into(),
            amount: 10,
        });
        journal.push(Undo::BurnShares {
            holder: "alice".into(),
            shares: 10,
        });
        journal.push(Undo::RevokeVenueApproval);
        assert_eq!(journal.len(), 3);

        let order: Vec<_> = journal.into_reverse().collect();
        assert_eq!(order[0], Undo::RevokeVenueApproval);
        assert!(matches!(order[2], Undo::ReturnAssets { amount: 10, .. }));
    }
}
