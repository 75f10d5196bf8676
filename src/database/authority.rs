use std::collections::BTreeSet;

use crate::{
    database::Database,
    entity::{AccountObject, AssetObject},
    error::{AuthorityError, MeridianResult},
    protocol::{AccountId, Authority, MAX_SIG_CHECK_DEPTH, PublicKey},
};

/// Authority resolution: expands weighted account/key authorities through
/// the account graph up to the chain's recursion bound and checks a
/// signature-key set against them.
impl Database {
    /// Verifies that `keys` satisfies every required authority, and that no
    /// provided key is irrelevant to them.
    pub fn verify_authority(
        &self,
        required_active: &[AccountId],
        required_owner: &[AccountId],
        keys: &BTreeSet<PublicKey>,
    ) -> MeridianResult<()> {
        let mut relevant: BTreeSet<&PublicKey> = BTreeSet::new();
        for account_id in required_owner {
            let account = self.get::<AccountObject>(*account_id)?;
            if !self.satisfied(&account.owner, keys, 0, &mut relevant)? {
                return Err(AuthorityError::MissingOwnerAuthority(*account_id).into());
            }
        }
        for account_id in required_active {
            let account = self.get::<AccountObject>(*account_id)?;
            // The owner authority supersedes active.
            let by_active = self.satisfied(&account.active, keys, 0, &mut relevant)?;
            if !by_active && !self.satisfied(&account.owner, keys, 0, &mut relevant)? {
                return Err(AuthorityError::MissingActiveAuthority(*account_id).into());
            }
        }
        if let Some(stray) = keys.iter().find(|key| !relevant.contains(key)) {
            tracing::debug!(key = %stray, "irrelevant signature");
            return Err(AuthorityError::IrrelevantSignature.into());
        }
        Ok(())
    }

    /// Whether `keys` reaches the authority's weight threshold. Every
    /// provided key that is a member of any visited authority is recorded
    /// in `relevant`, whether or not the threshold is met.
    fn satisfied<'k>(
        &self,
        authority: &Authority,
        keys: &'k BTreeSet<PublicKey>,
        depth: u32,
        relevant: &mut BTreeSet<&'k PublicKey>,
    ) -> MeridianResult<bool> {
        let mut total: u64 = 0;
        for (key, weight) in &authority.key_auths {
            if let Some(provided) = keys.get(key) {
                relevant.insert(provided);
                total += u64::from(*weight);
            }
        }
        for (account_id, weight) in &authority.account_auths {
            if depth >= MAX_SIG_CHECK_DEPTH {
                // Deeper delegation cannot contribute weight.
                continue;
            }
            let Some(account) = self.find::<AccountObject>(*account_id) else {
                continue;
            };
            if self.satisfied(&account.active, keys, depth + 1, relevant)? {
                total += u64::from(*weight);
            }
        }
        Ok(total >= u64::from(authority.weight_threshold))
    }

    /// Whitelist gate: with the asset's `WHITE_LIST` flag active, the
    /// account must appear on at least one whitelist of the asset's listing
    /// authorities and on none of their blacklists.
    pub fn is_authorized_asset(&self, account: &AccountObject, asset: &AssetObject) -> bool {
        if !asset.uses_whitelist() {
            return true;
        }
        let whitelisted = asset.options.whitelist_authorities.is_empty()
            || asset
                .options
                .whitelist_authorities
                .iter()
                .any(|authority| account.whitelisting_accounts.contains(authority));
        let blacklisted = asset
            .options
            .blacklist_authorities
            .iter()
            .any(|authority| account.blacklisting_accounts.contains(authority));
        whitelisted && !blacklisted
    }
}
