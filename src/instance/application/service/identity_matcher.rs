//! Assigns server-generated identities to devices that were created unnamed.

use crate::core::domain::{model::device::DeviceSpec, value_object::DeviceIdentity};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Matches freshly observed devices back onto unnamed desired devices.
///
/// Runs once, right after an instance is first created. For every desired
/// entry without an identity, observed devices are scanned in order and the
/// first one with an equal match key takes the entry. An observed device is
/// handed out at most once, and identities already claimed by named entries
/// are never reassigned. Named entries are left untouched.
///
/// Two desired devices with the same key (e.g. two disks with the same
/// source and destination) are indistinguishable; they receive the observed
/// identities in scan order.
pub struct IdentityMatcher;

impl IdentityMatcher {
    /// Assigns identities in place and returns how many were assigned.
    pub fn assign(plan: &mut [DeviceSpec], observed: &[DeviceSpec]) -> usize {
        let mut claimed: HashSet<DeviceIdentity> =
            plan.iter().filter_map(|spec| spec.identity.clone()).collect();
        let mut assigned = 0;

        for entry in plan.iter_mut().filter(|spec| spec.identity.is_none()) {
            let Some(key) = entry.device.match_key() else {
                warn!(kind = %entry.kind(), "device has no match key, leaving it untracked");
                continue;
            };

            let found = observed.iter().find_map(|candidate| {
                let identity = candidate.identity.as_ref()?;
                let matches = candidate.kind() == entry.kind()
                    && !claimed.contains(identity)
                    && candidate.device.match_key().as_ref() == Some(&key);
                matches.then(|| identity.clone())
            });

            match found {
                Some(identity) => {
                    debug!(kind = %entry.kind(), identity = %identity, "matched device identity");
                    claimed.insert(identity.clone());
                    entry.identity = Some(identity);
                    assigned += 1;
                }
                None => {
                    warn!(kind = %entry.kind(), "no observed device matches, leaving it untracked");
                }
            }
        }
        assigned
    }
}
