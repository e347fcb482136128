// BP Node: sovereign bitcoin wallet backend.
//
// SPDX-License-Identifier: Apache-2.0
//
// Designed & written in 2020-2025 by
//     @will-bitlight <https://bitlightlabs.com>
//     Dr Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// Copyright (C) 2020-2024 LNP/BP Standards Association. All rights reserved.
// Copyright (C) 2025 LNP/BP Labs, InDCS, Switzerland. All rights reserved.
// Copyright (C) 2020-2025 Dr Maxim Orlovsky. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except
// in compliance with the License. You may obtain a copy of the License at
//
//        http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License
// is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express
// or implied. See the License for the specific language governing permissions and limitations under
// the License.

//! Process-wide database policy (§4.4). Every record codec consults this to decide how much to
//! persist (the [`DbProfile`]) and what to discard after a block is applied (the [`PruneType`]).
//! The policy is set once, before the database is opened; afterward only [`get_db_policy`] is
//! used. Every codec entry point also accepts an explicit `Option<DbPolicy>` override so multiple
//! profiles stay testable within a single process without threading the policy through every
//! call site.

use std::sync::OnceLock;

/// How much of each record this engine persists.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
#[display(Debug)]
#[repr(u8)]
pub enum DbProfile {
    /// Stores only what is needed to serve balances: txs may be stored whole or omitted.
    Lite = 0,
    /// Stores fragged txs and a partial merkle tree.
    Partial = 1,
    /// Stores fragged txs and a partial merkle tree (the common default).
    Full = 2,
    /// Stores fragged txs and no merkle tree (always recomputable).
    Super = 3,
    /// Caller does not care; treated identically to `Full` (the cheapest correct default).
    Whatever = 4,
}

impl DbProfile {
    pub fn to_u8(self) -> u8 { self as u8 }

    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Lite,
            1 => Self::Partial,
            2 => Self::Full,
            3 => Self::Super,
            4 => Self::Whatever,
            _ => return None,
        })
    }

    /// Whether fragged (outputs-stripped) tx storage applies under this profile.
    pub fn uses_fragged_tx(self) -> bool { !matches!(self, Self::Lite) }
}

impl std::str::FromStr for DbProfile {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "lite" => Self::Lite,
            "partial" => Self::Partial,
            "full" => Self::Full,
            "super" => Self::Super,
            "whatever" => Self::Whatever,
            _ => return Err(UnknownVariant(s.to_string())),
        })
    }
}

/// Reported by [`DbProfile::from_str`] / [`PruneType::from_str`] when the CLI-supplied name does
/// not match any known variant.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display("unrecognised value {0:?}")]
pub struct UnknownVariant(pub String);

/// What is discarded once a block has been fully applied.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
#[display(Debug)]
#[repr(u8)]
pub enum PruneType {
    /// Keep everything (undo data and full blocks survive application).
    PruneNone = 0,
    /// Discard undo data for a block once it is buried deep enough to be immutable.
    PruneAll = 1,
}

impl PruneType {
    pub fn to_u8(self) -> u8 { self as u8 }

    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::PruneNone,
            1 => Self::PruneAll,
            _ => return None,
        })
    }
}

impl std::str::FromStr for PruneType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "none" => Self::PruneNone,
            "all" => Self::PruneAll,
            _ => return Err(UnknownVariant(s.to_string())),
        })
    }
}

/// One of `NONE | PARTIAL | FULL`, governing how a header's merkle data is serialised (§4.3).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
#[display(Debug)]
#[repr(u8)]
pub enum MerkleType {
    None = 0,
    Partial = 1,
    Full = 2,
}

impl MerkleType {
    pub fn to_u8(self) -> u8 { self as u8 }

    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::None,
            1 => Self::Partial,
            2 => Self::Full,
            _ => return None,
        })
    }

    /// LITE stores FULL, PARTIAL/FULL/WHATEVER store PARTIAL, SUPER stores NONE.
    pub fn for_profile(profile: DbProfile) -> Self {
        match profile {
            DbProfile::Lite => Self::Full,
            DbProfile::Partial | DbProfile::Full | DbProfile::Whatever => Self::Partial,
            DbProfile::Super => Self::None,
        }
    }
}

/// The process-wide database policy (§4.4): which [`DbProfile`] and [`PruneType`] every codec
/// consults by default.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct DbPolicy {
    pub profile: DbProfile,
    pub prune: PruneType,
}

impl Default for DbPolicy {
    /// Attempts to serialise records before the policy is installed fall back to this default.
    fn default() -> Self { Self { profile: DbProfile::Full, prune: PruneType::PruneNone } }
}

static POLICY: OnceLock<DbPolicy> = OnceLock::new();

/// Installs the process-wide policy. Must be called once, before the database is opened; this is
/// not thread-safe by contract (§5) and a second call is a no-op that logs a warning.
pub fn set_db_policy(policy: DbPolicy) {
    if POLICY.set(policy).is_err() {
        log::warn!("database policy was already installed; ignoring second install attempt");
    }
}

/// Reads the process-wide policy, or [`DbPolicy::default`] if none was installed.
pub fn get_db_policy() -> DbPolicy { POLICY.get().copied().unwrap_or_default() }

/// Resolves the effective policy for one codec call: the explicit `override_policy` if given,
/// otherwise the process-wide policy.
pub fn resolve_policy(override_policy: Option<DbPolicy>) -> DbPolicy {
    override_policy.unwrap_or_else(get_db_policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_default_is_full_none() {
        // Relies on no other test in this process having called `set_db_policy` first; codec
        // tests use the `override_policy` parameter instead so they never race this one.
        let policy = get_db_policy();
        assert_eq!(policy.profile, DbProfile::Full);
        assert_eq!(policy.prune, PruneType::PruneNone);
    }

    #[test]
    fn merkle_type_per_profile() {
        assert_eq!(MerkleType::for_profile(DbProfile::Lite), MerkleType::Full);
        assert_eq!(MerkleType::for_profile(DbProfile::Partial), MerkleType::Partial);
        assert_eq!(MerkleType::for_profile(DbProfile::Full), MerkleType::Partial);
        assert_eq!(MerkleType::for_profile(DbProfile::Whatever), MerkleType::Partial);
        assert_eq!(MerkleType::for_profile(DbProfile::Super), MerkleType::None);
    }

    #[test]
    fn override_wins_over_process_policy() {
        let custom = DbPolicy { profile: DbProfile::Lite, prune: PruneType::PruneAll };
        let resolved = resolve_policy(Some(custom));
        assert_eq!(resolved.profile, DbProfile::Lite);
        assert_eq!(resolved.prune, PruneType::PruneAll);
    }

    #[test]
    fn profile_and_prune_parse_from_cli_strings() {
        assert_eq!("Full".parse::<DbProfile>().unwrap(), DbProfile::Full);
        assert_eq!("super".parse::<DbProfile>().unwrap(), DbProfile::Super);
        assert_eq!("all".parse::<PruneType>().unwrap(), PruneType::PruneAll);
        assert!("bogus".parse::<DbProfile>().is_err());
    }
}
