//! Profile snapshot and the per-cycle builder that assembles it

use std::collections::BTreeMap;
use std::fmt;

use chrono::DateTime;
use tracing::{debug, warn};

use super::CycleToken;
use crate::error::{RefreshError, Result, ServiceError};
use crate::models::{BasicUserInfo, FileMetadata, MembershipGroup, Thumbnail, User};
use crate::util::sanitize_for_logging;

/// One independently fetched piece of profile data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Facet {
    User,
    Photo,
    Manager,
    DirectReports,
    MembershipGroups,
    Files,
}

impl Facet {
    pub const ALL: [Facet; 6] = [
        Facet::User,
        Facet::Photo,
        Facet::Manager,
        Facet::DirectReports,
        Facet::MembershipGroups,
        Facet::Files,
    ];

    /// Snapshot field name this facet fills
    pub fn as_str(&self) -> &'static str {
        match self {
            Facet::User => "user",
            Facet::Photo => "thumbnail",
            Facet::Manager => "manager",
            Facet::DirectReports => "directReports",
            Facet::MembershipGroups => "membershipGroups",
            Facet::Files => "files",
        }
    }

    /// Whether a failure of this facet fails the whole refresh
    pub fn is_mandatory(&self) -> bool {
        matches!(self, Facet::User)
    }

    fn bit(&self) -> u8 {
        1 << (*self as u8)
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a facet within one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStatus {
    Ok,
    Failed,
    NotRequested,
}

impl FieldStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, FieldStatus::Ok)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FieldStatus::Failed)
    }
}

/// Set of facets requested for a refresh cycle
///
/// The core user facet is always a member.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FacetSet(u8);

impl FacetSet {
    pub fn all() -> Self {
        Facet::ALL.iter().fold(Self::core(), |set, facet| set.with(*facet))
    }

    /// Only the mandatory user facet
    pub fn core() -> Self {
        FacetSet(Facet::User.bit())
    }

    pub fn with(self, facet: Facet) -> Self {
        FacetSet(self.0 | facet.bit())
    }

    /// Drop a secondary facet. The user facet cannot be removed.
    pub fn without(self, facet: Facet) -> Self {
        if facet.is_mandatory() {
            return self;
        }
        FacetSet(self.0 & !facet.bit())
    }

    pub fn contains(&self, facet: Facet) -> bool {
        self.0 & facet.bit() != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Facet> + '_ {
        Facet::ALL.into_iter().filter(move |facet| self.contains(*facet))
    }
}

impl Default for FacetSet {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Debug for FacetSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Facet> for FacetSet {
    fn from_iter<I: IntoIterator<Item = Facet>>(iter: I) -> Self {
        iter.into_iter().fold(Self::core(), |set, facet| set.with(facet))
    }
}

/// Immutable merged result of one refresh cycle
///
/// Built only after every requested facet has settled. A newer snapshot
/// supersedes it; nothing mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSnapshot {
    user: User,
    thumbnail: Option<Thumbnail>,
    hire_date: Option<String>,
    tags: Option<String>,
    manager: Option<BasicUserInfo>,
    direct_reports: Vec<BasicUserInfo>,
    membership_groups: Vec<MembershipGroup>,
    files: Vec<FileMetadata>,
    field_status: BTreeMap<Facet, FieldStatus>,
}

impl ProfileSnapshot {
    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn thumbnail(&self) -> Option<&Thumbnail> {
        self.thumbnail.as_ref()
    }

    /// Hire date formatted for display
    pub fn hire_date(&self) -> Option<&str> {
        self.hire_date.as_deref()
    }

    /// Tags joined for display
    pub fn tags(&self) -> Option<&str> {
        self.tags.as_deref()
    }

    pub fn manager(&self) -> Option<&BasicUserInfo> {
        self.manager.as_ref()
    }

    pub fn direct_reports(&self) -> &[BasicUserInfo] {
        &self.direct_reports
    }

    pub fn membership_groups(&self) -> &[MembershipGroup] {
        &self.membership_groups
    }

    pub fn files(&self) -> &[FileMetadata] {
        &self.files
    }

    pub fn field_status(&self) -> &BTreeMap<Facet, FieldStatus> {
        &self.field_status
    }

    pub fn status(&self, facet: Facet) -> FieldStatus {
        self.field_status
            .get(&facet)
            .copied()
            .unwrap_or(FieldStatus::NotRequested)
    }

    /// Facets whose fetch failed, in facet order
    pub fn failed_facets(&self) -> Vec<Facet> {
        self.field_status
            .iter()
            .filter(|(_, status)| status.is_failed())
            .map(|(facet, _)| *facet)
            .collect()
    }

    /// True when at least one secondary facet failed
    pub fn is_degraded(&self) -> bool {
        self.field_status.values().any(FieldStatus::is_failed)
    }
}

/// Settled result of a single facet fetch
pub(crate) enum FacetOutcome {
    User(Result<User>),
    Photo(Result<Option<Thumbnail>>),
    Manager(Result<Option<BasicUserInfo>>),
    DirectReports(Result<Vec<BasicUserInfo>>),
    MembershipGroups(Result<Vec<MembershipGroup>>),
    Files(Result<Vec<FileMetadata>>),
}

impl FacetOutcome {
    pub(crate) fn facet(&self) -> Facet {
        match self {
            FacetOutcome::User(_) => Facet::User,
            FacetOutcome::Photo(_) => Facet::Photo,
            FacetOutcome::Manager(_) => Facet::Manager,
            FacetOutcome::DirectReports(_) => Facet::DirectReports,
            FacetOutcome::MembershipGroups(_) => Facet::MembershipGroups,
            FacetOutcome::Files(_) => Facet::Files,
        }
    }
}

/// Rejected write from a cycle other than the builder's own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StaleWrite {
    pub(crate) from: CycleToken,
    pub(crate) owner: CycleToken,
}

/// Accumulates facet outcomes for exactly one cycle
pub(crate) struct SnapshotBuilder {
    cycle: CycleToken,
    user_id: String,
    remaining: usize,
    user: Option<std::result::Result<User, String>>,
    thumbnail: Option<Thumbnail>,
    manager: Option<BasicUserInfo>,
    direct_reports: Vec<BasicUserInfo>,
    membership_groups: Vec<MembershipGroup>,
    files: Vec<FileMetadata>,
    field_status: BTreeMap<Facet, FieldStatus>,
}

impl SnapshotBuilder {
    pub(crate) fn new(cycle: CycleToken, user_id: impl Into<String>, requested: FacetSet) -> Self {
        let field_status = Facet::ALL
            .into_iter()
            .filter(|facet| !requested.contains(*facet))
            .map(|facet| (facet, FieldStatus::NotRequested))
            .collect();

        Self {
            cycle,
            user_id: user_id.into(),
            remaining: requested.len(),
            user: None,
            thumbnail: None,
            manager: None,
            direct_reports: Vec::new(),
            membership_groups: Vec::new(),
            files: Vec::new(),
            field_status,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.remaining
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.remaining == 0
    }

    /// Record one settled facet
    ///
    /// Writes tagged with another cycle's token are refused and leave the
    /// builder untouched. A facet settles at most once.
    pub(crate) fn record(
        &mut self,
        cycle: CycleToken,
        outcome: FacetOutcome,
    ) -> std::result::Result<(), StaleWrite> {
        if cycle != self.cycle {
            return Err(StaleWrite { from: cycle, owner: self.cycle });
        }

        let facet = outcome.facet();
        if self.field_status.contains_key(&facet) {
            debug!(facet = %facet, "ignoring duplicate facet outcome");
            return Ok(());
        }

        let status = match outcome {
            FacetOutcome::User(result) => match result {
                Ok(user) => {
                    self.user = Some(Ok(user));
                    FieldStatus::Ok
                }
                Err(err) => {
                    self.user = Some(Err(sanitize_for_logging(&err.to_string())));
                    self.absorb(facet, &err)
                }
            },
            FacetOutcome::Photo(result) => self.settle(facet, result, |b, v| b.thumbnail = v),
            FacetOutcome::Manager(result) => self.settle(facet, result, |b, v| b.manager = v),
            FacetOutcome::DirectReports(result) => self.settle(facet, result, |b, v| b.direct_reports = v),
            FacetOutcome::MembershipGroups(result) => self.settle(facet, result, |b, v| b.membership_groups = v),
            FacetOutcome::Files(result) => self.settle(facet, result, |b, v| b.files = v),
        };

        self.field_status.insert(facet, status);
        self.remaining = self.remaining.saturating_sub(1);
        Ok(())
    }

    fn settle<T>(
        &mut self,
        facet: Facet,
        result: Result<T>,
        assign: impl FnOnce(&mut Self, T),
    ) -> FieldStatus {
        match result {
            Ok(value) => {
                assign(self, value);
                FieldStatus::Ok
            }
            Err(err) => self.absorb(facet, &err),
        }
    }

    fn absorb(&self, facet: Facet, err: &ServiceError) -> FieldStatus {
        let message = sanitize_for_logging(&err.to_string());
        if facet.is_mandatory() {
            warn!(cycle = %self.cycle, facet = %facet, error = %message, "core profile fetch failed");
        } else {
            warn!(cycle = %self.cycle, facet = %facet, error = %message, "facet fetch failed, rendering degraded");
        }
        FieldStatus::Failed
    }

    /// Resolve the cycle: a snapshot, or the core failure
    pub(crate) fn finish(self) -> std::result::Result<ProfileSnapshot, RefreshError> {
        let user = match self.user {
            Some(Ok(user)) => user,
            Some(Err(reason)) => {
                return Err(RefreshError::CoreProfileUnavailable {
                    user_id: self.user_id,
                    reason,
                })
            }
            None => {
                return Err(RefreshError::CoreProfileUnavailable {
                    user_id: self.user_id,
                    reason: "core profile fetch did not settle".to_string(),
                })
            }
        };

        Ok(ProfileSnapshot {
            hire_date: user.hire_date.as_deref().and_then(display_hire_date),
            tags: display_tags(&user.tags),
            user,
            thumbnail: self.thumbnail,
            manager: self.manager,
            direct_reports: self.direct_reports,
            membership_groups: self.membership_groups,
            files: self.files,
            field_status: self.field_status,
        })
    }
}

/// RFC 3339 dates render as "March 4, 2019"; anything else passes through
fn display_hire_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match DateTime::parse_from_rfc3339(raw) {
        Ok(date) => Some(date.format("%B %-d, %Y").to_string()),
        Err(_) => Some(raw.to_string()),
    }
}

fn display_tags(tags: &[String]) -> Option<String> {
    let joined = tags
        .iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}
