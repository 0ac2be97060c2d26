//! Assignment of loss terms and calibrations to worker ranks.
//!
//! Loss terms are grouped as `[Auto]`, `[TemplateCross]` and
//! `[DataCross, VarianceMatch]`; group `g` belongs to rank `g mod size`.
//! Ranks beyond the last group own nothing but still join every collective.
//! This is the only place where behavior depends on the rank.

use super::WorkerIdentity;
use crate::calibration::CalibrationKind;
use crate::loss::LossRole;

/// Loss groups in rank-assignment order.
pub const LOSS_GROUPS: [&[LossRole]; 3] = [
    &[LossRole::Auto],
    &[LossRole::TemplateCross],
    &[LossRole::DataCross, LossRole::VarianceMatch],
];

/// The share of the work owned by one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    identity: WorkerIdentity,
    roles: Vec<LossRole>,
}

fn group_owner(group: usize, size: usize) -> usize {
    group % size
}

impl Partition {
    pub fn for_worker(identity: WorkerIdentity) -> Self {
        let roles = LOSS_GROUPS
            .iter()
            .enumerate()
            .filter(|(group, _)| group_owner(*group, identity.size()) == identity.rank())
            .flat_map(|(_, roles)| roles.iter().copied())
            .collect();
        Self { identity, roles }
    }

    pub fn identity(&self) -> WorkerIdentity {
        self.identity
    }

    /// Loss roles optimized by this worker, in group order.
    pub fn roles(&self) -> &[LossRole] {
        &self.roles
    }

    pub fn owns(&self, role: LossRole) -> bool {
        self.roles.contains(&role)
    }

    /// True for workers that only take part in collectives.
    pub fn is_idle(&self) -> bool {
        self.roles.is_empty()
    }

    /// Calibrations this worker must compute, in `Auto, Cross, Data` order.
    pub fn calibrations(&self) -> Vec<CalibrationKind> {
        CalibrationKind::ALL
            .into_iter()
            .filter(|kind| self.needs(*kind))
            .collect()
    }

    pub fn needs(&self, kind: CalibrationKind) -> bool {
        self.roles.iter().any(|role| role.calibrations().contains(&kind))
    }

    /// Whether this worker is the single writer of `kind`'s artifacts: the
    /// owner of the first group that needs the calibration.
    pub fn writes_calibration(&self, kind: CalibrationKind) -> bool {
        LOSS_GROUPS
            .iter()
            .position(|roles| roles.iter().any(|role| role.calibrations().contains(&kind)))
            .is_some_and(|group| group_owner(group, self.identity.size()) == self.identity.rank())
    }

    /// Whether this worker writes the artifacts shared by the whole group.
    pub fn writes_shared_artifacts(&self) -> bool {
        self.identity.is_root()
    }

    /// Whether this worker forwards progress events and returns the run summary.
    pub fn reports_progress(&self) -> bool {
        self.writes_shared_artifacts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(rank: usize, size: usize) -> Partition {
        Partition::for_worker(WorkerIdentity::new(rank, size).unwrap())
    }

    #[test]
    fn test_single_worker_owns_everything() {
        let p = partition(0, 1);
        assert_eq!(p.roles(), &LossRole::ALL);
        assert_eq!(p.calibrations(), CalibrationKind::ALL.to_vec());
        assert!(CalibrationKind::ALL.iter().all(|k| p.writes_calibration(*k)));
    }

    #[test]
    fn test_three_workers_split_groups() {
        assert_eq!(partition(0, 3).roles(), &[LossRole::Auto]);
        assert_eq!(partition(1, 3).calibrations(), vec![CalibrationKind::Cross]);
        let data = partition(2, 3);
        assert_eq!(data.roles(), &[LossRole::DataCross, LossRole::VarianceMatch]);
        assert_eq!(data.calibrations(), vec![CalibrationKind::Auto, CalibrationKind::Data]);
        // Auto is computed by ranks 0 and 2 but written only by rank 0
        assert!(!data.writes_calibration(CalibrationKind::Auto));
        assert!(data.writes_calibration(CalibrationKind::Data));
    }

    #[test]
    fn test_two_workers_wrap_around() {
        let root = partition(0, 2);
        assert_eq!(root.roles(), &[LossRole::Auto, LossRole::DataCross, LossRole::VarianceMatch]);
        assert_eq!(partition(1, 2).roles(), &[LossRole::TemplateCross]);
    }

    #[test]
    fn test_extra_workers_are_idle() {
        let extra = partition(4, 5);
        assert!(extra.is_idle());
        assert!(extra.calibrations().is_empty());
        assert!(!extra.writes_shared_artifacts());
        assert!(partition(0, 5).writes_shared_artifacts());
    }

    #[test]
    fn test_only_the_root_reports_progress() {
        let reporters: Vec<usize> = (0..4).filter(|rank| partition(*rank, 4).reports_progress()).collect();
        assert_eq!(reporters, vec![0]);
        assert!(partition(0, 1).reports_progress());
    }
}
