//! Forking sequences of timed samples.
//!
//! A [`DiscreteTrajectory`] is an arena of branches. The root branch owns the
//! oldest samples; every other branch was forked from a sample of its parent
//! and shares the parent's history up to and including that sample without
//! copying it. Branches only grow, so a fork point never moves.

use std::fmt;
use std::sync::Arc;

use bevy::math::DVec3;

use crate::types::{DegreesOfFreedom, TimedDegreesOfFreedom};

/// Extra acceleration acting on a trajectory, as a function of time and
/// position (e.g. thrust or drag models).
pub type IntrinsicAcceleration = Arc<dyn Fn(f64, DVec3) -> DVec3 + Send + Sync>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DiscreteTrajectoryError {
    #[error("no branch with id {0}")]
    UnknownBranch(usize),

    #[error("sample time {time} is not after the last sample at {last}")]
    NonMonotonicTime { time: f64, last: f64 },

    #[error("no sample at t = {time} to fork from")]
    NoSampleAt { time: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchId(usize);

impl BranchId {
    pub const ROOT: BranchId = BranchId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Where a branch attaches to its parent.
#[derive(Clone, Copy, Debug)]
struct Fork {
    parent: BranchId,
    /// Number of the parent's own samples shared with the child.
    shared: usize,
}

#[derive(Clone, Debug, Default)]
struct Branch {
    fork: Option<Fork>,
    /// Total number of samples inherited through the fork.
    inherited: usize,
    samples: Vec<TimedDegreesOfFreedom>,
}

#[derive(Clone, Default)]
pub struct DiscreteTrajectory {
    branches: Vec<Branch>,
    intrinsic_acceleration: Option<IntrinsicAcceleration>,
}

impl fmt::Debug for DiscreteTrajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscreteTrajectory")
            .field("branches", &self.branches)
            .field("has_intrinsic_acceleration", &self.intrinsic_acceleration.is_some())
            .finish()
    }
}

impl DiscreteTrajectory {
    /// An empty trajectory with a root branch.
    pub fn new() -> Self {
        Self {
            branches: vec![Branch::default()],
            intrinsic_acceleration: None,
        }
    }

    pub fn with_intrinsic_acceleration<F>(acceleration: F) -> Self
    where
        F: Fn(f64, DVec3) -> DVec3 + Send + Sync + 'static,
    {
        let mut trajectory = Self::new();
        trajectory.set_intrinsic_acceleration(Some(Arc::new(acceleration)));
        trajectory
    }

    pub fn set_intrinsic_acceleration(&mut self, acceleration: Option<IntrinsicAcceleration>) {
        self.intrinsic_acceleration = acceleration;
    }

    pub fn intrinsic_acceleration(&self) -> Option<&IntrinsicAcceleration> {
        self.intrinsic_acceleration.as_ref()
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    fn branch(&self, id: BranchId) -> Result<&Branch, DiscreteTrajectoryError> {
        self.branches.get(id.0).ok_or(DiscreteTrajectoryError::UnknownBranch(id.0))
    }

    /// Own sample runs of `id` and its ancestors, oldest first.
    fn runs(&self, id: BranchId) -> Result<Vec<&[TimedDegreesOfFreedom]>, DiscreteTrajectoryError> {
        let branch = self.branch(id)?;
        let mut runs = vec![branch.samples.as_slice()];
        let mut fork = branch.fork;
        while let Some(Fork { parent, shared }) = fork {
            let parent = &self.branches[parent.0];
            runs.push(&parent.samples[..shared]);
            fork = parent.fork;
        }
        runs.reverse();
        Ok(runs)
    }

    /// Every sample of the branch, inherited history first.
    pub fn iter(&self, id: BranchId) -> Result<impl Iterator<Item = &TimedDegreesOfFreedom> + '_, DiscreteTrajectoryError> {
        Ok(self.runs(id)?.into_iter().flatten())
    }

    pub fn len(&self, id: BranchId) -> Result<usize, DiscreteTrajectoryError> {
        let branch = self.branch(id)?;
        Ok(branch.inherited + branch.samples.len())
    }

    pub fn is_empty(&self, id: BranchId) -> Result<bool, DiscreteTrajectoryError> {
        Ok(self.len(id)? == 0)
    }

    pub fn last(&self, id: BranchId) -> Result<Option<&TimedDegreesOfFreedom>, DiscreteTrajectoryError> {
        let branch = self.branch(id)?;
        if let Some(last) = branch.samples.last() {
            return Ok(Some(last));
        }
        let mut fork = branch.fork;
        while let Some(Fork { parent, shared }) = fork {
            let parent = &self.branches[parent.0];
            if shared > 0 {
                return Ok(Some(&parent.samples[shared - 1]));
            }
            fork = parent.fork;
        }
        Ok(None)
    }

    /// Append a sample strictly after the last one of the branch.
    pub fn append(
        &mut self,
        id: BranchId,
        time: f64,
        degrees_of_freedom: DegreesOfFreedom,
    ) -> Result<(), DiscreteTrajectoryError> {
        let last = self.last(id)?.map(|l| l.time);
        if let Some(last) = last.filter(|&last| time <= last) {
            return Err(DiscreteTrajectoryError::NonMonotonicTime { time, last });
        }
        self.branches[id.0]
            .samples
            .push(TimedDegreesOfFreedom::new(time, degrees_of_freedom));
        Ok(())
    }

    /// Create a branch sharing the history of `id` up to and including the
    /// sample at `time`.
    pub fn fork_at(&mut self, id: BranchId, time: f64) -> Result<BranchId, DiscreteTrajectoryError> {
        let mut owner = id;
        let mut limit = self.branch(id)?.samples.len();
        let (owner, index) = loop {
            let branch = &self.branches[owner.0];
            if let Ok(index) = branch.samples[..limit].binary_search_by(|p| p.time.total_cmp(&time)) {
                break (owner, index);
            }
            match branch.fork {
                Some(Fork { parent, shared }) => {
                    owner = parent;
                    limit = shared;
                }
                None => return Err(DiscreteTrajectoryError::NoSampleAt { time }),
            }
        };

        let new_id = BranchId(self.branches.len());
        let inherited = self.branches[owner.0].inherited + index + 1;
        self.branches.push(Branch {
            fork: Some(Fork {
                parent: owner,
                shared: index + 1,
            }),
            inherited,
            samples: Vec::new(),
        });
        Ok(new_id)
    }

    /// Time of the sample a branch was forked at; `None` for the root.
    pub fn fork_time(&self, id: BranchId) -> Result<Option<f64>, DiscreteTrajectoryError> {
        Ok(self
            .branch(id)?
            .fork
            .map(|Fork { parent, shared }| self.branches[parent.0].samples[shared - 1].time))
    }

    pub fn branch_mut(&mut self, id: BranchId) -> Result<BranchMut<'_>, DiscreteTrajectoryError> {
        self.branch(id)?;
        Ok(BranchMut {
            trajectory: self,
            branch: id,
        })
    }

    pub fn root_mut(&mut self) -> BranchMut<'_> {
        BranchMut {
            trajectory: self,
            branch: BranchId::ROOT,
        }
    }
}

/// Exclusive handle on one branch, the unit flows append to.
pub struct BranchMut<'a> {
    trajectory: &'a mut DiscreteTrajectory,
    branch: BranchId,
}

impl BranchMut<'_> {
    pub fn id(&self) -> BranchId {
        self.branch
    }

    pub fn trajectory(&self) -> &DiscreteTrajectory {
        self.trajectory
    }

    pub fn append(&mut self, time: f64, degrees_of_freedom: DegreesOfFreedom) -> Result<(), DiscreteTrajectoryError> {
        self.trajectory.append(self.branch, time, degrees_of_freedom)
    }

    pub fn last(&self) -> Option<&TimedDegreesOfFreedom> {
        self.trajectory.last(self.branch).ok().flatten()
    }

    pub fn len(&self) -> usize {
        self.trajectory.len(self.branch).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimedDegreesOfFreedom> + '_ {
        self.trajectory
            .runs(self.branch)
            .unwrap_or_default()
            .into_iter()
            .flatten()
    }

    pub fn intrinsic_acceleration(&self) -> Option<IntrinsicAcceleration> {
        self.trajectory.intrinsic_acceleration.clone()
    }
}
