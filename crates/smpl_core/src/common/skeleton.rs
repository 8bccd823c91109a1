use crate::error::{SmplError, SmplResult};

/// Kinematic hierarchy stored as a flat parent array.
///
/// Invariant: ``parents[i] < i`` for every ``i > 0``, so a single ascending
/// pass visits every parent before its children. Entry 0 is the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Skeleton {
    parents: Vec<usize>,
    joint_names: Option<Vec<String>>,
}

impl Skeleton {
    /// Builds a skeleton from raw parent indices as found in a kintree table.
    /// The root entry may be itself, a negative sentinel or any out-of-range
    /// sentinel (e.g. ``u32::MAX``).
    pub fn new(raw_parents: &[i64]) -> SmplResult<Self> {
        if raw_parents.is_empty() {
            return Err(SmplError::InvalidSkeleton("the skeleton has no joints".to_string()));
        }
        let num_joints = raw_parents.len();
        let root = raw_parents[0];
        if (1..num_joints as i64).contains(&root) {
            return Err(SmplError::InvalidSkeleton(format!("root joint has parent {root}")));
        }
        let mut parents = Vec::with_capacity(num_joints);
        parents.push(0);
        for (idx, &parent) in raw_parents.iter().enumerate().skip(1) {
            let parent = usize::try_from(parent).map_err(|_| SmplError::InvalidSkeleton(format!("joint {idx} has negative parent {parent}")))?;
            if parent >= idx {
                return Err(SmplError::InvalidSkeleton(format!(
                    "joint {idx} has parent {parent}; parents must precede their children"
                )));
            }
            parents.push(parent);
        }
        Ok(Self { parents, joint_names: None })
    }

    #[must_use]
    pub fn with_joint_names(mut self, names: &[&str]) -> Self {
        if names.len() == self.parents.len() {
            self.joint_names = Some(names.iter().map(std::string::ToString::to_string).collect());
        }
        self
    }

    /// Parent of every joint; the root maps to itself
    pub fn parents(&self) -> &[usize] {
        &self.parents
    }

    pub fn parent(&self, joint: usize) -> Option<usize> {
        (joint > 0 && joint < self.parents.len()).then(|| self.parents[joint])
    }

    pub fn num_joints(&self) -> usize {
        self.parents.len()
    }

    pub fn joint_names(&self) -> Option<&[String]> {
        self.joint_names.as_deref()
    }

    /// Chain of joints from `joint` up to the root, `joint` first
    pub fn chain_to_root(&self, joint: usize) -> Vec<usize> {
        let mut chain = vec![joint];
        let mut cur = joint;
        while let Some(parent) = self.parent(cur) {
            chain.push(parent);
            cur = parent;
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_root_markers() {
        for root in [-1, 0, i64::from(u32::MAX)] {
            let skeleton = Skeleton::new(&[root, 0, 1, 1]).unwrap();
            assert_eq!(skeleton.parents(), &[0, 0, 1, 1]);
        }
    }

    #[test]
    fn rejects_children_before_parents() {
        assert!(matches!(Skeleton::new(&[-1, 2, 0]), Err(SmplError::InvalidSkeleton(_))));
        assert!(matches!(Skeleton::new(&[-1, 1]), Err(SmplError::InvalidSkeleton(_))));
        assert!(matches!(Skeleton::new(&[-1, -3]), Err(SmplError::InvalidSkeleton(_))));
        assert!(matches!(Skeleton::new(&[]), Err(SmplError::InvalidSkeleton(_))));
    }

    #[test]
    fn rejects_root_with_in_range_parent() {
        assert!(matches!(Skeleton::new(&[1, 0]), Err(SmplError::InvalidSkeleton(_))));
    }

    #[test]
    fn chain_walks_up_to_root() {
        let skeleton = Skeleton::new(&[-1, 0, 1, 2, 1]).unwrap();
        assert_eq!(skeleton.chain_to_root(3), vec![3, 2, 1, 0]);
        assert_eq!(skeleton.chain_to_root(4), vec![4, 1, 0]);
        assert_eq!(skeleton.parent(0), None);
    }
}
