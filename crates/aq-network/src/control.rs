//! Declarative operating rules evaluated at hydraulic step boundaries.

use crate::link::LinkStatus;
use aq_core::{LinkId, NodeId};
use serde::{Deserialize, Serialize};

/// What a fired rule does to its link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControlAction {
    Status(LinkStatus),
    Setting(f64),
}

/// When a rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControlCondition {
    /// At an absolute simulation time (s).
    AtTime(u64),
    /// Whenever the node's head exceeds the threshold (internal ft).
    NodeAbove { node: NodeId, head: f64 },
    /// Whenever the node's head drops below the threshold (internal ft).
    NodeBelow { node: NodeId, head: f64 },
}

/// One operating rule: "LINK x <action> IF/AT <condition>".
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub link: LinkId,
    pub action: ControlAction,
    pub condition: ControlCondition,
}

impl Control {
    /// Whether the rule fires at time `t` given current nodal heads.
    pub fn is_triggered(&self, t: u64, heads: &[f64]) -> bool {
        match self.condition {
            ControlCondition::AtTime(when) => t == when,
            ControlCondition::NodeAbove { node, head } => heads[node.idx()] > head,
            ControlCondition::NodeBelow { node, head } => heads[node.idx()] < head,
        }
    }

    /// Seconds until a time-based rule fires, if it is still ahead.
    pub fn time_until_fire(&self, t: u64) -> Option<u64> {
        match self.condition {
            ControlCondition::AtTime(when) if when > t => Some(when - t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_core::Id;

    #[test]
    fn time_rule_fires_once() {
        let c = Control {
            link: Id::from_index(0),
            action: ControlAction::Status(LinkStatus::Closed),
            condition: ControlCondition::AtTime(7200),
        };
        assert!(!c.is_triggered(3600, &[]));
        assert!(c.is_triggered(7200, &[]));
        assert_eq!(c.time_until_fire(3600), Some(3600));
        assert_eq!(c.time_until_fire(7200), None);
    }

    #[test]
    fn level_rule_compares_heads() {
        let c = Control {
            link: Id::from_index(0),
            action: ControlAction::Setting(0.5),
            condition: ControlCondition::NodeAbove {
                node: Id::from_index(1),
                head: 120.0,
            },
        };
        assert!(c.is_triggered(0, &[0.0, 125.0]));
        assert!(!c.is_triggered(0, &[0.0, 115.0]));
    }
}
