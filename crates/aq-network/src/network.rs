//! The network container: arena-owned nodes and links plus the tables
//! (curves, patterns, schedules, controls) they reference by index.

use crate::control::Control;
use crate::curve::Curve;
use crate::error::{NetworkError, NetworkResult};
use crate::link::{Link, LinkKind};
use crate::node::{Node, NodeKind};
use crate::options::Options;
use crate::pattern::Pattern;
use crate::schedule::Schedule;
use crate::valve::ValveKind;
use aq_core::{CurveId, LinkId, NodeId, PatternId, ScheduleId, Units};
use std::collections::HashMap;

/// Everything the solvers operate on. The network exclusively owns all
/// elements; collaborators address them through 32-bit ids.
#[derive(Debug, Default)]
pub struct Network {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub curves: Vec<Curve>,
    pub patterns: Vec<Pattern>,
    pub schedules: Vec<Schedule>,
    pub controls: Vec<Control>,
    pub options: Options,

    node_names: HashMap<String, NodeId>,
    link_names: HashMap<String, LinkId>,
    curve_names: HashMap<String, CurveId>,
    pattern_names: HashMap<String, PatternId>,
    schedule_names: HashMap<String, ScheduleId>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- construction ------------------------------------------------

    pub fn add_node(&mut self, node: Node) -> NetworkResult<NodeId> {
        if self.node_names.contains_key(&node.name) {
            return Err(NetworkError::DuplicateName {
                kind: "node",
                name: node.name,
            });
        }
        let id = NodeId::from_index(self.nodes.len() as u32);
        self.node_names.insert(node.name.clone(), id);
        self.nodes.push(node);
        Ok(id)
    }

    pub fn add_link(&mut self, link: Link) -> NetworkResult<LinkId> {
        if self.link_names.contains_key(&link.name) {
            return Err(NetworkError::DuplicateName {
                kind: "link",
                name: link.name,
            });
        }
        let id = LinkId::from_index(self.links.len() as u32);
        self.link_names.insert(link.name.clone(), id);
        self.links.push(link);
        Ok(id)
    }

    pub fn add_curve(&mut self, curve: Curve) -> NetworkResult<CurveId> {
        if let Some(&id) = self.curve_names.get(&curve.name) {
            return Ok(id); // points accumulate onto the existing curve
        }
        let id = CurveId::from_index(self.curves.len() as u32);
        self.curve_names.insert(curve.name.clone(), id);
        self.curves.push(curve);
        Ok(id)
    }

    pub fn add_pattern(&mut self, pattern: Pattern) -> NetworkResult<PatternId> {
        if let Some(&id) = self.pattern_names.get(&pattern.name) {
            return Ok(id);
        }
        let id = PatternId::from_index(self.patterns.len() as u32);
        self.pattern_names.insert(pattern.name.clone(), id);
        self.patterns.push(pattern);
        Ok(id)
    }

    pub fn add_schedule(&mut self, schedule: Schedule) -> NetworkResult<ScheduleId> {
        if self.schedule_names.contains_key(&schedule.name) {
            return Err(NetworkError::DuplicateName {
                kind: "schedule",
                name: schedule.name,
            });
        }
        let id = ScheduleId::from_index(self.schedules.len() as u32);
        self.schedule_names.insert(schedule.name.clone(), id);
        self.schedules.push(schedule);
        Ok(id)
    }

    // ---- lookups -----------------------------------------------------

    pub fn node_id(&self, name: &str) -> NetworkResult<NodeId> {
        self.node_names
            .get(name)
            .copied()
            .ok_or_else(|| NetworkError::UnknownName {
                kind: "node",
                name: name.to_string(),
            })
    }

    pub fn link_id(&self, name: &str) -> NetworkResult<LinkId> {
        self.link_names
            .get(name)
            .copied()
            .ok_or_else(|| NetworkError::UnknownName {
                kind: "link",
                name: name.to_string(),
            })
    }

    pub fn curve_id(&self, name: &str) -> NetworkResult<CurveId> {
        self.curve_names
            .get(name)
            .copied()
            .ok_or_else(|| NetworkError::UnknownName {
                kind: "curve",
                name: name.to_string(),
            })
    }

    pub fn pattern_id(&self, name: &str) -> NetworkResult<PatternId> {
        self.pattern_names
            .get(name)
            .copied()
            .ok_or_else(|| NetworkError::UnknownName {
                kind: "pattern",
                name: name.to_string(),
            })
    }

    pub fn schedule_id(&self, name: &str) -> NetworkResult<ScheduleId> {
        self.schedule_names
            .get(name)
            .copied()
            .ok_or_else(|| NetworkError::UnknownName {
                kind: "schedule",
                name: name.to_string(),
            })
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.idx()]
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.idx()]
    }

    pub fn units(&self) -> Units {
        self.options.units()
    }

    // ---- counts ------------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn junction_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Junction(_)))
            .count()
    }

    pub fn tank_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Tank(_)))
            .count()
    }

    pub fn reservoir_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Reservoir(_)))
            .count()
    }

    pub fn valve_count(&self) -> usize {
        self.links
            .iter()
            .filter(|l| matches!(l.kind, LinkKind::Valve(_)))
            .count()
    }

    pub fn dprv_ids(&self) -> Vec<LinkId> {
        self.links
            .iter()
            .enumerate()
            .filter(|(_, l)| matches!(l.as_valve().map(|v| v.kind), Some(ValveKind::Dprv)))
            .map(|(i, _)| LinkId::from_index(i as u32))
            .collect()
    }

    // ---- lifecycle ---------------------------------------------------

    /// Convert every element from user to internal units and precompute
    /// derived coefficients. Call once after loading.
    pub fn convert_units(&mut self) {
        let units = self.units();
        let opts = self.options.clone();
        for node in &mut self.nodes {
            node.convert_units(&units, opts.emitter_exponent);
        }
        // split borrow: links need the (already converted) curve table
        let curves = std::mem::take(&mut self.curves);
        for link in &mut self.links {
            link.convert_units(&curves, &units, &opts);
        }
        self.curves = curves;
        // pressure valves reference an endpoint elevation
        for link in &mut self.links {
            let elev_from = self.nodes[link.from.idx()].elevation;
            let elev_to = self.nodes[link.to.idx()].elevation;
            if let Some(v) = link.as_valve_mut() {
                v.elev = match v.kind {
                    ValveKind::Psv => elev_from,
                    _ => elev_to,
                };
            }
        }
    }

    /// Structural diagnostics before the first solve.
    pub fn validate(&self) -> NetworkResult<()> {
        if self.nodes.is_empty() || self.links.is_empty() {
            return Err(NetworkError::EmptyNetwork);
        }
        if !self.nodes.iter().any(|n| n.is_fixed_grade()) {
            return Err(NetworkError::NoFixedGrade);
        }
        let mut degree = vec![0usize; self.nodes.len()];
        for link in &self.links {
            degree[link.from.idx()] += 1;
            degree[link.to.idx()] += 1;
        }
        if let Some(i) = degree.iter().position(|&d| d == 0) {
            return Err(NetworkError::NodeWithoutLinks {
                name: self.nodes[i].name.clone(),
            });
        }
        // every node must reach a fixed-grade node through some path
        let adjacency = self.adjacency();
        let mut reached = vec![false; self.nodes.len()];
        let mut stack: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_fixed_grade())
            .map(|(i, _)| i)
            .collect();
        for &i in &stack {
            reached[i] = true;
        }
        while let Some(i) = stack.pop() {
            for &(lid, _) in &adjacency[i] {
                let link = &self.links[lid.idx()];
                for other in [link.from.idx(), link.to.idx()] {
                    if !reached[other] {
                        reached[other] = true;
                        stack.push(other);
                    }
                }
            }
        }
        if let Some(i) = reached.iter().position(|&r| !r) {
            return Err(NetworkError::Disconnected {
                name: self.nodes[i].name.clone(),
            });
        }
        Ok(())
    }

    /// Per-node incident links with flow sign (+1 when the link points
    /// into the node).
    pub fn adjacency(&self) -> Vec<Vec<(LinkId, f64)>> {
        let mut adj = vec![Vec::new(); self.nodes.len()];
        for (i, link) in self.links.iter().enumerate() {
            let id = LinkId::from_index(i as u32);
            adj[link.from.idx()].push((id, -1.0));
            adj[link.to.idx()].push((id, 1.0));
        }
        adj
    }

    /// Reset all transient state to start-of-simulation values.
    pub fn initialize(&mut self, init_flows: bool) -> NetworkResult<()> {
        let units = self.units();
        let curves = std::mem::take(&mut self.curves);
        let mut result = Ok(());
        for node in &mut self.nodes {
            if let Err(e) = node.initialize(&curves, &units) {
                result = Err(e);
                break;
            }
        }
        self.curves = curves;
        result?;
        for link in &mut self.links {
            link.initialize(init_flows);
        }
        Ok(())
    }

    /// Total leakage of the current step in internal cfs.
    pub fn total_leakage(&self) -> f64 {
        self.links.iter().map(|l| l.leakage).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::Pipe;

    fn two_node_net() -> Network {
        let mut net = Network::new();
        let r = net.add_node(Node::reservoir("R1", 100.0)).unwrap();
        let j = net.add_node(Node::junction("J1", 0.0)).unwrap();
        net.add_link(Link::pipe("P1", r, j, Pipe::new(1000.0, 130.0)))
            .unwrap();
        net
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut net = two_node_net();
        assert!(net.add_node(Node::junction("J1", 5.0)).is_err());
        let r = net.node_id("R1").unwrap();
        let j = net.node_id("J1").unwrap();
        assert!(net
            .add_link(Link::pipe("P1", r, j, Pipe::new(10.0, 100.0)))
            .is_err());
    }

    #[test]
    fn validate_passes_simple_net() {
        let net = two_node_net();
        assert!(net.validate().is_ok());
    }

    #[test]
    fn validate_catches_isolated_node() {
        let mut net = two_node_net();
        net.add_node(Node::junction("J2", 0.0)).unwrap();
        assert!(matches!(
            net.validate(),
            Err(NetworkError::NodeWithoutLinks { .. })
        ));
    }

    #[test]
    fn validate_requires_fixed_grade() {
        let mut net = Network::new();
        let a = net.add_node(Node::junction("A", 0.0)).unwrap();
        let b = net.add_node(Node::junction("B", 0.0)).unwrap();
        net.add_link(Link::pipe("P1", a, b, Pipe::new(10.0, 100.0)))
            .unwrap();
        assert!(matches!(net.validate(), Err(NetworkError::NoFixedGrade)));
    }

    #[test]
    fn validate_catches_disconnected_island() {
        let mut net = two_node_net();
        let a = net.add_node(Node::junction("A", 0.0)).unwrap();
        let b = net.add_node(Node::junction("B", 0.0)).unwrap();
        net.add_link(Link::pipe("P9", a, b, Pipe::new(10.0, 100.0)))
            .unwrap();
        assert!(matches!(
            net.validate(),
            Err(NetworkError::Disconnected { .. })
        ));
    }

    #[test]
    fn adjacency_signs() {
        let net = two_node_net();
        let adj = net.adjacency();
        assert_eq!(adj[0].len(), 1);
        assert_eq!(adj[0][0].1, -1.0); // link leaves the reservoir
        assert_eq!(adj[1][0].1, 1.0); // and enters the junction
    }
}
