//! Optional tab-separated trace files written while stepping.

use crate::error::ProjectResult;
use crate::report::format_clock;
use aq_network::Network;
use aq_core::{LinkId, NodeId, Quantity};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Pressure/flow trace: one line per step with the configured nodes'
/// pressures, links' flows, and the network-wide leakage total.
pub struct PressureFlowTrace {
    file: BufWriter<File>,
    nodes: Vec<NodeId>,
    links: Vec<LinkId>,
}

impl PressureFlowTrace {
    pub fn create(path: &Path, net: &Network) -> ProjectResult<Self> {
        let nodes: Vec<NodeId> = net
            .options
            .trace
            .nodes
            .iter()
            .filter_map(|n| net.node_id(n).ok())
            .collect();
        let links: Vec<LinkId> = net
            .options
            .trace
            .links
            .iter()
            .filter_map(|l| net.link_id(l).ok())
            .collect();
        let mut file = BufWriter::new(File::create(path)?);
        write!(file, "Time")?;
        for id in &links {
            write!(file, "\tFlow_{}", net.link(*id).name)?;
        }
        for id in &nodes {
            write!(file, "\tPressure_{}", net.node(*id).name)?;
        }
        writeln!(file, "\tLeakage")?;
        Ok(Self { file, nodes, links })
    }

    pub fn write_step(&mut self, net: &Network, t: u64) -> ProjectResult<()> {
        let units = net.units();
        write!(self.file, "{}", format_clock(t))?;
        for id in &self.links {
            let q = units.to_user(Quantity::Flow, net.link(*id).flow);
            write!(self.file, "\t{q:.4}")?;
        }
        for id in &self.nodes {
            let p = units.to_user(Quantity::Pressure, net.node(*id).pressure());
            write!(self.file, "\t{p:.4}")?;
        }
        let leak = units.to_user(Quantity::Flow, net.total_leakage());
        writeln!(self.file, "\t{leak:.4}")?;
        Ok(())
    }

    pub fn flush(&mut self) -> ProjectResult<()> {
        self.file.flush()?;
        Ok(())
    }
}

/// Valve-opening trace: one line per step with each DPRV's `Xm`.
pub struct ValveOpeningTrace {
    file: BufWriter<File>,
}

impl ValveOpeningTrace {
    pub fn create(path: &Path, net: &Network) -> ProjectResult<Self> {
        let mut file = BufWriter::new(File::create(path)?);
        write!(file, "Time")?;
        for id in net.dprv_ids() {
            write!(file, "\tXm_{}", net.link(id).name)?;
        }
        writeln!(file)?;
        Ok(Self { file })
    }

    pub fn write_step(&mut self, net: &Network, t: u64) -> ProjectResult<()> {
        write!(self.file, "{}", format_clock(t))?;
        for id in net.dprv_ids() {
            let xm = net
                .link(id)
                .as_valve()
                .map(|v| v.dprv.xm)
                .unwrap_or(0.0);
            write!(self.file, "\t{xm:.6}")?;
        }
        writeln!(self.file)?;
        Ok(())
    }

    pub fn flush(&mut self) -> ProjectResult<()> {
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_network::{Link, Modulation, Node, Pipe, Valve, ValveKind};
    use std::env;

    #[test]
    fn traces_write_lines() {
        let mut net = Network::new();
        let r = net.add_node(Node::reservoir("R", 100.0)).unwrap();
        let j1 = net.add_node(Node::junction("J1", 0.0)).unwrap();
        let j2 = net.add_node(Node::junction("J2", 0.0)).unwrap();
        net.add_link(Link::pipe("P1", r, j1, Pipe::new(100.0, 130.0)))
            .unwrap();
        let mut v = Valve::new(ValveKind::Dprv);
        v.modulation = Some(Modulation::FixedOutlet { pressure: 30.0 });
        net.add_link(Link::valve("V1", j1, j2, v)).unwrap();
        net.options.trace.nodes.push("J2".into());
        net.options.trace.links.push("P1".into());

        let dir = env::temp_dir();
        let pf = dir.join(format!("aquanet-pftrace-{}", std::process::id()));
        let xm = dir.join(format!("aquanet-xmtrace-{}", std::process::id()));
        {
            let mut t1 = PressureFlowTrace::create(&pf, &net).unwrap();
            t1.write_step(&net, 0).unwrap();
            t1.write_step(&net, 3600).unwrap();
            t1.flush().unwrap();
            let mut t2 = ValveOpeningTrace::create(&xm, &net).unwrap();
            t2.write_step(&net, 0).unwrap();
            t2.flush().unwrap();
        }
        let text = std::fs::read_to_string(&pf).unwrap();
        assert!(text.starts_with("Time\tFlow_P1\tPressure_J2\tLeakage"));
        assert_eq!(text.lines().count(), 3);
        let text = std::fs::read_to_string(&xm).unwrap();
        assert!(text.starts_with("Time\tXm_V1"));
        std::fs::remove_file(&pf).ok();
        std::fs::remove_file(&xm).ok();
    }
}
