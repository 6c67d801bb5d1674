//! Plain-text report writer.

use crate::error::ProjectResult;
use crate::output::{status_from_code, OutputContents};
use aq_network::Network;
use std::io::Write;

/// Seconds to `H:MM:SS` for report timestamps.
pub fn format_clock(t: u64) -> String {
    format!("{}:{:02}:{:02}", t / 3600, (t % 3600) / 60, t % 60)
}

pub struct ReportWriter<'a, W: Write> {
    out: &'a mut W,
}

impl<'a, W: Write> ReportWriter<'a, W> {
    pub fn new(out: &'a mut W) -> Self {
        Self { out }
    }

    pub fn write_heading(&mut self) -> ProjectResult<()> {
        writeln!(self.out, "{:=^72}", "")?;
        writeln!(self.out, "{: ^72}", "AquaNet Hydraulic Simulator")?;
        writeln!(
            self.out,
            "{: ^72}",
            "Water distribution analysis with dynamic pressure management"
        )?;
        writeln!(self.out, "{:=^72}", "")?;
        Ok(())
    }

    pub fn write_summary(&mut self, inp_name: &str, net: &Network, title: &str) -> ProjectResult<()> {
        writeln!(self.out)?;
        if !title.is_empty() {
            writeln!(self.out, "{title}")?;
        }
        writeln!(self.out, "Input file .............. {inp_name}")?;
        writeln!(self.out, "Number of junctions ..... {}", net.junction_count())?;
        writeln!(self.out, "Number of reservoirs .... {}", net.reservoir_count())?;
        writeln!(self.out, "Number of tanks ......... {}", net.tank_count())?;
        writeln!(
            self.out,
            "Number of pipes ......... {}",
            net.links.len() - net.valve_count()
        )?;
        writeln!(self.out, "Number of valves ........ {}", net.valve_count())?;
        writeln!(
            self.out,
            "Flow units .............. {}",
            net.options.flow_units.keyword()
        )?;
        writeln!(
            self.out,
            "Head loss model ......... {}",
            net.options.head_loss_model.keyword()
        )?;
        writeln!(
            self.out,
            "Hydraulic time step ..... {}",
            format_clock(net.options.hyd_step)
        )?;
        writeln!(
            self.out,
            "Total duration .......... {}",
            format_clock(net.options.duration)
        )?;
        Ok(())
    }

    /// Per-period node and link tables from a results file.
    pub fn write_results(&mut self, contents: &OutputContents) -> ProjectResult<()> {
        for (i, (nodes, links)) in contents.periods.iter().enumerate() {
            let t = i as u64 * contents.report_step as u64;
            writeln!(self.out)?;
            writeln!(self.out, "Results at {}", format_clock(t))?;
            writeln!(self.out, "{:-^60}", "")?;
            writeln!(
                self.out,
                "{:<16}{:>12}{:>12}{:>12}",
                "Node", "Head", "Pressure", "Demand"
            )?;
            for (name, rec) in contents.node_names.iter().zip(nodes) {
                writeln!(
                    self.out,
                    "{:<16}{:>12.3}{:>12.3}{:>12.3}",
                    name, rec.head, rec.pressure, rec.demand
                )?;
            }
            writeln!(
                self.out,
                "{:<16}{:>12}{:>12}{:>12}{:>12}",
                "Link", "Flow", "Velocity", "Headloss", "Status"
            )?;
            for (name, rec) in contents.link_names.iter().zip(links) {
                writeln!(
                    self.out,
                    "{:<16}{:>12.3}{:>12.3}{:>12.3}{:>12}",
                    name,
                    rec.flow,
                    rec.velocity,
                    rec.head_loss,
                    status_from_code(rec.status).keyword()
                )?;
            }
        }
        Ok(())
    }

    pub fn write_energy_summary(&mut self, contents: &OutputContents) -> ProjectResult<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{:-^40}", "")?;
        writeln!(
            self.out,
            "Pump energy used ........ {:.3} kWh",
            contents.energy_kwh
        )?;
        writeln!(
            self.out,
            "Peak power .............. {:.3} kW",
            contents.peak_kw
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_network::{Link, Node, Pipe};

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0), "0:00:00");
        assert_eq!(format_clock(3661), "1:01:01");
    }

    #[test]
    fn summary_lists_counts() {
        let mut net = Network::new();
        let r = net.add_node(Node::reservoir("R", 100.0)).unwrap();
        let j = net.add_node(Node::junction("J", 0.0)).unwrap();
        net.add_link(Link::pipe("P1", r, j, Pipe::new(100.0, 130.0)))
            .unwrap();
        let mut buf = Vec::new();
        let mut rw = ReportWriter::new(&mut buf);
        rw.write_heading().unwrap();
        rw.write_summary("net.inp", &net, "Test title").unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("AquaNet"));
        assert!(text.contains("Number of junctions ..... 1"));
        assert!(text.contains("net.inp"));
    }
}
