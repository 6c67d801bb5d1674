//! Binary results file.
//!
//! Layout (all little-endian):
//! - prolog: magic u32, format version u32, node count u32, link count
//!   u32, report step u32, then a string table of node names followed by
//!   link names (u16 length + UTF-8 bytes each)
//! - one record per reporting period: per node f32 head, pressure,
//!   demand; per link f32 flow, velocity, head loss, status code —
//!   all in user units, in declaration order
//! - epilog: period count u32, pump energy kWh f32, peak power kW f32,
//!   closing magic u32

use crate::error::{ProjectError, ProjectResult};
use aq_network::{LinkStatus, Network};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const MAGIC: u32 = 0x4151_4E45; // "AQNE"
pub const FORMAT_VERSION: u32 = 1;

/// Per-node values of one reporting period, in user units.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub head: f32,
    pub pressure: f32,
    pub demand: f32,
}

/// Per-link values of one reporting period, in user units.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRecord {
    pub flow: f32,
    pub velocity: f32,
    pub head_loss: f32,
    pub status: u8,
}

fn status_code(s: LinkStatus) -> u8 {
    match s {
        LinkStatus::Open => 0,
        LinkStatus::Closed => 1,
        LinkStatus::Active => 2,
        LinkStatus::TempClosed => 3,
    }
}

pub fn status_from_code(code: u8) -> LinkStatus {
    match code {
        1 => LinkStatus::Closed,
        2 => LinkStatus::Active,
        3 => LinkStatus::TempClosed,
        _ => LinkStatus::Open,
    }
}

/// Streaming writer over the simulation's reporting periods.
pub struct OutputWriter {
    file: BufWriter<File>,
    periods: u32,
    finished: bool,
}

impl OutputWriter {
    pub fn create(path: &Path, net: &Network) -> ProjectResult<Self> {
        let file = File::create(path).map_err(|source| ProjectError::CannotOpenOutput {
            path: path.to_path_buf(),
            source,
        })?;
        let mut w = BufWriter::new(file);
        w.write_all(&MAGIC.to_le_bytes())?;
        w.write_all(&FORMAT_VERSION.to_le_bytes())?;
        w.write_all(&(net.node_count() as u32).to_le_bytes())?;
        w.write_all(&(net.link_count() as u32).to_le_bytes())?;
        w.write_all(&(net.options.report_step as u32).to_le_bytes())?;
        for node in &net.nodes {
            write_str(&mut w, &node.name)?;
        }
        for link in &net.links {
            write_str(&mut w, &link.name)?;
        }
        Ok(Self {
            file: w,
            periods: 0,
            finished: false,
        })
    }

    /// Append the network's current state as one reporting period.
    pub fn write_period(&mut self, net: &Network) -> ProjectResult<()> {
        let units = net.units();
        use aq_core::Quantity;
        for node in &net.nodes {
            let head = units.to_user(Quantity::Head, node.head) as f32;
            let pressure = units.to_user(Quantity::Pressure, node.pressure()) as f32;
            let demand = units.to_user(Quantity::Flow, node.demand) as f32;
            for v in [head, pressure, demand] {
                self.file.write_all(&v.to_le_bytes())?;
            }
        }
        for link in &net.links {
            let flow = units.to_user(Quantity::Flow, link.flow) as f32;
            let velocity = units.to_user(Quantity::Velocity, link.velocity()) as f32;
            let head_loss = units.to_user(Quantity::Head, link.hloss) as f32;
            for v in [flow, velocity, head_loss] {
                self.file.write_all(&v.to_le_bytes())?;
            }
            self.file
                .write_all(&(status_code(link.status) as f32).to_le_bytes())?;
        }
        self.periods += 1;
        Ok(())
    }

    /// Write the epilog and flush. Safe to call once only.
    pub fn finish(&mut self, energy_kwh: f64, peak_kw: f64) -> ProjectResult<()> {
        if self.finished {
            return Ok(());
        }
        self.file.write_all(&self.periods.to_le_bytes())?;
        self.file.write_all(&(energy_kwh as f32).to_le_bytes())?;
        self.file.write_all(&(peak_kw as f32).to_le_bytes())?;
        self.file.write_all(&MAGIC.to_le_bytes())?;
        self.file.flush()?;
        self.finished = true;
        Ok(())
    }

    pub fn periods(&self) -> u32 {
        self.periods
    }
}

fn write_str(w: &mut impl Write, s: &str) -> std::io::Result<()> {
    let bytes = s.as_bytes();
    w.write_all(&(bytes.len() as u16).to_le_bytes())?;
    w.write_all(bytes)
}

/// Fully parsed results file.
#[derive(Debug, Clone)]
pub struct OutputContents {
    pub node_names: Vec<String>,
    pub link_names: Vec<String>,
    pub report_step: u32,
    pub periods: Vec<(Vec<NodeRecord>, Vec<LinkRecord>)>,
    pub energy_kwh: f32,
    pub peak_kw: f32,
}

pub fn read_output(path: &Path) -> ProjectResult<OutputContents> {
    let file = File::open(path).map_err(|source| ProjectError::CannotOpenOutput {
        path: path.to_path_buf(),
        source,
    })?;
    let mut r = BufReader::new(file);

    if read_u32(&mut r)? != MAGIC {
        return Err(ProjectError::CorruptOutput {
            what: "bad opening magic",
        });
    }
    if read_u32(&mut r)? != FORMAT_VERSION {
        return Err(ProjectError::CorruptOutput {
            what: "unsupported format version",
        });
    }
    let node_count = read_u32(&mut r)? as usize;
    let link_count = read_u32(&mut r)? as usize;
    let report_step = read_u32(&mut r)?;
    let node_names = (0..node_count)
        .map(|_| read_str(&mut r))
        .collect::<Result<Vec<_>, _>>()?;
    let link_names = (0..link_count)
        .map(|_| read_str(&mut r))
        .collect::<Result<Vec<_>, _>>()?;

    // records run until the epilog; sized by the trailing period count,
    // so read the remainder first
    let mut rest = Vec::new();
    r.read_to_end(&mut rest)?;
    if rest.len() < 16 {
        return Err(ProjectError::CorruptOutput {
            what: "truncated epilog",
        });
    }
    let tail = &rest[rest.len() - 16..];
    let period_count = u32::from_le_bytes(tail[0..4].try_into().expect("4 bytes")) as usize;
    let energy_kwh = f32::from_le_bytes(tail[4..8].try_into().expect("4 bytes"));
    let peak_kw = f32::from_le_bytes(tail[8..12].try_into().expect("4 bytes"));
    if u32::from_le_bytes(tail[12..16].try_into().expect("4 bytes")) != MAGIC {
        return Err(ProjectError::CorruptOutput {
            what: "bad closing magic",
        });
    }

    let record_size = node_count * 12 + link_count * 16;
    if rest.len() - 16 != record_size * period_count {
        return Err(ProjectError::CorruptOutput {
            what: "record area size mismatch",
        });
    }

    let mut periods = Vec::with_capacity(period_count);
    let mut at = 0usize;
    let mut f32_at = |buf: &[u8], pos: &mut usize| -> f32 {
        let v = f32::from_le_bytes(buf[*pos..*pos + 4].try_into().expect("4 bytes"));
        *pos += 4;
        v
    };
    for _ in 0..period_count {
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            nodes.push(NodeRecord {
                head: f32_at(&rest, &mut at),
                pressure: f32_at(&rest, &mut at),
                demand: f32_at(&rest, &mut at),
            });
        }
        let mut links = Vec::with_capacity(link_count);
        for _ in 0..link_count {
            links.push(LinkRecord {
                flow: f32_at(&rest, &mut at),
                velocity: f32_at(&rest, &mut at),
                head_loss: f32_at(&rest, &mut at),
                status: f32_at(&rest, &mut at) as u8,
            });
        }
        periods.push((nodes, links));
    }

    Ok(OutputContents {
        node_names,
        link_names,
        report_step,
        periods,
        energy_kwh,
        peak_kw,
    })
}

fn read_u32(r: &mut impl Read) -> ProjectResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_str(r: &mut impl Read) -> ProjectResult<String> {
    let mut lbuf = [0u8; 2];
    r.read_exact(&mut lbuf)?;
    let len = u16::from_le_bytes(lbuf) as usize;
    let mut sbuf = vec![0u8; len];
    r.read_exact(&mut sbuf)?;
    String::from_utf8(sbuf).map_err(|_| ProjectError::CorruptOutput {
        what: "string table is not UTF-8",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_network::{Link, Node, Pipe};
    use std::env;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(format!("aquanet-output-{}-{name}", std::process::id()))
    }

    fn small_net() -> Network {
        let mut net = Network::new();
        net.options.flow_units = aq_core::FlowUnits::Cfs;
        let r = net.add_node(Node::reservoir("R", 100.0)).unwrap();
        let j = net.add_node(Node::junction("J", 0.0)).unwrap();
        let mut link = Link::pipe("P1", r, j, Pipe::new(100.0, 130.0));
        link.diameter = 1.0;
        net.add_link(link).unwrap();
        net
    }

    #[test]
    fn round_trip_two_periods() {
        let net = small_net();
        let path = tmp_path("roundtrip.out");
        {
            let mut w = OutputWriter::create(&path, &net).unwrap();
            w.write_period(&net).unwrap();
            w.write_period(&net).unwrap();
            w.finish(12.5, 3.25).unwrap();
        }
        let contents = read_output(&path).unwrap();
        assert_eq!(contents.node_names, vec!["R", "J"]);
        assert_eq!(contents.link_names, vec!["P1"]);
        assert_eq!(contents.periods.len(), 2);
        assert_eq!(contents.energy_kwh, 12.5);
        assert_eq!(contents.peak_kw, 3.25);
        let (nodes, links) = &contents.periods[0];
        assert_eq!(nodes.len(), 2);
        assert_eq!(links.len(), 1);
        assert!((nodes[0].head - 100.0).abs() < 1e-3);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn detects_corrupt_magic() {
        let path = tmp_path("corrupt.out");
        std::fs::write(&path, [0u8; 64]).unwrap();
        let err = read_output(&path).unwrap_err();
        assert!(matches!(err, ProjectError::CorruptOutput { .. }));
        std::fs::remove_file(&path).ok();
    }
}
