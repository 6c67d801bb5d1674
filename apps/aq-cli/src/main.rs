use aq_project::{format_clock, Project};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "aquanet")]
#[command(about = "AquaNet - water distribution hydraulics with dynamic pressure management", long_about = None)]
struct Cli {
    /// Input file describing the network
    input: PathBuf,
    /// Report file to write
    report: PathBuf,
    /// Binary output file to write
    output: PathBuf,
}

fn main() -> ExitCode {
    // progress lines and log records share stderr
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    eprintln!("... AquaNet hydraulic simulator");
    eprint!("    Reading input file ...");
    let _ = io::stderr().flush();

    let mut project = Project::new();
    let code = project.run(&cli.input, &cli.report, &cli.output, |t, duration| {
        eprint!(
            "\r    Solving network at {} of {} hrs ...        ",
            format_clock(t),
            format_clock(duration)
        );
        let _ = io::stderr().flush();
    });

    if code == 0 {
        eprintln!("\r    Simulation completed.                          ");
    } else {
        eprintln!("\r    There were errors. See the report file for details.");
    }

    // exit code equals the highest error code encountered
    ExitCode::from((code.clamp(0, 255)) as u8)
}
