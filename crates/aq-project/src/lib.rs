//! aq-project: project-level services for AquaNet.
//!
//! Input-file reading and writing, the binary results file, the text
//! report, optional trace files, and the [`Project`] facade with its
//! small-integer error codes.

pub mod error;
pub mod inp;
pub mod output;
pub mod project;
pub mod report;
pub mod trace;
pub mod writer;

pub use error::{ProjectError, ProjectResult};
pub use inp::{parse_inp, read_inp};
pub use output::{read_output, OutputContents, OutputWriter};
pub use project::{CountKind, LinkParam, NodeParam, Project};
pub use report::{format_clock, ReportWriter};
pub use writer::{render_inp, write_inp};
