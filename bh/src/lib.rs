//! bashhub - placeholder-templated shell scripts run under a pseudo-terminal
//!
//! Two independent pieces that compose through plain strings:
//!
//! - [`placeholder`] finds `{{ name }}` tokens in script text and fills them
//!   from a name-to-value map in a single, non-recursive pass.
//! - [`exec`] runs the finished text with `bash -c` on a fresh pty, streams
//!   the decoded output to a callback, forwards the caller's input and
//!   reports the exit status.
//!
//! # Example
//!
//! ```ignore
//! use bashhub::{Executor, Substitutions, extract, substitute};
//!
//! let script = "ssh {{ user }}@{{ host }}";
//! assert_eq!(extract(script), vec!["user", "host"]);
//!
//! let values: Substitutions = [("user".into(), "root".into()), ("host".into(), "db1".into())].into();
//! let outcome = Executor::default()
//!     .execute(&substitute(script, &values), std::io::stdin(), |chunk| print!("{}", chunk))
//!     .await?;
//! ```

pub mod cli;
pub mod config;
pub mod exec;
pub mod placeholder;
pub mod prompt;
pub mod terminal;

pub use config::Config;
pub use exec::{DEFAULT_SHELL, ExecError, ExecOptions, Executor, ExitOutcome, Session, Terminator, execute};
pub use placeholder::{Substitutions, extract, substitute, unresolved};
