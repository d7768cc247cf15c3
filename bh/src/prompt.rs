//! Interactive collection of placeholder values

use std::io::{BufRead, Write};

use eyre::{Context, Result, eyre};
use tracing::debug;

use crate::placeholder::{Substitutions, unresolved};

/// Ask for every placeholder in `script` that `preset` does not already cover
///
/// Prompts are written as `name: ` in the order placeholders first appear.
/// Answers are trimmed of surrounding whitespace; an empty answer is a valid
/// (empty) value. Running out of input before all names are answered is an
/// error.
pub fn collect_values<R, W>(script: &str, preset: Substitutions, mut input: R, mut output: W) -> Result<Substitutions>
where
    R: BufRead,
    W: Write,
{
    let mut values = preset;
    let missing = unresolved(script, &values);
    debug!(preset = values.len(), missing = missing.len(), "collect_values: called");

    for name in missing {
        write!(output, "{}: ", name).context("Failed to write prompt")?;
        output.flush().context("Failed to flush prompt")?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .context(format!("Failed to read value for '{}'", name))?;
        if read == 0 {
            return Err(eyre!("Input closed before a value for '{}' was given", name));
        }
        values.insert(name, line.trim().to_string());
    }

    Ok(values)
}
