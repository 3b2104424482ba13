//! The git remote-helper protocol driver.
//!
//! A single-threaded, line-oriented state machine: git writes commands on
//! our stdin, we answer on stdout. Multi-line responses end with a blank
//! line, and every response is flushed before the next command is read.
//! Unknown commands are ignored; end of input ends the session cleanly.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::fetch::Remote;

pub fn drive(remote: &mut Remote, input: impl BufRead, mut output: impl Write) -> Result<()> {
    let mut lines = input.lines();
    while let Some(line) = lines.next() {
        let line = line.context("reading command from git")?;

        if line == "capabilities" {
            writeln!(output, "fetch")?;
            writeln!(output, "option")?;
            writeln!(output)?;
            output.flush()?;
        } else if line == "list" || line.starts_with("list ") {
            // Each tag produces the tag ref and its peeled commit.
            let entries = remote.list()?;
            for entry in &entries {
                writeln!(output, "{} refs/tags/{}", entry.tag, entry.name)?;
                writeln!(output, "{} refs/tags/{}^{{}}", entry.commit, entry.name)?;
            }
            writeln!(output)?;
            output.flush()?;
        } else if let Some(option) = line.strip_prefix("option ") {
            writeln!(output, "{}", set_option(remote, option))?;
            output.flush()?;
        } else if line.starts_with("fetch ") {
            // Fetch commands arrive as a batch terminated by a blank line;
            // one blank response line answers the whole batch.
            let mut batch = vec![line];
            for line in lines.by_ref() {
                let line = line.context("reading command from git")?;
                if line.is_empty() {
                    break;
                }
                batch.push(line);
            }
            for command in &batch {
                let request = command.strip_prefix("fetch ").with_context(|| {
                    format!("unexpected command in fetch batch: {command}")
                })?;
                let (sha1, refname) = request
                    .split_once(' ')
                    .with_context(|| format!("malformed fetch command: {command}"))?;
                remote.fetch(sha1, refname)?;
            }
            writeln!(output)?;
            output.flush()?;
        }
    }
    Ok(())
}

/// Apply an `option <name> <value>` command, answering `ok` or
/// `unsupported`.
fn set_option(remote: &mut Remote, option: &str) -> &'static str {
    let Some((name, value)) = option.split_once(' ') else {
        return "unsupported";
    };
    match name {
        "verbosity" => match value.parse() {
            Ok(level) => {
                remote.set_verbosity(level);
                "ok"
            }
            Err(_) => "unsupported",
        },
        "followtags" => match value {
            "true" => {
                remote.set_followtags(true);
                "ok"
            }
            "false" => {
                remote.set_followtags(false);
                "ok"
            }
            _ => "unsupported",
        },
        _ => "unsupported",
    }
}
