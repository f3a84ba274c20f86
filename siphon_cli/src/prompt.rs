use siphon_core::config::{DEFAULT_SUCCESS_CODE, SiphonConfig, Strategy, parse_success_code};
use std::io::{BufRead, Write};
use tracing::warn;

/// Asks the operator for the target parameters, in the order a login form
/// would present them, and writes the answers into `config`.
///
/// Blank answers keep whatever `config` already holds, except for the URL and
/// username which must end up non-empty.
pub fn prompt_target<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    config: &mut SiphonConfig,
) -> Result<(), anyhow::Error> {
    let url = ask(input, output, "Enter target URL: ")?;
    if !url.is_empty() {
        config.target.url = url;
    }
    if config.target.url.is_empty() {
        anyhow::bail!("URL cannot be empty");
    }

    let username = ask(input, output, "Enter username: ")?;
    if !username.is_empty() {
        config.target.username = username;
    }
    if config.target.username.is_empty() {
        anyhow::bail!("username cannot be empty");
    }

    let next_action = ask(input, output, "Enter Next-Action header (blank for none): ")?;
    if !next_action.is_empty() {
        config.target.next_action = Some(next_action);
    }

    let code = ask(input, output, "Enter success status code: ")?;
    config.target.success_code = match parse_success_code(&code) {
        Some(code) => code,
        None if code.is_empty() => config.target.success_code,
        None => {
            warn!(input = %code, fallback = DEFAULT_SUCCESS_CODE, "invalid status code");
            writeln!(output, "Invalid status code. Using default {DEFAULT_SUCCESS_CODE}.")?;
            DEFAULT_SUCCESS_CODE
        }
    };

    let concurrent = ask(input, output, "Use concurrency for faster extraction? (y/n): ")?;
    if !concurrent.is_empty() {
        config.extraction.strategy =
            Strategy::from_concurrent_flag(concurrent.eq_ignore_ascii_case("y"));
    }

    Ok(())
}

fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<String, anyhow::Error> {
    writeln!(output, "{question}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}
