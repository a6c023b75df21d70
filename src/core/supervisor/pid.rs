use crate::core::error::{ProvisionError, ProvisionResult};

/// Extract the process ID from the server's first output line.
///
/// Event Store prefixes its log lines with `[<pid>,<thread>,<time>]`, so the
/// ID is the text between the first `[` and the `,` that follows it.
pub fn extract_pid(lines: &[String]) -> ProvisionResult<String> {
    let format_err = |reason: String| ProvisionError::PidFormat {
        reason,
        output: lines.to_vec(),
    };
    let first = lines
        .first()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| format_err("no output captured".into()))?;

    let open = first
        .find('[')
        .ok_or_else(|| format_err(format!("no '[' in first line: {first}")))?;
    let rest = &first[open + 1..];
    let close = rest
        .find(',')
        .ok_or_else(|| format_err(format!("no ',' after '[' in first line: {first}")))?;

    Ok(rest[..close].to_string())
}
