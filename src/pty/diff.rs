//! Positional diff between a session transcript and the script that fed it.

/// Returns the transcript lines that the script does not account for.
///
/// A single cursor walks `script` from the top. Each transcript line is
/// compared, whitespace-trimmed on both sides, against the line under the
/// cursor: a match consumes the script line, anything else is kept
/// verbatim. There is no lookahead and no resynchronization, so a script
/// line that never gets echoed leaves the cursor stuck and every later
/// echo shows up in the result. That strictness is wanted: the echoes
/// arrive in feed order, and a transcript that interleaves them
/// differently is itself a finding.
pub fn script_diff(transcript: &[String], script: &[String]) -> Vec<String> {
    let mut cursor = 0;
    let mut diff = Vec::new();
    for line in transcript {
        if cursor < script.len() && line.trim() == script[cursor].trim() {
            cursor += 1;
        } else {
            diff.push(line.clone());
        }
    }
    diff
}
