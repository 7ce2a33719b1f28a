/// Sync and cursor tokens arrive newline-terminated; strip a single
/// trailing newline before storing or echoing one.
pub fn strip_line_break(input: &str) -> &str {
    input.strip_suffix('\n').unwrap_or(input)
}
