/// Parse and validate a mode name.
///
/// The mode becomes part of environment file names, so it must be a plain
/// file-name fragment: letters, digits, `-` and `_`.
///
/// # Errors
///
/// Returns an error message if the mode is empty or contains other
/// characters.
pub fn parse_mode(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("Mode cannot be empty".to_string());
    }

    if let Some(c) = s
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
    {
        return Err(format!(
            "Mode can only contain letters, numbers, '-' or '_', found '{c}' in '{s}'"
        ));
    }

    Ok(s.to_string())
}
