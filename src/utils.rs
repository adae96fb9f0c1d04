//! Common utility functions used across modules.
//!
//! - [`truncate`] - Truncate strings with ellipsis
//! - [`shell_join`] - Render an argv for display
//! - [`first_line`] - First non-empty line of command output

/// Truncate a string to a maximum length, adding "..." if truncated.
///
/// # Examples
/// ```
/// use zappy::utils::truncate;
/// assert_eq!(truncate("short", 10), "short");
/// assert_eq!(truncate("this is long", 10), "this is...");
/// ```
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

/// Join an argv into a single display string, quoting arguments with spaces.
///
/// Only used for echoing commands; the argv itself is never passed to a shell.
///
/// # Examples
/// ```
/// use zappy::utils::shell_join;
/// assert_eq!(shell_join(&["ufw", "allow", "22/tcp"]), "ufw allow 22/tcp");
/// assert_eq!(shell_join(&["echo", "a b"]), "echo 'a b'");
/// ```
pub fn shell_join<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|a| {
            let a = a.as_ref();
            if a.is_empty() || a.contains(char::is_whitespace) || a.contains('"') {
                format!("'{}'", a.replace('\'', r"'\''"))
            } else {
                a.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// First non-empty trimmed line of some command output, if any.
pub fn first_line(s: &str) -> Option<&str> {
    s.lines().map(str::trim).find(|l| !l.is_empty())
}
