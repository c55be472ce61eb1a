// src/core/commons.rs

use colored::Colorize;
use std::borrow::Cow;

/// Quotes a path for a remote shell command. Falls back to the raw text if it cannot be quoted.
pub fn shell_quote(value: &str) -> Cow<'_, str> {
    shlex::try_quote(value).unwrap_or(Cow::Borrowed(value))
}

/// Prints an operator-facing progress line: green text, yellow argument.
pub fn info(text: &str, arg: &str) {
    if text.starts_with(' ') {
        println!("{}{}", text, arg.yellow());
    } else {
        println!("{}{}", text.green(), arg.yellow());
    }
}

/// Prints an indented, dimmed note.
pub fn note(text: &str) {
    println!("    {}", text.magenta());
}

/// Prints a warning to stderr and records it in the log.
pub fn warn(text: &str) {
    log::warn!("{}", text);
    eprintln!("{} {}", "Warning:".yellow().bold(), text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/etc/nginx/"), "/etc/nginx/");
        assert_eq!(shell_quote("/srv/my app"), "'/srv/my app'");
    }
}
