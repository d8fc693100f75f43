//! Terminal diagnostics
//!
//! Session-level failures are reported inside the terminal stream itself,
//! so everything here renders as ANSI text with `\r\n` line endings.

const RED: &str = "\x1b[1;31m";
const YELLOW: &str = "\x1b[1;33m";
const GREEN: &str = "\x1b[1;32m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

const BOX_WIDTH: usize = 43;

/// `✖ Error: <message>`
pub fn error_line(message: &str) -> String {
    format!("\r\n{RED}✖ Error: {message}{RESET}\r\n")
}

/// `✖ <label>: <detail>` with the detail left unstyled
pub fn failure(label: &str, detail: &str) -> String {
    format!("\r\n{RED}✖ {label}:{RESET} {detail}\r\n")
}

pub fn hint(text: &str) -> String {
    format!("{CYAN}💡 Hint: {text}{RESET}\r\n")
}

pub fn warning(message: &str) -> String {
    format!("\r\nWarning: {message}\r\n")
}

pub fn notice(message: &str) -> String {
    format!("\r\n{message}\r\n")
}

pub fn connecting(username: &str, host: &str, port: u16) -> String {
    format!("\r\n{GREEN}⚡ Connecting to {username}@{host}:{port}...{RESET}\r\n")
}

/// Boxed banner for transport failures, optionally followed by a hint
pub fn error_banner(title: &str, message: &str, hint_text: Option<&str>) -> String {
    let rule = "═".repeat(BOX_WIDTH);
    let mut out = String::new();
    out.push_str(&format!("\r\n{RED}╔{rule}╗\r\n"));
    out.push_str(&format!("{RED}║     {title:<width$}║\r\n", width = BOX_WIDTH - 5));
    out.push_str(&format!("{RED}╚{rule}╝{RESET}\r\n"));
    out.push_str(&format!("{YELLOW}⚠  Error: {RESET}{message}\r\n"));
    if let Some(text) = hint_text {
        out.push_str(&hint(text));
    }
    out.push_str(&format!("{RESET}\r\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_contains_message_and_hint() {
        let banner = error_banner(
            "SSH CONNECTION ERROR",
            "Connection refused",
            Some("Check if SSH service is running on the remote host"),
        );
        assert!(banner.contains("SSH CONNECTION ERROR"));
        assert!(banner.contains("Connection refused"));
        assert!(banner.contains("Hint: Check if SSH service"));
        assert!(banner.ends_with("\r\n"));
    }

    #[test]
    fn test_banner_rows_line_up() {
        let banner = error_banner("CONNECTION FAILED", "x", None);
        let widths: Vec<usize> = banner
            .split("\r\n")
            .filter(|line| line.contains('║') || line.contains('╔') || line.contains('╚'))
            .map(|line| line.replace(RED, "").replace(RESET, "").chars().count())
            .collect();
        assert_eq!(widths.len(), 3);
        assert!(widths.iter().all(|w| *w == widths[0]));
    }

    #[test]
    fn test_error_line() {
        assert_eq!(
            error_line("Host is required"),
            "\r\n\x1b[1;31m✖ Error: Host is required\x1b[0m\r\n"
        );
    }
}
