use std::io::Write;

use super::ansi;

/// Ask for a line of input, falling back to `default` on empty input.
pub fn ask(label: &str, default: Option<&str>) -> String {
    loop {
        match default {
            Some(d) => print!("  {} [{}]: ", label, ansi::dim(d)),
            None => print!("  {label}: "),
        }
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return default.unwrap_or_default().to_string();
        }
        let trimmed = line.trim();

        if trimmed.is_empty() {
            if let Some(d) = default {
                return d.to_string();
            }
            continue;
        }
        return trimmed.to_string();
    }
}

/// Ask for a secret without echoing it.
pub fn ask_secret(label: &str) -> String {
    rpassword::prompt_password(format!("  {label}: ")).unwrap_or_default()
}

/// Ask for a secret that may be skipped.
pub fn ask_secret_optional(label: &str) -> String {
    rpassword::prompt_password(format!("  {} {}: ", label, ansi::dim("(empty to skip)")))
        .unwrap_or_default()
}

/// Yes/no confirmation, defaulting to no.
pub fn confirm(question: &str) -> bool {
    print!("  {question} [y/N]: ");
    let _ = std::io::stdout().flush();

    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}
