//! Yes/no prompts at the user boundary

use std::io::{self, BufRead, Write};

/// Only an explicit "y" or "yes" counts as approval
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Ask a yes/no question; EOF or anything else is a no
pub fn ask_yes_no(question: &str) -> io::Result<bool> {
    print!("{} [y/N]: ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    let read = io::stdin().lock().read_line(&mut answer)?;
    Ok(read > 0 && is_yes(&answer))
}

/// Ask to run the listed commands
pub fn request_approval() -> io::Result<bool> {
    let approved = ask_yes_no("Run these commands?")?;
    if approved {
        println!("Approved. Executing...");
    } else {
        println!("Cancelled.");
    }
    Ok(approved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_explicit_yes_approves() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES\n"));
        assert!(!is_yes(""));
        assert!(!is_yes("sure"));
        assert!(!is_yes("no"));
    }
}
