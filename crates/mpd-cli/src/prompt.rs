//! Interactive prompts on stdin

use std::io::{self, BufRead, Write};

fn read_answer(reader: &mut impl BufRead) -> Option<String> {
    let mut input = String::new();
    match reader.read_line(&mut input) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(input.trim().to_string()),
    }
}

fn parse_yes_no(answer: &str, default: bool) -> Option<bool> {
    match answer.to_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Positive integer, or `default` for an empty answer.
fn parse_number(answer: &str, default: Option<usize>) -> Option<usize> {
    if answer.is_empty() {
        return default;
    }
    answer.parse().ok().filter(|n| *n >= 1)
}

/// Ask a yes/no question. End of input answers with the default.
pub fn confirm(message: &str, default: bool) -> bool {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    loop {
        print!("==> {message} {hint} ");
        io::stdout().flush().ok();
        let Some(answer) = read_answer(&mut reader) else {
            return default;
        };
        if let Some(yes) = parse_yes_no(&answer, default) {
            return yes;
        }
        println!("==> Please answer 'y' or 'n'.");
    }
}

/// Ask for a positive number. End of input answers with the default.
pub fn number(message: &str, default: usize) -> usize {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    loop {
        print!("==> {message} (default is {default}) ");
        io::stdout().flush().ok();
        let Some(answer) = read_answer(&mut reader) else {
            return default;
        };
        if let Some(n) = parse_number(&answer, Some(default)) {
            return n;
        }
        println!("==> Please enter a valid number.");
    }
}

/// Ask the user to pick one of `choices` by number.
pub fn choose(message: &str, choices: &[String]) -> Option<String> {
    println!("==> {message}\n");
    for (i, choice) in choices.iter().enumerate() {
        println!(" {}) {choice}", i + 1);
    }
    println!();

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    loop {
        print!("==> Select a project (type the number): ");
        io::stdout().flush().ok();
        let answer = read_answer(&mut reader)?;
        match parse_number(&answer, None) {
            Some(n) if n <= choices.len() => return Some(choices[n - 1].clone()),
            _ => println!("==> Pick a number between 1 and {}", choices.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yes_no() {
        assert_eq!(parse_yes_no("", true), Some(true));
        assert_eq!(parse_yes_no("", false), Some(false));
        assert_eq!(parse_yes_no("YES", false), Some(true));
        assert_eq!(parse_yes_no("n", true), Some(false));
        assert_eq!(parse_yes_no("maybe", true), None);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("", Some(4)), Some(4));
        assert_eq!(parse_number("12", Some(4)), Some(12));
        assert_eq!(parse_number("0", Some(4)), None);
        assert_eq!(parse_number("x", None), None);
    }

    #[test]
    fn test_read_answer_trims_and_detects_eof() {
        let mut input = io::Cursor::new("  yes \n");
        assert_eq!(read_answer(&mut input).as_deref(), Some("yes"));
        assert_eq!(read_answer(&mut input), None);
    }
}
