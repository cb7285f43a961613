use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::warn;

use doi2bib_science::{AbbreviationAuthority, AbbreviationChoice, Authority, Candidate, Decision};

// ─── Line input ─────────────────────────────────────────────────────────────

/// What a finished line edit produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineInput {
    Line(String),
    /// Ctrl-C, Esc, or end of input.
    Cancelled,
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Print `prompt` and read one line. Uses raw-mode key events on a terminal
/// so Ctrl-C and Esc can cancel; falls back to plain line reads otherwise.
pub fn read_line(prompt: &str) -> Result<LineInput> {
    print!("{prompt}");
    io::stdout().flush()?;

    if !io::stdin().is_terminal() {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(LineInput::Cancelled);
        }
        return Ok(LineInput::Line(line.trim().to_string()));
    }

    let _raw = RawModeGuard::enable()?;
    let mut buffer = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match apply_key(&mut buffer, key) {
            KeyOutcome::Continue(echo) => {
                print!("{echo}");
                io::stdout().flush()?;
            }
            KeyOutcome::Done(input) => {
                print!("\r\n");
                io::stdout().flush()?;
                return Ok(input);
            }
        }
    }
}

enum KeyOutcome {
    /// Keep reading; echo this text.
    Continue(String),
    Done(LineInput),
}

fn apply_key(buffer: &mut String, key: KeyEvent) -> KeyOutcome {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => KeyOutcome::Done(LineInput::Cancelled),
        KeyCode::Char('d') if ctrl && buffer.is_empty() => KeyOutcome::Done(LineInput::Cancelled),
        KeyCode::Esc => KeyOutcome::Done(LineInput::Cancelled),
        KeyCode::Enter => KeyOutcome::Done(LineInput::Line(buffer.trim().to_string())),
        KeyCode::Backspace => {
            let echo = if buffer.pop().is_some() { "\u{8} \u{8}" } else { "" };
            KeyOutcome::Continue(echo.to_string())
        }
        KeyCode::Char(c) if !ctrl => {
            buffer.push(c);
            KeyOutcome::Continue(c.to_string())
        }
        _ => KeyOutcome::Continue(String::new()),
    }
}

/// Ask until the answer is y/yes/n/no. A cancelled prompt counts as "no".
pub fn ask_yes_no(question: &str) -> Result<bool> {
    println!("{}", question.white().bold());
    loop {
        match read_line("y/n: ")? {
            LineInput::Cancelled => return Ok(false),
            LineInput::Line(answer) => match answer.to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => {}
            },
        }
    }
}

// ─── Resolution authority ───────────────────────────────────────────────────

/// Asks the person at the terminal which duplicate to keep.
#[derive(Debug, Default)]
pub struct TerminalAuthority;

impl Authority for TerminalAuthority {
    fn choose(&mut self, candidates: &[Candidate]) -> Decision {
        println!("\t\t# # #");
        for (n, candidate) in candidates.iter().enumerate() {
            println!("{}   {}", format!("{})", n + 1).yellow().bold(), candidate.key.as_str().cyan());
            println!("{} {}", "Journal:".yellow(), candidate.journal.as_str().white().bold());
            println!("{} {}", "Volume:".yellow(), candidate.volume.as_str().white().bold());
            println!("{} {}\n", "Pages:".yellow(), candidate.pages.as_str().white().bold());
        }

        match read_line("Keep which one? (Enter number, or anything else to keep all) ") {
            Ok(LineInput::Line(answer)) => parse_choice(&answer, candidates.len()),
            Ok(LineInput::Cancelled) => Decision::Abort,
            Err(e) => {
                warn!(error = %e, "could not read answer; stopping");
                Decision::Abort
            }
        }
    }
}

/// `"2"` of three candidates keeps the second one. Anything else keeps all.
pub fn parse_choice(answer: &str, candidates: usize) -> Decision {
    match answer.trim().parse::<usize>() {
        Ok(n) if (1..=candidates).contains(&n) => Decision::Keep(n - 1),
        _ => Decision::KeepAll,
    }
}

/// Asks the person at the terminal whether to abbreviate a journal name.
#[derive(Debug, Default)]
pub struct TerminalAbbreviationAuthority;

impl AbbreviationAuthority for TerminalAbbreviationAuthority {
    fn choose(&mut self, journal: &str, suggestion: &str, score: f64) -> AbbreviationChoice {
        println!(
            "({:.1}%) Replace \"{}\" with \"{}\" or something else?",
            score * 100.0,
            journal.cyan(),
            suggestion.white().bold()
        );
        match read_line("y to accept, Enter or n to keep, or type an abbreviation: ") {
            Ok(LineInput::Line(answer)) => parse_abbreviation_answer(&answer),
            Ok(LineInput::Cancelled) => AbbreviationChoice::Abort,
            Err(e) => {
                warn!(error = %e, "could not read answer; stopping");
                AbbreviationChoice::Abort
            }
        }
    }
}

/// `y` accepts the suggestion, `n` or nothing keeps the name, anything else
/// is taken as the abbreviation to use.
pub fn parse_abbreviation_answer(answer: &str) -> AbbreviationChoice {
    let answer = answer.trim();
    match answer.to_lowercase().as_str() {
        "y" | "yes" => AbbreviationChoice::Accept,
        "" | "n" | "no" => AbbreviationChoice::Decline,
        _ => AbbreviationChoice::Replace(answer.to_string()),
    }
}
