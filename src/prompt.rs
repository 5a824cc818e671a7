//! Line-oriented terminal prompts.
//!
//! Generic over the reader and writer so the interactive flows can be driven
//! from in-memory buffers in tests.

use std::io::{BufRead, Stdout, StdinLock, Write};

use anyhow::Result;

/// Whether stdin and stdout are both attached to a terminal.
pub fn is_interactive() -> bool {
    atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout)
}

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

pub fn stdio() -> Prompter<StdinLock<'static>, Stdout> {
    Prompter::new(std::io::stdin().lock(), std::io::stdout())
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, line: &str) -> Result<()> {
        writeln!(self.output, "{}", line)?;
        Ok(())
    }

    /// Print `prompt` and read one line, trimmed. `None` at end of input.
    pub fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Yes/no question; an empty answer means yes, end of input means no.
    pub fn confirm(&mut self, prompt: &str) -> Result<bool> {
        loop {
            let answer = match self.ask(&format!("{} [Y/n] ", prompt))? {
                Some(a) => a.to_lowercase(),
                None => return Ok(false),
            };
            match answer.as_str() {
                "" | "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say("Please answer y or n.")?,
            }
        }
    }

    /// Numbered menu starting at 1. Returns the chosen index, or `None` at
    /// end of input or on an empty answer.
    pub fn choose(&mut self, title: &str, options: &[String]) -> Result<Option<usize>> {
        self.say(title)?;
        for (i, option) in options.iter().enumerate() {
            self.say(&format!("  {}) {}", i + 1, option))?;
        }
        loop {
            let answer = match self.ask("> ")? {
                Some(a) if !a.is_empty() => a,
                _ => return Ok(None),
            };
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(Some(n - 1)),
                _ => self.say(&format!("Enter a number between 1 and {}.", options.len()))?,
            }
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}
