//! Line-based console interaction.
//!
//! [`Console`] reads one line per answer and keeps asking until the answer
//! validates (see [`validate`]). It is also the production [`TapSource`]:
//! every line is a tap, stamped when it arrives, and `rs` resets the count.

pub mod validate;

use std::io::{self, Write};
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::tempo::{TapSignal, TapSource, TempoError};

pub use validate::InputError;

/// Typed instead of a tap to start the count over
pub const RESET_TOKEN: &str = "rs";

/// Console reading answers from `R` (stdin in production).
pub struct Console<R> {
    lines: Lines<R>,
}

impl Console<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> Console<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Print `prompt` and read one line. End of input is an error.
    pub async fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        print!("{}", prompt);
        io::stdout().flush()?;

        match self.lines.next_line().await? {
            Some(line) => Ok(line),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed",
            )),
        }
    }

    /// Ask until `parse` accepts the answer.
    pub async fn ask<T>(
        &mut self,
        prompt: &str,
        parse: impl Fn(&str) -> Result<T, InputError>,
    ) -> io::Result<T> {
        loop {
            let line = self.read_line(prompt).await?;
            match parse(line.trim()) {
                Ok(value) => return Ok(value),
                Err(e) => println!("{}", e),
            }
        }
    }

    /// Print a numbered menu and ask for an entry.
    pub async fn menu(
        &mut self,
        prompt: &str,
        labels: &[String],
        default: Option<usize>,
    ) -> io::Result<usize> {
        for (index, label) in labels.iter().enumerate() {
            println!("{: <4} {}", index, label);
        }
        let len = labels.len();
        self.ask(prompt, |input| validate::parse_menu_choice(input, len, default))
            .await
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> TapSource for Console<R> {
    async fn next_signal(&mut self) -> Result<TapSignal, TempoError> {
        let line = match self.read_line("Press enter on the beat: ").await {
            Ok(line) => line,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(TempoError::InputClosed);
            }
            Err(e) => return Err(TempoError::Input(e.to_string())),
        };
        let at = Instant::now();

        if line.trim().eq_ignore_ascii_case(RESET_TOKEN) {
            println!("Resetting the count, start again now.");
            return Ok(TapSignal::Reset);
        }
        Ok(TapSignal::Tap(at))
    }
}
