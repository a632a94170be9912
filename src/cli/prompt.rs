//! Interactive credential prompts on stderr

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, BufRead, IsTerminal, Write};

use super::CliError;

/// Ask for one line of visible input
pub async fn prompt_line(label: &'static str) -> Result<String, CliError> {
    blocking(move || {
        eprint!("{label}");
        io::stderr().flush()?;
        read_stdin_line()
    })
    .await
}

/// Ask for a secret; typed characters are not echoed on a terminal
pub async fn prompt_password(label: &'static str) -> Result<String, CliError> {
    blocking(move || {
        eprint!("{label}");
        io::stderr().flush()?;
        if !io::stdin().is_terminal() {
            return read_stdin_line();
        }

        enable_raw_mode()?;
        let secret = read_hidden();
        let _ = disable_raw_mode();
        eprintln!();
        secret
    })
    .await
}

async fn blocking<F>(f: F) -> Result<String, CliError>
where
    F: FnOnce() -> io::Result<String> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CliError::PromptError(e.to_string()))?
        .map_err(CliError::from)
}

fn read_stdin_line() -> io::Result<String> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn read_hidden() -> io::Result<String> {
    let mut secret = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(secret),
            KeyCode::Backspace => {
                secret.pop();
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "password prompt cancelled"));
            }
            KeyCode::Char(c) => secret.push(c),
            _ => {}
        }
    }
}
