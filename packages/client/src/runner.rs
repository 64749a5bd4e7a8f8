//! Client execution logic.

use chrono::Local;

use super::{
    error::ClientError, formatter::MessageFormatter, session::ClientSession, ui::LineReader,
};

/// Run the interactive chat client
///
/// Prompts for a username when none is given, then alternates between
/// reading one input line and printing whatever the server relayed.
pub fn run_client(host: &str, port: u16, username: Option<String>) -> Result<(), ClientError> {
    let mut input = LineReader::new()?;

    let username = match username {
        Some(username) => username,
        None => match prompt_username(&mut input)? {
            Some(username) => username,
            None => return Ok(()),
        },
    };

    let mut session = ClientSession::connect(host, port, &username)?;
    tracing::info!("Connected to {}:{} as '{}'", host, port, username);

    let prompt = format!("{} > ", session.username());
    while let Some(line) = input.read_line(&prompt)? {
        session.send(&line)?;

        let drain = session.drain()?;
        let received_at = Local::now();
        for message in &drain.messages {
            println!(
                "{}",
                MessageFormatter::format_relayed(message, &received_at)
            );
        }

        if drain.closed {
            println!("{}", MessageFormatter::format_server_closed());
            return Ok(());
        }
    }

    tracing::info!("Client session ended normally");
    Ok(())
}

/// Ask until a non-empty username is given; `None` if input ends first.
fn prompt_username(input: &mut LineReader) -> Result<Option<String>, ClientError> {
    while let Some(username) = input.read_line("Username: ")? {
        if !username.is_empty() {
            return Ok(Some(username));
        }
    }
    Ok(None)
}
