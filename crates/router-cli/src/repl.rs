//! Read-eval loop over stdin.
//!
//! Each non-blank line is parsed into a [`Query`] and routed. Ctrl-C while a
//! request is in flight cancels that request only; Ctrl-C at the prompt
//! leaves the loop.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use routing::{Query, Router, RouterResponse};

use crate::output::{render_json, render_response};

const EXIT_COMMANDS: [&str; 4] = ["quit", "exit", "q", "退出"];

/// What to do with one line of input.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Skip,
    Exit,
    Ask(Query),
}

pub fn parse_line(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Skip;
    }
    if EXIT_COMMANDS
        .iter()
        .any(|c| trimmed.eq_ignore_ascii_case(c))
    {
        return Command::Exit;
    }
    let query = Query::parse(trimmed);
    if query.is_empty() {
        Command::Skip
    } else {
        Command::Ask(query)
    }
}

pub async fn run(router: &Router, json: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Type a question (image URLs are attached automatically). 'quit' to leave.");
    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let query = match parse_line(&line) {
            Command::Skip => continue,
            Command::Exit => break,
            Command::Ask(query) => query,
        };

        let response = route_interruptible(router, &query).await;
        let rendered = if json {
            render_json(&response)
        } else {
            render_response(&response)
        };
        println!("{rendered}");
    }

    println!("Bye.");
    Ok(())
}

/// Route `query`, cancelling it if Ctrl-C arrives first.
pub async fn route_interruptible(router: &Router, query: &Query) -> RouterResponse {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("cancelling in-flight request");
                cancel.cancel();
            }
        })
    };

    let response = router.route_with_cancel(query, &cancel).await;
    watcher.abort();
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_line(""), Command::Skip);
        assert_eq!(parse_line("   \t"), Command::Skip);
    }

    #[test]
    fn exit_commands() {
        for input in ["quit", "EXIT", " q ", "退出"] {
            assert_eq!(parse_line(input), Command::Exit, "{input}");
        }
        assert!(matches!(parse_line("quite good"), Command::Ask(_)));
    }

    #[test]
    fn lines_become_queries_with_images() {
        match parse_line("what is this https://x.io/a.gif") {
            Command::Ask(query) => {
                assert_eq!(query.text, "what is this");
                assert!(query.has_image());
            }
            other => panic!("expected Ask, got {other:?}"),
        }
    }
}
