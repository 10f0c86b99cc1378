//! CLI channel: stdin/stdout REPL for local testing.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream};
use crate::error::ChannelError;
use crate::intake::OutboundTurn;

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel {
    user_id: String,
}

impl CliChannel {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    async fn write(&self, text: &str) -> Result<(), ChannelError> {
        let send_failed = |e: std::io::Error| ChannelError::SendFailed {
            name: self.name().to_string(),
            reason: e.to_string(),
        };
        let mut stdout = tokio::io::stdout();
        stdout.write_all(text.as_bytes()).await.map_err(send_failed)?;
        stdout.flush().await.map_err(send_failed)
    }
}

/// Plain-text rendering of a turn: notices, the prompt, numbered choices and
/// the card attachment if there is one.
pub fn render(turn: &OutboundTurn) -> String {
    let mut out = String::new();
    for notice in &turn.notices {
        out.push_str(notice);
        out.push('\n');
    }
    out.push_str(&turn.text);
    out.push('\n');

    if let Some(choices) = &turn.choices {
        for (i, label) in choices.labels().iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, label));
        }
    }

    if let Some(card) = &turn.card {
        let json = serde_json::to_string_pretty(&card.to_attachment()).unwrap_or_default();
        out.push_str("[card]\n");
        out.push_str(&json);
        out.push('\n');
    }
    out
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let user_id = self.user_id.clone();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg = IncomingMessage::new("cli", &user_id, &line);
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: &OutboundTurn,
    ) -> Result<(), ChannelError> {
        self.write(&format!("\n{}\n", render(response))).await?;
        if !response.finished {
            eprint!("> ");
        }
        Ok(())
    }

    async fn send_status(&self, status: &str) -> Result<(), ChannelError> {
        eprintln!("{status}");
        eprint!("> ");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{ChoiceSet, RichCard};

    #[test]
    fn render_numbers_choices_after_notices() {
        let turn = OutboundTurn {
            notices: vec!["Thanks Amina.".into()],
            text: "Which ward do you live in?".into(),
            choices: Some(ChoiceSet::from_labels(["Sub 1", "ub"])),
            card: None,
            finished: false,
        };
        assert_eq!(
            render(&turn),
            "Thanks Amina.\nWhich ward do you live in?\n  1. Sub 1\n  2. ub\n"
        );
    }

    #[test]
    fn render_includes_card_document() {
        let turn = OutboundTurn {
            notices: Vec::new(),
            text: "Choose an action.".into(),
            choices: None,
            card: Some(RichCard::new("Latest legal news", "Good evening").with_action("Go back", "go_back")),
            finished: false,
        };
        let text = render(&turn);
        assert!(text.contains("[card]"));
        assert!(text.contains("application/vnd.microsoft.card.adaptive"));
        assert!(text.contains("\"AdaptiveCard\""));
        assert!(text.contains("Action.Submit"));
    }
}
