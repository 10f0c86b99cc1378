//! Rich card payload sent alongside a prompt.

use serde::{Deserialize, Serialize};

/// Content type for Adaptive Card attachments.
pub const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";

/// A submit button. `data` is opaque to the core; the renderer resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardAction {
    pub title: String,
    pub data: String,
}

/// An interactive card with a title, body text and submit actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichCard {
    pub title: String,
    pub body: String,
    pub actions: Vec<CardAction>,
}

impl RichCard {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, title: impl Into<String>, data: impl Into<String>) -> Self {
        self.actions.push(CardAction {
            title: title.into(),
            data: data.into(),
        });
        self
    }

    /// Render as an Adaptive Card 1.0 document.
    pub fn to_adaptive_card(&self) -> serde_json::Value {
        let actions: Vec<serde_json::Value> = self
            .actions
            .iter()
            .map(|a| {
                serde_json::json!({
                    "type": "Action.Submit",
                    "title": a.title,
                    "data": a.data,
                })
            })
            .collect();

        serde_json::json!({
            "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
            "type": "AdaptiveCard",
            "version": "1.0",
            "body": [
                { "type": "TextBlock", "text": self.title, "weight": "bolder", "size": "medium" },
                { "type": "TextBlock", "text": self.body, "wrap": true }
            ],
            "actions": actions,
        })
    }

    /// The card wrapped as a message attachment tagged with its content type.
    pub fn to_attachment(&self) -> serde_json::Value {
        serde_json::json!({
            "contentType": ADAPTIVE_CARD_CONTENT_TYPE,
            "content": self.to_adaptive_card(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_card_has_submit_actions() {
        let card = RichCard::new("Latest legal news", "Good evening")
            .with_action("Links to legal news", "https://news.example/legal")
            .with_action("Go back", "go_back");

        let json = card.to_adaptive_card();
        assert_eq!(json["type"], "AdaptiveCard");
        assert_eq!(json["body"][1]["text"], "Good evening");
        let actions = json["actions"].as_array().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0]["type"], "Action.Submit");
        assert_eq!(actions[0]["data"], "https://news.example/legal");
    }

    #[test]
    fn attachment_carries_content_type() {
        let card = RichCard::new("Latest legal news", "Good evening").with_action("Go back", "go_back");
        let attachment = card.to_attachment();
        assert_eq!(attachment["contentType"], ADAPTIVE_CARD_CONTENT_TYPE);
        assert_eq!(attachment["content"], card.to_adaptive_card());
    }
}
