//! Filter rules: per-peer message suppression (spec.md §4.7).

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::channel_id::ChannelId;
use crate::config::{FilterConfig, FilterRule, SpamCheckConfig};
use crate::model::CanonicalMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Send,
    Receive,
}

impl Event {
    fn parse(raw: &str) -> Self {
        match raw {
            "receive" => Event::Receive,
            _ => Event::Send,
        }
    }
}

struct CompiledRule {
    event: Event,
    group: Regex,
    text: Option<Regex>,
    nick: Option<Regex>,
    fwd_from: Option<Regex>,
    filter_reply: bool,
}

impl CompiledRule {
    fn compile(rule: &FilterRule) -> Result<Self, regex::Error> {
        Ok(Self {
            event: Event::parse(&rule.event),
            group: Regex::new(&rule.group)?,
            text: rule.text.as_deref().map(Regex::new).transpose()?,
            nick: rule.nick.as_deref().map(Regex::new).transpose()?,
            fwd_from: rule.fwd_from.as_deref().map(Regex::new).transpose()?,
            filter_reply: rule.filter_reply,
        })
    }

    fn properties_match(&self, text: &str, nick: &str, fwd_from: Option<&str>) -> bool {
        if let Some(re) = &self.text {
            if !re.is_match(text) {
                return false;
            }
        }
        if let Some(re) = &self.nick {
            if !re.is_match(nick) {
                return false;
            }
        }
        if let Some(re) = &self.fwd_from {
            match fwd_from {
                Some(f) if re.is_match(f) => {}
                _ => return false,
            }
        }
        true
    }

    /// A rule matches iff event+group match, and either the message's own
    /// properties match, or (when `filter_reply`) the replied-to record's
    /// cached properties match (spec.md §4.7).
    fn matches(&self, event: Event, event_group: &str, msg: &CanonicalMessage) -> bool {
        if self.event != event {
            return false;
        }
        if !self.group.is_match(event_group) {
            return false;
        }
        if self.properties_match(&msg.text, &msg.from_nick, msg.fwd_from.as_deref()) {
            return true;
        }
        if self.filter_reply {
            if let Some(reply) = &msg.reply_to {
                return self.properties_match(&reply.text, &reply.from_nick, None);
            }
        }
        false
    }
}

#[derive(Debug, Serialize)]
struct SpamCheckRequest<'a> {
    message_id: &'a str,
    chat_id: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Deserialize, Default)]
struct SpamCheckResponse {
    #[serde(default)]
    is_spam: bool,
}

pub struct Filter {
    rules: Vec<CompiledRule>,
    spam: SpamCheckConfig,
    client: reqwest::Client,
}

impl Filter {
    pub fn compile(config: &FilterConfig, spam: SpamCheckConfig) -> Result<Self, regex::Error> {
        let rules = config
            .filters
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules,
            spam,
            client: reqwest::Client::new(),
        })
    }

    /// True ⇔ the message must be skipped for this peer (regex rules only;
    /// does not include the spam-check, which is async and Telegram-only).
    pub fn blocks_by_rule(&self, msg: &CanonicalMessage, to_group: &ChannelId) -> bool {
        let event = Event::Send;
        let event_group = msg.from_group.as_str();
        let receive_group = to_group.as_str();
        self.rules.iter().any(|r| {
            r.matches(event, event_group, msg) || r.matches(Event::Receive, receive_group, msg)
        })
    }

    /// Optional remote spam-check for Telegram messages (spec.md §4.7,
    /// §6.1 `SpamCheck`). Waits the configured delay before asking, since
    /// the upstream checker needs time to see the message first. Disabled
    /// or failed checks never block (spec.md §7 "Config missing").
    pub async fn is_spam(&self, chat_id: &str, message_id: &str, user_id: &str) -> bool {
        if !self.spam.is_enabled() {
            return false;
        }

        tokio::time::sleep(Duration::from_millis(self.spam.delay_ms)).await;

        let Some(api_key) = &self.spam.api_key else {
            return false;
        };

        let result = self
            .client
            .post(&self.spam.base_url)
            .query(&[("api_key", api_key.as_str())])
            .json(&SpamCheckRequest {
                message_id,
                chat_id,
                user_id,
            })
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => resp
                .json::<SpamCheckResponse>()
                .await
                .map(|r| r.is_spam)
                .unwrap_or(false),
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "spam-check endpoint returned non-success");
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "spam-check request failed, treating as not spam");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_id::Platform;
    use crate::config::FilterRule;

    fn msg_with_text(text: &str) -> CanonicalMessage {
        CanonicalMessage::from_irc(
            ChannelId::new(Platform::Irc, "#a"),
            "alice!~a@host",
            "alice",
            text,
            "I",
            None,
        )
    }

    #[test]
    fn send_rule_blocks_matching_text_from_origin_group() {
        let config = FilterConfig {
            filters: vec![FilterRule {
                event: "send".into(),
                group: "irc/#a".into(),
                text: Some("secret".into()),
                nick: None,
                fwd_from: None,
                filter_reply: true,
            }],
        };
        let filter = Filter::compile(&config, SpamCheckConfig::default()).unwrap();

        let blocked = msg_with_text("this is secret");
        assert!(filter.blocks_by_rule(&blocked, &ChannelId::new(Platform::Telegram, "100")));

        let allowed = msg_with_text("hello");
        assert!(!filter.blocks_by_rule(&allowed, &ChannelId::new(Platform::Telegram, "100")));
    }

    #[test]
    fn rule_is_evaluated_per_peer_not_only_at_ingress() {
        let config = FilterConfig {
            filters: vec![FilterRule {
                event: "receive".into(),
                group: "discord/200".into(),
                text: None,
                nick: None,
                fwd_from: None,
                filter_reply: true,
            }],
        };
        let filter = Filter::compile(&config, SpamCheckConfig::default()).unwrap();
        let msg = msg_with_text("anything");

        assert!(filter.blocks_by_rule(&msg, &ChannelId::new(Platform::Discord, "200")));
        assert!(!filter.blocks_by_rule(&msg, &ChannelId::new(Platform::Telegram, "100")));
    }

    #[test]
    fn disabled_spam_check_never_blocks() {
        let filter = Filter::compile(&FilterConfig::default(), SpamCheckConfig::default()).unwrap();
        assert!(!filter.spam.is_enabled());
    }
}
