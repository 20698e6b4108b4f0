//! Telegram client via grammers' MTProto API (spec.md §4.1, §4.5.1, §4.6).
//!
//! The Bot HTTP API cannot answer "is message N still on the server",
//! which the delete poller needs (`get_messages_by_id`), so the bridge
//! speaks MTProto directly, authenticated with the bot token.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grammers_client::types::{Chat, InputMessage, Media, Message, Update};
use grammers_client::{Client, Config, InitParams};
use grammers_session::{PackedChat, Session};
use tokio::sync::{mpsc::UnboundedSender, Mutex};

use crate::channel_id::{ChannelId, Platform};
use crate::config::{NickStyle, TelegramConfig};
use crate::model::{CanonicalMessage, File, FileKind, ReplyRef};
use crate::queue::{InternalTask, QueueItem};
use crate::store::MessageStore;

use super::{MessagingPlatform, OutgoingMessage, SentMessage};

fn display_nick(chat: &Chat, style: NickStyle) -> String {
    match chat {
        Chat::User(user) => {
            let username = user.username().map(str::to_string);
            let full_name = {
                let first = user.first_name().unwrap_or_default();
                let last = user.last_name().unwrap_or_default();
                if last.is_empty() {
                    first.to_string()
                } else {
                    format!("{first} {last}")
                }
            };
            match style {
                NickStyle::Username => username.unwrap_or(full_name),
                NickStyle::Name => {
                    if full_name.is_empty() {
                        username.unwrap_or_default()
                    } else {
                        full_name
                    }
                }
                NickStyle::Nickname => full_name,
            }
        }
        other => other.name().to_string(),
    }
}

fn file_kind_for(media: &Media) -> FileKind {
    match media {
        Media::Photo(_) => FileKind::Photo,
        Media::Document(doc) => {
            if doc.is_video() {
                FileKind::Video
            } else if doc.is_voice() {
                FileKind::Voice
            } else if doc.is_round_message() {
                FileKind::Video
            } else {
                FileKind::Document
            }
        }
        Media::Sticker(_) => FileKind::Sticker,
        _ => FileKind::Unsupported,
    }
}

/// Chat cache keyed by numeric chat id: messages we've observed carry a
/// packable `Chat`, and that packed form is what sends require. Until the
/// bridge has seen at least one update for a target group since startup,
/// sends to it fail with a permission/not-found disposition (spec.md §7).
#[derive(Default, Clone)]
struct ChatCache(Arc<Mutex<HashMap<i64, PackedChat>>>);

impl ChatCache {
    async fn remember(&self, chat: &Chat) {
        self.0.lock().await.insert(chat.id(), chat.pack());
    }

    async fn get(&self, native_id: i64) -> Option<PackedChat> {
        self.0.lock().await.get(&native_id).cloned()
    }
}

pub struct TelegramPlatform {
    client: Client,
    config: TelegramConfig,
    chats: ChatCache,
}

impl TelegramPlatform {
    pub async fn connect(config: TelegramConfig, tx: UnboundedSender<QueueItem>, store: Arc<MessageStore>) -> Result<Self> {
        let session = Session::load_file_or_create(&config.session)
            .with_context(|| format!("loading telegram session at {}", config.session))?;

        let client = Client::connect(Config {
            session,
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .context("connecting telegram client")?;

        if !client.is_authorized().await.unwrap_or(false) {
            client
                .bot_sign_in(&config.bot_token)
                .await
                .context("signing in telegram bot")?;
            if let Ok(mut f) = tokio::fs::File::create(&config.session).await {
                use tokio::io::AsyncWriteExt;
                let _ = f.write_all(&client.session().save()).await;
            }
        }

        let chats = ChatCache::default();
        let platform = Self {
            client: client.clone(),
            config: config.clone(),
            chats: chats.clone(),
        };

        tokio::spawn(update_loop(client, config, tx, chats, store));

        Ok(platform)
    }

    /// Exposed for the delete poller (spec.md §4.6), which needs raw
    /// `GetMessages` access the `MessagingPlatform` trait doesn't model
    /// (it isn't a per-message send/edit/delete operation).
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// `pub(crate)` so the delete poller can address `GetMessages` through
    /// the same cached entities sends use, rather than reconstructing a
    /// `PackedChat` without an access hash.
    pub(crate) async fn resolve(&self, group: &ChannelId) -> Result<PackedChat> {
        let native_id: i64 = group
            .native_id()
            .parse()
            .with_context(|| format!("telegram group id is not numeric: {group}"))?;
        self.chats
            .get(native_id)
            .await
            .with_context(|| format!("no cached chat entity for {group}; bridge hasn't observed it yet"))
    }
}

async fn update_loop(
    client: Client,
    config: TelegramConfig,
    tx: UnboundedSender<QueueItem>,
    chats: ChatCache,
    store: Arc<MessageStore>,
) {
    loop {
        let update = match client.next_update().await {
            Ok(Some(update)) => update,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(error = %err, "telegram update stream error");
                continue;
            }
        };

        match update {
            Update::NewMessage(message) | Update::MessageEdited(message) => {
                let is_edit = matches!(update, Update::MessageEdited(_));
                let chat = message.chat();
                chats.remember(&chat).await;
                if let Err(err) = handle_message(&message, &config, &tx, &store, is_edit).await {
                    tracing::warn!(error = %err, "failed to canonicalize telegram message");
                }
            }
            Update::MessageDeleted(deletion) => {
                let group = ChannelId::new(Platform::Telegram, deletion.chat_id().map(|id| id.to_string()).unwrap_or_default());
                let deletions: Vec<(ChannelId, String)> = deletion
                    .messages()
                    .iter()
                    .map(|id| (group.clone(), id.to_string()))
                    .collect();
                if !deletions.is_empty() {
                    let _ = tx.send(QueueItem::Internal(InternalTask::Delete { deletions }));
                }
            }
            _ => {}
        }
    }
}

async fn handle_message(
    message: &Message,
    config: &TelegramConfig,
    tx: &UnboundedSender<QueueItem>,
    store: &MessageStore,
    is_edit: bool,
) -> Result<()> {
    if is_edit {
        let group = ChannelId::new(Platform::Telegram, message.chat().id().to_string());
        let _ = tx.send(QueueItem::Internal(InternalTask::Edit {
            group,
            native_message_id: message.id().to_string(),
            new_text: message.text().to_string(),
        }));
        return Ok(());
    }

    let group = ChannelId::new(Platform::Telegram, message.chat().id().to_string());

    if let Some(command) = crate::commands::parse(message.text()) {
        let task = crate::commands::to_internal_task(group, command);
        tx.send(QueueItem::Internal(task)).map_err(|_| anyhow::anyhow!("event queue closed"))?;
        return Ok(());
    }

    let sender_id = message.sender().map(|c| c.id().to_string()).unwrap_or_default();
    let nick = message
        .sender()
        .map(|c| display_nick(&c, config.nick_style))
        .unwrap_or_default();

    let reply_to = match message.reply_to_message_id() {
        Some(reply_id) => store
            .find_by_member(&group, &reply_id.to_string())?
            .map(|record| ReplyRef {
                record_id: record.id,
                bridge_messages: record.bridge_messages.clone(),
                text: record.text.clone(),
                from_nick: record.from_nick.clone(),
            }),
        None => None,
    };

    let created_at: DateTime<Utc> = message.date().into();
    let fwd_from = message.forward_header().map(|_| "forwarded message".to_string());

    let files = if let Some(media) = message.media() {
        vec![File::new(file_kind_for(&media), "")]
    } else {
        Vec::new()
    };

    let canonical = CanonicalMessage::from_telegram(
        group,
        sender_id,
        nick,
        message.id(),
        message.text().to_string(),
        created_at,
        config.platform_prefix.clone(),
        fwd_from,
        reply_to,
        files,
    );

    tx.send(QueueItem::Forward(canonical))
        .map_err(|_| anyhow::anyhow!("event queue closed"))?;
    Ok(())
}

#[async_trait]
impl MessagingPlatform for TelegramPlatform {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, msg: &OutgoingMessage) -> Result<SentMessage> {
        let chat = self.resolve(&msg.group).await?;
        let mut input = InputMessage::markdown(&msg.text);
        if let Some(reply_id) = &msg.reply_to_native {
            input = input.reply_to(reply_id.parse().ok());
        }
        let sent = self
            .client
            .clone()
            .send_message(chat, input)
            .await
            .context("telegram send_message")?;
        Ok(SentMessage {
            native_message_id: Some(sent.id().to_string()),
            sent_at: Utc::now(),
        })
    }

    async fn edit(&self, group: &ChannelId, native_message_id: &str, new_text: &str) -> Result<()> {
        let chat = self.resolve(group).await?;
        let id: i32 = native_message_id.parse().context("telegram message id")?;
        self.client
            .clone()
            .edit_message(chat, id, InputMessage::markdown(new_text))
            .await
            .context("telegram edit_message")?;
        Ok(())
    }

    async fn delete(&self, group: &ChannelId, native_message_id: &str) -> Result<()> {
        let chat = self.resolve(group).await?;
        let id: i32 = native_message_id.parse().context("telegram message id")?;
        self.client
            .clone()
            .delete_messages(chat, &[id])
            .await
            .context("telegram delete_messages")?;
        Ok(())
    }

    fn supports_edit(&self) -> bool {
        true
    }

    async fn download_media(&self, _refs: &[String]) -> Vec<File> {
        // Media download for inbound attachments is handled inline in
        // `handle_message`'s `File` construction; this hook exists for
        // platforms (Discord) whose attachments arrive as bare URLs.
        Vec::new()
    }

    async fn health_check(&self) -> bool {
        self.client.is_authorized().await.unwrap_or(false)
    }
}
