//! Plain-text IRC client: connect, register, join configured channels,
//! relay PRIVMSGs and system events onto the event queue, send outbound
//! text with overflow handling (spec.md §4.1 IRC row, §4.5.1 IRC contract).

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rustls_pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc::UnboundedSender, Mutex};

use crate::channel_id::{ChannelId, Platform};
use crate::config::IrcConfig;
use crate::model::{CanonicalMessage, File};
use crate::queue::QueueItem;

use super::{MessagingPlatform, OutgoingMessage, SentMessage};

trait IrcStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> IrcStream for T {}

struct ParsedLine {
    prefix: Option<String>,
    command: String,
    params: Vec<String>,
    trailing: Option<String>,
}

impl ParsedLine {
    fn prefix_nick(&self) -> Option<&str> {
        self.prefix.as_deref().map(|p| p.split('!').next().unwrap_or(p))
    }

    fn hostmask(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }
}

fn parse_line(line: &str) -> ParsedLine {
    let mut remaining = line;
    let prefix = if let Some(stripped) = remaining.strip_prefix(':') {
        let end = stripped.find(' ').unwrap_or(stripped.len());
        let p = stripped[..end].to_string();
        remaining = stripped[end..].trim_start();
        Some(p)
    } else {
        None
    };

    let (main, trailing) = match remaining.find(" :") {
        Some(idx) => (&remaining[..idx], Some(remaining[idx + 2..].to_string())),
        None => (remaining, None),
    };

    let parts: Vec<&str> = main.split_whitespace().collect();
    let command = parts.first().copied().unwrap_or("").to_string();
    let params: Vec<String> = parts[1..].iter().map(|s| s.to_string()).collect();

    ParsedLine { prefix, command, params, trailing }
}

/// Pending WHOIS/WHOWAS lookups keyed by lowercased nick, resolved by
/// `listen_loop` when the matching numeric reply (or end-of-list) arrives.
type PendingReplies = Arc<std::sync::Mutex<std::collections::HashMap<String, tokio::sync::oneshot::Sender<Option<String>>>>>;
type PendingNames = Arc<std::sync::Mutex<std::collections::HashMap<String, (Vec<String>, tokio::sync::oneshot::Sender<Vec<String>>)>>>;

pub struct IrcPlatform {
    config: IrcConfig,
    writer: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
    pending_whois: PendingReplies,
    pending_whowas: PendingReplies,
    pending_names: PendingNames,
}

impl IrcPlatform {
    /// Connect, register, and join every channel in `groups` on this one
    /// connection (a single IRC client, like the Telegram/Discord clients,
    /// serves every bridged channel on that network).
    pub async fn connect(
        config: IrcConfig,
        groups: Vec<ChannelId>,
        tx: UnboundedSender<QueueItem>,
    ) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let tcp = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("connecting to irc host {addr}"))?;

        let stream: Box<dyn IrcStream> = if config.ssl {
            let mut roots = tokio_rustls::rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            let tls_config = tokio_rustls::rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();
            let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));
            let server_name = ServerName::try_from(config.host.clone())
                .map_err(|e| anyhow::anyhow!("invalid irc host name {}: {e}", config.host))?;
            Box::new(connector.connect(server_name, tcp).await.context("irc tls handshake")?)
        } else {
            Box::new(tcp)
        };

        let (reader, writer) = tokio::io::split(stream);
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let writer = Arc::new(Mutex::new(writer));

        {
            let mut w = writer.lock().await;
            if let Some(pass) = &config.password {
                w.write_all(format!("PASS {pass}\r\n").as_bytes()).await?;
            }
            w.write_all(format!("NICK {}\r\n", config.nick).as_bytes()).await?;
            w.write_all(
                format!("USER {} 0 * :{}\r\n", config.username, config.real_name).as_bytes(),
            )
            .await?;
        }

        let pending_whois: PendingReplies = Arc::new(std::sync::Mutex::new(std::collections::HashMap::new()));
        let pending_whowas: PendingReplies = Arc::new(std::sync::Mutex::new(std::collections::HashMap::new()));
        let pending_names: PendingNames = Arc::new(std::sync::Mutex::new(std::collections::HashMap::new()));

        let platform = Self {
            config: config.clone(),
            writer: writer.clone(),
            pending_whois: pending_whois.clone(),
            pending_whowas: pending_whowas.clone(),
            pending_names: pending_names.clone(),
        };

        tokio::spawn(listen_loop(
            reader,
            writer,
            config,
            groups,
            tx,
            pending_whois,
            pending_whowas,
            pending_names,
        ));

        Ok(platform)
    }

    /// `NAMES <channel>`, accumulated across RPL_NAMREPLY (353) lines until
    /// RPL_ENDOFNAMES (366). No fixed timeout — the server always sends
    /// end-of-list, even for an empty channel (spec.md §6.4 `ircnames`).
    pub async fn names(&self, channel: &str) -> Vec<String> {
        let (respond_to, response) = tokio::sync::oneshot::channel();
        self.pending_names
            .lock()
            .unwrap()
            .insert(channel.to_ascii_lowercase(), (Vec::new(), respond_to));

        let mut w = self.writer.lock().await;
        if w.write_all(format!("NAMES {channel}\r\n").as_bytes()).await.is_err() {
            drop(w);
            self.pending_names.lock().unwrap().remove(&channel.to_ascii_lowercase());
            return Vec::new();
        }
        drop(w);

        response.await.unwrap_or_default()
    }

    /// `WHOIS <nick>`, resolved by the listener loop on RPL_WHOISUSER (311)
    /// or ERR_NOSUCHNICK (401), whichever arrives first. Times out after
    /// 2s, comfortably inside the 3s Discord interaction deadline
    /// (spec.md §5 "Cancellation & timeouts").
    pub async fn whois(&self, nick: &str) -> Option<String> {
        self.request_reply(&self.pending_whois, "WHOIS", nick).await
    }

    pub async fn whowas(&self, nick: &str) -> Option<String> {
        self.request_reply(&self.pending_whowas, "WHOWAS", nick).await
    }

    async fn request_reply(&self, table: &PendingReplies, command: &str, nick: &str) -> Option<String> {
        let (respond_to, response) = tokio::sync::oneshot::channel();
        table.lock().unwrap().insert(nick.to_ascii_lowercase(), respond_to);

        {
            let mut w = self.writer.lock().await;
            if w.write_all(format!("{command} {nick}\r\n").as_bytes()).await.is_err() {
                table.lock().unwrap().remove(&nick.to_ascii_lowercase());
                return None;
            }
        }

        match tokio::time::timeout(std::time::Duration::from_secs(2), response).await {
            Ok(Ok(result)) => result,
            _ => {
                table.lock().unwrap().remove(&nick.to_ascii_lowercase());
                None
            }
        }
    }
}

async fn listen_loop(
    reader: tokio::io::ReadHalf<Box<dyn IrcStream>>,
    writer: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
    config: IrcConfig,
    groups: Vec<ChannelId>,
    tx: UnboundedSender<QueueItem>,
    pending_whois: PendingReplies,
    pending_whowas: PendingReplies,
    pending_names: PendingNames,
) {
    let mut lines = BufReader::new(reader).lines();
    let mut registered = false;
    let join_channels: Vec<String> = groups.iter().map(|g| g.native_id().to_string()).collect();
    let joined_lower: HashSet<String> = join_channels.iter().map(|c| c.to_ascii_lowercase()).collect();
    let channel_for = |native: &str| -> ChannelId { ChannelId::new(Platform::Irc, native) };

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::warn!(channels = ?join_channels, "irc connection closed by peer");
                break;
            }
            Err(err) => {
                tracing::warn!(channels = ?join_channels, error = %err, "irc read error");
                break;
            }
        };
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("PING") {
            let mut w = writer.lock().await;
            let _ = w.write_all(format!("PONG{rest}\r\n").as_bytes()).await;
            continue;
        }

        let parsed = parse_line(&line);

        if parsed.command == "001" && !registered {
            registered = true;
            let mut w = writer.lock().await;
            for channel in &join_channels {
                let _ = w.write_all(format!("JOIN {channel}\r\n").as_bytes()).await;
            }
            continue;
        }

        match parsed.command.as_str() {
            // RPL_WHOISUSER / RPL_WHOWASUSER: params[1] is the queried
            // nick, params[2]/[3] are user/host, trailing is the real name.
            "311" | "314" => {
                if let Some(queried) = parsed.params.get(1) {
                    let user = parsed.params.get(2).map(String::as_str).unwrap_or("");
                    let host = parsed.params.get(3).map(String::as_str).unwrap_or("");
                    let real_name = parsed.trailing.clone().unwrap_or_default();
                    let result = Some(format!("{queried} is {user}@{host} ({real_name})"));
                    let table = if parsed.command == "311" { &pending_whois } else { &pending_whowas };
                    if let Some(tx) = table.lock().unwrap().remove(&queried.to_ascii_lowercase()) {
                        let _ = tx.send(result);
                    }
                }
                continue;
            }
            // ERR_NOSUCHNICK / ERR_WASNOSUCHNICK
            "401" | "406" => {
                if let Some(queried) = parsed.params.get(1) {
                    let table = if parsed.command == "401" { &pending_whois } else { &pending_whowas };
                    if let Some(tx) = table.lock().unwrap().remove(&queried.to_ascii_lowercase()) {
                        let _ = tx.send(None);
                    }
                }
                continue;
            }
            // RPL_NAMREPLY: params = [ournick, chan_type, channel], trailing = space-separated nicks
            "353" => {
                if let Some(channel) = parsed.params.get(2) {
                    let key = channel.to_ascii_lowercase();
                    if let Some((names, _)) = pending_names.lock().unwrap().get_mut(&key) {
                        if let Some(trailing) = &parsed.trailing {
                            names.extend(trailing.split_whitespace().map(|n| n.trim_start_matches(['@', '+']).to_string()));
                        }
                    }
                }
                continue;
            }
            // RPL_ENDOFNAMES
            "366" => {
                if let Some(channel) = parsed.params.get(1) {
                    let key = channel.to_ascii_lowercase();
                    if let Some((names, tx)) = pending_names.lock().unwrap().remove(&key) {
                        let _ = tx.send(names);
                    }
                }
                continue;
            }
            _ => {}
        }

        let nick = parsed.prefix_nick().unwrap_or_default();
        if nick == config.nick {
            // Never relay our own NICK/PRIVMSG back to ourselves.
            continue;
        }

        let target = parsed.params.first().map(String::as_str).unwrap_or_default();
        let is_channel_scoped = !matches!(parsed.command.as_str(), "QUIT" | "NICK");
        if is_channel_scoped && !joined_lower.contains(&target.to_ascii_lowercase()) {
            continue;
        }

        // QUIT/NICK carry no channel in their params; plain IRC gives no
        // cheap way to know which of our joined channels the nick was
        // visible in without tracking NAMES state, so broadcast to all of
        // them (same fidelity the single-channel design had, generalized).
        let event_channels: Vec<ChannelId> = if is_channel_scoped {
            vec![channel_for(target)]
        } else {
            join_channels.iter().map(|c| channel_for(c)).collect()
        };

        let msgs: Vec<CanonicalMessage> = match parsed.command.as_str() {
            "PRIVMSG" => {
                let text = parsed.trailing.clone().unwrap_or_default();
                if text.is_empty() {
                    continue;
                }
                event_channels
                    .into_iter()
                    .map(|channel| {
                        CanonicalMessage::from_irc(
                            channel,
                            parsed.hostmask(),
                            nick,
                            text.clone(),
                            config.platform_prefix.clone(),
                            None,
                        )
                    })
                    .collect()
            }
            "PART" => event_channels
                .into_iter()
                .map(|channel| {
                    let native = channel.native_id().to_string();
                    CanonicalMessage::irc_system_event(
                        channel,
                        parsed.hostmask(),
                        nick,
                        format!("{nick} has left {native} ({})", parsed.trailing.clone().unwrap_or_default()),
                    )
                })
                .collect(),
            "QUIT" => event_channels
                .into_iter()
                .map(|channel| {
                    CanonicalMessage::irc_system_event(
                        channel,
                        parsed.hostmask(),
                        nick,
                        format!("{nick} has quit ({})", parsed.trailing.clone().unwrap_or_default()),
                    )
                })
                .collect(),
            "KICK" => {
                let kicked = parsed.params.get(1).cloned().unwrap_or_default();
                event_channels
                    .into_iter()
                    .map(|channel| {
                        CanonicalMessage::irc_system_event(
                            channel,
                            parsed.hostmask(),
                            nick,
                            format!(
                                "{kicked} was kicked by {nick} ({})",
                                parsed.trailing.clone().unwrap_or_default()
                            ),
                        )
                    })
                    .collect()
            }
            "NICK" => {
                let new_nick = parsed.trailing.clone().unwrap_or_default();
                event_channels
                    .into_iter()
                    .map(|channel| {
                        CanonicalMessage::irc_system_event(
                            channel,
                            parsed.hostmask(),
                            nick,
                            format!("{nick} is now known as {new_nick}"),
                        )
                    })
                    .collect()
            }
            _ => Vec::new(),
        };

        let mut queue_closed = false;
        for msg in msgs {
            if tx.send(QueueItem::Forward(msg)).is_err() {
                tracing::warn!("event queue closed, stopping irc listener");
                queue_closed = true;
                break;
            }
        }
        if queue_closed {
            break;
        }
    }
}

/// Splits `text` into `config.max_lines`-sized chunks, or replaces it with
/// a single truncated line plus an upload URL when `upload_long_msg` is
/// enabled and the text overflows (spec.md §4.5.1 IRC contract).
fn prepare_outgoing_text(config: &IrcConfig, text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= config.max_lines {
        return lines.iter().map(|s| s.to_string()).collect();
    }
    if config.upload_long_msg {
        // Upload delegation is an external collaborator (spec.md §1); the
        // caller is responsible for having already rewritten `text` to a
        // truncated-preview + URL form before calling send() in that case.
        return vec![text.to_string()];
    }
    lines
        .into_iter()
        .take(config.max_lines)
        .map(|s| s.to_string())
        .collect()
}

#[async_trait]
impl MessagingPlatform for IrcPlatform {
    fn name(&self) -> &'static str {
        "irc"
    }

    async fn send(&self, msg: &OutgoingMessage) -> Result<SentMessage> {
        let chunks = prepare_outgoing_text(&self.config, &msg.text);
        let mut w = self.writer.lock().await;
        for (i, chunk) in chunks.iter().enumerate() {
            w.write_all(format!("PRIVMSG {} :{chunk}\r\n", msg.group.native_id()).as_bytes())
                .await?;
            if i + 1 < chunks.len() {
                drop(w);
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                w = self.writer.lock().await;
            }
        }
        Ok(SentMessage {
            native_message_id: None,
            sent_at: chrono::Utc::now(),
        })
    }

    async fn edit(&self, _group: &ChannelId, _native_message_id: &str, _new_text: &str) -> Result<()> {
        // IRC has no in-place edit; the worker renders an edit notice as a
        // regular send instead (spec.md §6.2).
        Ok(())
    }

    async fn delete(&self, _group: &ChannelId, _native_message_id: &str) -> Result<()> {
        Ok(())
    }

    fn supports_edit(&self) -> bool {
        false
    }

    async fn download_media(&self, _refs: &[String]) -> Vec<File> {
        Vec::new()
    }

    async fn health_check(&self) -> bool {
        self.writer.try_lock().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> IrcConfig {
        IrcConfig {
            host: "irc.example.org".into(),
            port: 6697,
            ssl: true,
            nick: "bridge".into(),
            real_name: "bridge".into(),
            username: "bridge".into(),
            password: None,
            max_lines: 3,
            upload_long_msg: false,
            platform_prefix: "I".into(),
            system_message_window_secs: 600,
        }
    }

    #[test]
    fn short_text_is_not_split() {
        let chunks = prepare_outgoing_text(&sample_config(), "one\ntwo");
        assert_eq!(chunks, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn overflow_without_upload_is_truncated_to_max_lines() {
        let chunks = prepare_outgoing_text(&sample_config(), "a\nb\nc\nd\ne");
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn parse_line_extracts_prefix_command_and_trailing() {
        let parsed = parse_line(":alice!~a@host PRIVMSG #a :hello world");
        assert_eq!(parsed.prefix_nick(), Some("alice"));
        assert_eq!(parsed.command, "PRIVMSG");
        assert_eq!(parsed.params, vec!["#a".to_string()]);
        assert_eq!(parsed.trailing.as_deref(), Some("hello world"));
    }
}
