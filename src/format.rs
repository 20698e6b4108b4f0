//! Relay text formatting (spec.md §6.2).

use crate::channel_id::Platform;
use crate::model::{CanonicalMessage, File};

const IRC_BOLD: char = '\u{02}';
const IRC_COLOR: char = '\u{03}';
const IRC_RESET_MARK: char = '\u{1E}';

/// `<bold>nick</bold>` per destination platform.
fn bold(platform: Platform, text: &str) -> String {
    match platform {
        Platform::Irc => format!("{IRC_BOLD}{text}{IRC_BOLD}"),
        Platform::Telegram | Platform::Discord => format!("**{text}**"),
    }
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

fn reply_prefix(platform: Platform, msg: &CanonicalMessage) -> String {
    // Only IRC renders an inline reply prefix; other platforms use a
    // native reply reference instead (spec.md §6.2, §4.5.1).
    if platform != Platform::Irc {
        return String::new();
    }
    match &msg.reply_to {
        Some(reply) => format!(
            "Re {} \u{300c}{}\u{300d}: ",
            reply.from_nick,
            truncate_with_ellipsis(&reply.text, 50)
        ),
        None => String::new(),
    }
}

fn fwd_prefix(msg: &CanonicalMessage) -> String {
    match &msg.fwd_from {
        Some(source) => format!("Fwd {source}: "),
        None => String::new(),
    }
}

fn files_prefix(platform: Platform, files: &[File]) -> String {
    if files.is_empty() {
        return String::new();
    }
    match platform {
        Platform::Irc => files
            .iter()
            .map(|f| {
                if f.public_url.is_empty() {
                    format!("[{}] ", f.extension)
                } else {
                    format!("[{}] ", f.public_url)
                }
            })
            .collect(),
        Platform::Telegram | Platform::Discord => {
            if files.len() > 1 {
                format!("<album: {} files> ", files.len())
            } else {
                let f = &files[0];
                let name = f
                    .metadata
                    .filename
                    .clone()
                    .unwrap_or_else(|| format!("file.{}", f.extension));
                format!("<{name}> ")
            }
        }
    }
}

/// `[<platform_prefix> - <bold>nick</bold>] <reply?> <fwd?> <files?> <text>`.
/// System events skip the bracket prefix entirely and render as inline code
/// where the destination platform supports it.
pub fn format_for_platform(msg: &CanonicalMessage, platform: Platform) -> String {
    if msg.system {
        return match platform {
            Platform::Irc => msg.text.clone(),
            Platform::Telegram | Platform::Discord => format!("`{}`", msg.text),
        };
    }

    let header = format!("[{} - {}]", msg.platform_prefix, bold(platform, &msg.from_nick));
    let reply = reply_prefix(platform, msg);
    let fwd = fwd_prefix(msg);
    let files = files_prefix(platform, &msg.files);
    format!("{header} {reply}{fwd}{files}{}", msg.text)
}

/// `\x1E<old≤50,…>\x1E \x02\x0312was edited to:\x03\x02 <new>` (spec.md §6.2).
pub fn irc_edit_notice(old_text: &str, new_text: &str) -> String {
    format!(
        "{IRC_RESET_MARK}{}{IRC_RESET_MARK} {IRC_BOLD}{IRC_COLOR}12was edited to:{IRC_COLOR}{IRC_BOLD} {}",
        truncate_with_ellipsis(old_text, 50),
        new_text
    )
}

/// `\x1E<old≤200,…>\x1E[ and K more messages] \x02\x0304was/were deleted\x03\x02`.
pub fn irc_delete_notice(old_text: &str, extra_count: usize) -> String {
    let extra = if extra_count > 0 {
        format!(" and {extra_count} more messages")
    } else {
        String::new()
    };
    let verb = if extra_count > 0 { "were" } else { "was" };
    format!(
        "{IRC_RESET_MARK}{}{IRC_RESET_MARK}{extra} {IRC_BOLD}{IRC_COLOR}04{verb} deleted{IRC_COLOR}{IRC_BOLD}",
        truncate_with_ellipsis(old_text, 200)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_id::ChannelId;
    use chrono::Utc;

    fn base_msg() -> CanonicalMessage {
        CanonicalMessage::from_irc(
            ChannelId::new(crate::channel_id::Platform::Irc, "#a"),
            "alice!~a@host",
            "alice",
            "hello",
            "I",
            None,
        )
    }

    #[test]
    fn simple_message_formats_with_bold_nick() {
        let msg = base_msg();
        let rendered = format_for_platform(&msg, Platform::Telegram);
        assert_eq!(rendered, "[I - **alice**] hello");
    }

    #[test]
    fn irc_uses_control_char_bold_not_markdown() {
        let msg = base_msg();
        let rendered = format_for_platform(&msg, Platform::Irc);
        assert!(rendered.contains(IRC_BOLD));
        assert!(!rendered.contains("**"));
    }

    #[test]
    fn system_event_has_no_bracket_prefix() {
        let msg = CanonicalMessage::irc_system_event(
            ChannelId::new(crate::channel_id::Platform::Irc, "#a"),
            "bob!~b@host",
            "bob",
            "bob has quit (Remote host closed the connection)",
        );
        let rendered = format_for_platform(&msg, Platform::Telegram);
        assert_eq!(rendered, "`bob has quit (Remote host closed the connection)`");
    }

    #[test]
    fn reply_prefix_only_rendered_for_irc() {
        let mut msg = base_msg();
        msg.reply_to = Some(crate::model::ReplyRef {
            record_id: 1,
            bridge_messages: Vec::new(),
            text: "original text".into(),
            from_nick: "carol".into(),
        });

        let irc_rendered = format_for_platform(&msg, Platform::Irc);
        assert!(irc_rendered.contains("Re carol"));

        let tg_rendered = format_for_platform(&msg, Platform::Telegram);
        assert!(!tg_rendered.contains("Re carol"));
        let _ = Utc::now();
    }

    #[test]
    fn multiple_files_collapse_to_album_marker_off_irc() {
        let mut msg = base_msg();
        msg.files = vec![
            File::new(crate::model::FileKind::Photo, "/tmp/a.jpg"),
            File::new(crate::model::FileKind::Photo, "/tmp/b.jpg"),
        ];
        let rendered = format_for_platform(&msg, Platform::Discord);
        assert!(rendered.contains("<album: 2 files>"));
    }

    #[test]
    fn irc_edit_and_delete_notices_carry_control_codes() {
        let edit = irc_edit_notice("old", "new");
        assert!(edit.contains("was edited to:"));
        assert!(edit.starts_with(IRC_RESET_MARK));

        let delete_one = irc_delete_notice("gone", 0);
        assert!(delete_one.contains("was deleted"));
        let delete_many = irc_delete_notice("gone", 2);
        assert!(delete_many.contains("were deleted"));
        assert!(delete_many.contains("and 2 more messages"));
    }
}
