use serde::{Deserialize, Serialize};

use crate::chat::{ChannelInfo, ChatMessage, UserRef};
use crate::tickets::types::{CloseReason, Ticket};

const AUTO_CLOSED_LINE: &str = "Soft-closed and auto-archived after 24 hours of inactivity";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantCount {
    pub user: UserRef,
    pub count: usize,
}

/// The persisted artifact of a closed ticket: the rendered text blob plus the
/// metadata the collaborator layer may want for its own presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptDocument {
    pub channel_id: String,
    pub channel_name: String,
    pub content: String,
    pub message_count: usize,
    /// Descending by message count.
    pub participants: Vec<ParticipantCount>,
    pub closed_by: Option<UserRef>,
    pub summary: String,
    pub auto_closed: bool,
}

/// Renders a ticket's full message history plus lifecycle metadata into the
/// fixed transcript format. Pure and deterministic: identical inputs yield an
/// identical document, with no randomness and no wall-clock reads beyond the
/// timestamps already present in the input.
pub fn render(
    ticket: &Ticket,
    channel: &ChannelInfo,
    history: &[ChatMessage],
    reason: &CloseReason,
) -> TranscriptDocument {
    let participants = count_participants(history);
    let auto_closed = matches!(reason, CloseReason::Inactivity);
    let closed_by = match reason {
        CloseReason::Inactivity => None,
        CloseReason::Manual { closer } => closer.clone(),
    };

    let mut out = String::new();

    out.push_str("<Server-Info>\n");
    out.push_str(&format!(
        "    Server: {} ({})\n",
        channel.guild_name, channel.guild_id
    ));
    out.push_str(&format!("    Channel: {} ({})\n", channel.name, channel.id));
    out.push_str(&format!("    Messages: {}\n", history.len()));
    out.push('\n');

    if let Some(creator) = &ticket.created_by {
        out.push_str("<Ticket-Creator>\n");
        out.push_str(&format!(
            "    Created by: {} ({}) - {}\n",
            creator.label,
            creator.id,
            creator.mention()
        ));
        if ticket.verified {
            out.push_str("    Verified: yes\n");
        }
        out.push('\n');
    }

    if let Some(claim) = ticket.current_claim() {
        out.push_str("<Ticket-Claimed>\n");
        out.push_str(&format!(
            "    Claimed by: {} ({}) - {}\n",
            claim.admin.label,
            claim.admin.id,
            claim.admin.mention()
        ));
        out.push_str(&format!("    Claimed at: {}\n", claim.claimed_at.to_rfc3339()));
        out.push('\n');
    }

    out.push_str("<User-Info>\n");
    for participant in &participants {
        out.push_str(&format!(
            "    {} - {} ({})\n",
            participant.count, participant.user.label, participant.user.id
        ));
    }
    out.push('\n');

    out.push_str("<Admin-Summary>\n");
    out.push_str(&format!("    {}\n", ticket.soft_close_summary));
    out.push('\n');

    if auto_closed {
        out.push_str("<Auto-Closed>\n");
        out.push_str(&format!("    {AUTO_CLOSED_LINE}\n"));
        out.push('\n');
    }

    for message in history {
        out.push_str(&render_message(message));
        out.push('\n');
    }

    TranscriptDocument {
        channel_id: channel.id.clone(),
        channel_name: channel.name.clone(),
        content: out,
        message_count: history.len(),
        participants,
        closed_by,
        summary: ticket.soft_close_summary.clone(),
        auto_closed,
    }
}

fn render_message(message: &ChatMessage) -> String {
    let mut line = format!(
        "[{}] {}: {}",
        message.timestamp.format("%Y-%m-%d %H:%M:%S"),
        message.author.label,
        message.content
    );
    for embed in &message.embeds {
        line.push_str(&format!(
            "\n[Embed: {} {}]",
            embed.title.as_deref().unwrap_or(""),
            embed.description.as_deref().unwrap_or("")
        ));
    }
    for attachment in &message.attachments {
        line.push_str(&format!(
            "\n[Attachment: {} ({})]",
            attachment.name, attachment.url
        ));
    }
    line
}

/// Message counts per author, descending; ties keep first-appearance order.
fn count_participants(history: &[ChatMessage]) -> Vec<ParticipantCount> {
    let mut participants: Vec<ParticipantCount> = Vec::new();
    for message in history {
        match participants
            .iter_mut()
            .find(|p| p.user.id == message.author.id)
        {
            Some(participant) => participant.count += 1,
            None => participants.push(ParticipantCount {
                user: message.author.clone(),
                count: 1,
            }),
        }
    }
    participants.sort_by(|a, b| b.count.cmp(&a.count));
    participants
}
