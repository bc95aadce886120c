use log::debug;

use crate::chat::{ChannelInfo, ChatMessage, GrantTarget, PermissionSnapshot};
use crate::tickets::claim::CLAIM_ANNOUNCEMENT_PREFIX;
use crate::tickets::types::{ClaimEvent, Lifecycle, Ticket, TicketCategory, TicketId};

use crate::chat::UserRef;

/// Best-effort state rebuilt from a channel after a restart wiped the store.
/// Advisory only: it feeds the transcript and permission state and must never
/// block closure — unresolved fields stay `None`/empty.
#[derive(Debug, Clone, Default)]
pub struct PartialTicket {
    pub category: Option<TicketCategory>,
    pub created_by: Option<UserRef>,
    pub claim_history: Vec<ClaimEvent>,
}

impl PartialTicket {
    /// A recovered ticket is by definition mid-countdown: the only way the
    /// sweeper finds it is under the soft-close marker.
    pub fn into_ticket(self, id: TicketId) -> Ticket {
        let mut ticket = Ticket::new(id, self.category.unwrap_or_default());
        ticket.created_by = self.created_by;
        ticket.claim_history = self.claim_history;
        ticket.lifecycle = Lifecycle::SoftClosing;
        ticket
    }
}

/// Replays the channel history and permission snapshot into a plausible
/// ticket state. Ordered heuristic, first match per field wins:
///
/// 1. Creator: author of the earliest non-bot message.
/// 2. Claim history: chronological scan for claim announcements, resolving
///    the mentioned identity from each message's mention list.
/// 3. Fallback claimant: a member-targeted send grant held by an admin, with
///    the channel creation time as a placeholder timestamp.
pub fn reconstruct(
    channel: &ChannelInfo,
    history: &[ChatMessage],
    permissions: &PermissionSnapshot,
) -> PartialTicket {
    let created_by = history
        .iter()
        .find(|message| !message.author_is_bot)
        .map(|message| message.author.clone());

    let mut claim_history: Vec<ClaimEvent> = Vec::new();
    for message in history {
        if !message.author_is_bot || !message.content.starts_with(CLAIM_ANNOUNCEMENT_PREFIX) {
            continue;
        }
        let Some(admin) = message.mentions.first() else {
            continue;
        };
        let already_seen = claim_history
            .iter()
            .any(|event| event.admin.id == admin.id && event.claimed_at == message.timestamp);
        if !already_seen {
            claim_history.push(ClaimEvent {
                admin: admin.clone(),
                claimed_at: message.timestamp,
            });
        }
    }

    if claim_history.is_empty() {
        if let Some(admin) = infer_claimant_from_permissions(permissions) {
            debug!(
                "Channel {}: claimant {} inferred from permission grant",
                channel.id, admin.label
            );
            claim_history.push(ClaimEvent {
                admin,
                claimed_at: channel.created_at,
            });
        }
    }

    PartialTicket {
        category: TicketCategory::from_channel_name(&channel.name),
        created_by,
        claim_history,
    }
}

/// A non-role grant that targets an individual, allows sending, and belongs
/// to an identity holding an administrative role.
fn infer_claimant_from_permissions(permissions: &PermissionSnapshot) -> Option<UserRef> {
    permissions.grants.iter().find_map(|grant| {
        if !grant.allow_send || !grant.is_admin {
            return None;
        }
        match &grant.target {
            GrantTarget::Member(user) => Some(user.clone()),
            GrantTarget::Role { .. } => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::PermissionGrant;
    use crate::tickets::claim::claim_announcement;
    use chrono::{TimeZone, Utc};

    fn channel(name: &str) -> ChannelInfo {
        ChannelInfo {
            id: "c1".into(),
            name: name.into(),
            guild_id: "g1".into(),
            guild_name: "Guild".into(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn human(id: &str, label: &str, content: &str, minute: u32) -> ChatMessage {
        ChatMessage {
            id: format!("m-{id}-{minute}"),
            author: UserRef::new(id, label),
            author_is_bot: false,
            content: content.into(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap(),
            mentions: vec![],
            embeds: vec![],
            attachments: vec![],
        }
    }

    fn claim_message(admin: &UserRef, minute: u32) -> ChatMessage {
        ChatMessage {
            id: format!("claim-{minute}"),
            author: UserRef::new("bot", "TicketBot"),
            author_is_bot: true,
            content: claim_announcement(admin),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap(),
            mentions: vec![admin.clone()],
            embeds: vec![],
            attachments: vec![],
        }
    }

    #[test]
    fn creator_is_earliest_human_author() {
        let bot_greeting = ChatMessage {
            author_is_bot: true,
            ..human("bot", "TicketBot", "Welcome!", 0)
        };
        let history = vec![
            bot_greeting,
            human("u1", "Alice", "hi, I need help", 1),
            human("u2", "Bob", "same here", 2),
        ];

        let partial = reconstruct(&channel("join-alice"), &history, &Default::default());
        assert_eq!(partial.created_by.unwrap().id, "u1");
        assert_eq!(partial.category, Some(TicketCategory::Join));
    }

    #[test]
    fn claim_history_rebuilt_in_order_from_announcements() {
        let a1 = UserRef::new("a1", "Ann");
        let a2 = UserRef::new("a2", "Ben");
        let history = vec![
            human("u1", "Alice", "hello", 0),
            claim_message(&a1, 5),
            human("u1", "Alice", "thanks", 6),
            claim_message(&a2, 10),
        ];

        let partial = reconstruct(&channel("general-alice"), &history, &Default::default());
        let ids: Vec<&str> = partial
            .claim_history
            .iter()
            .map(|e| e.admin.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert_eq!(partial.claim_history.last().unwrap().admin.id, "a2");
    }

    #[test]
    fn fallback_claimant_from_admin_send_grant() {
        let ch = channel("closing-join-alice");
        let permissions = PermissionSnapshot {
            grants: vec![
                PermissionGrant {
                    target: GrantTarget::Role { id: "r1".into() },
                    allow_send: true,
                    is_admin: true,
                },
                PermissionGrant {
                    target: GrantTarget::Member(UserRef::new("u1", "Alice")),
                    allow_send: true,
                    is_admin: false,
                },
                PermissionGrant {
                    target: GrantTarget::Member(UserRef::new("a3", "Cara")),
                    allow_send: true,
                    is_admin: true,
                },
            ],
        };
        let history = vec![human("u1", "Alice", "hello", 1)];

        let partial = reconstruct(&ch, &history, &permissions);
        assert_eq!(partial.claim_history.len(), 1);
        let event = &partial.claim_history[0];
        assert_eq!(event.admin.id, "a3");
        assert_eq!(event.claimed_at, ch.created_at);
        assert_eq!(partial.category, Some(TicketCategory::Join));
    }

    #[test]
    fn announcements_take_precedence_over_permission_fallback() {
        let a1 = UserRef::new("a1", "Ann");
        let permissions = PermissionSnapshot {
            grants: vec![PermissionGrant {
                target: GrantTarget::Member(UserRef::new("a3", "Cara")),
                allow_send: true,
                is_admin: true,
            }],
        };
        let history = vec![claim_message(&a1, 5)];

        let partial = reconstruct(&channel("shop-bob"), &history, &permissions);
        assert_eq!(partial.claim_history.len(), 1);
        assert_eq!(partial.claim_history[0].admin.id, "a1");
    }

    #[test]
    fn empty_channel_resolves_nothing_and_still_converts() {
        let partial = reconstruct(&channel("closing-weird-name"), &[], &Default::default());
        assert!(partial.created_by.is_none());
        assert!(partial.claim_history.is_empty());
        assert_eq!(partial.category, None);

        let ticket = partial.into_ticket(TicketId::from("c1"));
        assert_eq!(ticket.lifecycle, Lifecycle::SoftClosing);
        assert_eq!(ticket.category, TicketCategory::General);
    }

    #[test]
    fn duplicate_announcements_are_collapsed() {
        let a1 = UserRef::new("a1", "Ann");
        let duplicate = claim_message(&a1, 5);
        let history = vec![duplicate.clone(), duplicate];

        let partial = reconstruct(&channel("general-x"), &history, &Default::default());
        assert_eq!(partial.claim_history.len(), 1);
    }
}
