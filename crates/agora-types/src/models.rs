use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stored or submitted value that does not name any variant of a choice enum.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("\"{value}\" is not a valid {kind}")]
pub struct UnknownChoice {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a closed set of choices stored as text columns and sent as
/// snake_case strings on the wire.
macro_rules! choice_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownChoice;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownChoice { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

// -- Chat --

choice_enum!(
    /// Presence reported by a user or derived from their gateway connection.
    PresenceStatus, "status" {
        Online => "online",
        Away => "away",
        Busy => "busy",
        Offline => "offline",
    }
);

choice_enum!(
    MessageType, "message type" {
        Text => "text",
        Image => "image",
        Video => "video",
        Audio => "audio",
        File => "file",
        Document => "document",
        System => "system",
    }
);

choice_enum!(
    ReactionKind, "reaction" {
        Like => "like",
        Love => "love",
        Laugh => "laugh",
        Wow => "wow",
        Sad => "sad",
        Angry => "angry",
    }
);

impl ReactionKind {
    pub fn emoji(&self) -> &'static str {
        match self {
            ReactionKind::Like => "\u{1F44D}",
            ReactionKind::Love => "\u{2764}\u{FE0F}",
            ReactionKind::Laugh => "\u{1F602}",
            ReactionKind::Wow => "\u{1F62E}",
            ReactionKind::Sad => "\u{1F622}",
            ReactionKind::Angry => "\u{1F620}",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionAction {
    Added,
    Removed,
}

// -- Profiles --

choice_enum!(
    RatingStatus, "rating status" {
        Active => "active",
        Hidden => "hidden",
    }
);

// -- Posts --

choice_enum!(
    ShareMethod, "share method" {
        WhatsApp => "whatsapp",
        Facebook => "facebook",
        ShareX => "share_x",
        LinkedIn => "linkedin",
        Telegram => "telegram",
        CopyLink => "copy_link",
        DirectLink => "direct_link",
    }
);

impl ShareMethod {
    pub fn display_name(&self) -> &'static str {
        match self {
            ShareMethod::WhatsApp => "WhatsApp",
            ShareMethod::Facebook => "Facebook",
            ShareMethod::ShareX => "X (Twitter)",
            ShareMethod::LinkedIn => "LinkedIn",
            ShareMethod::Telegram => "Telegram",
            ShareMethod::CopyLink => "Copy Link",
            ShareMethod::DirectLink => "Direct Link",
        }
    }

    /// Shares that leave the platform through a third-party network.
    pub fn is_social(&self) -> bool {
        !matches!(self, ShareMethod::CopyLink | ShareMethod::DirectLink)
    }
}

// -- Ads & events --

choice_enum!(
    AdEventType, "ad/event type" {
        Advertisement => "advertisement",
        Event => "event",
    }
);

choice_enum!(
    AdEventStatus, "ad/event status" {
        Active => "active",
        Suspended => "suspended",
        Expired => "expired",
        Draft => "draft",
    }
);

// -- News --

choice_enum!(
    ArticleStatus, "article status" {
        Draft => "draft",
        Published => "published",
        Archived => "archived",
        Featured => "featured",
    }
);

choice_enum!(
    ArticlePriority, "article priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Breaking => "breaking",
    }
);

// -- Reports --

choice_enum!(
    ReportStatus, "report status" {
        Pending => "pending",
        UnderReview => "under_review",
        Resolved => "resolved",
        Dismissed => "dismissed",
        Escalated => "escalated",
    }
);

impl ReportStatus {
    /// Statuses that close a review and stamp the reviewer.
    pub fn is_final(&self) -> bool {
        matches!(self, ReportStatus::Resolved | ReportStatus::Dismissed)
    }
}

choice_enum!(
    ReportAction, "report action" {
        NoAction => "none",
        Warning => "warning",
        ContentRemoval => "content_removal",
        AccountSuspension => "account_suspension",
        AccountDeactivation => "account_deactivation",
        Other => "other",
    }
);

choice_enum!(
    /// Kinds of content a report can point at.
    ReportedItemType, "item type" {
        Post => "post",
        Profile => "profile",
    }
);

impl ReportedItemType {
    /// Prefix of the human-readable report id.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ReportedItemType::Post => "LST",
            ReportedItemType::Profile => "USR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices_parse_their_own_text() {
        for method in ShareMethod::ALL {
            assert_eq!(method.as_str().parse::<ShareMethod>().unwrap(), *method);
        }
        assert_eq!("under_review".parse::<ReportStatus>().unwrap(), ReportStatus::UnderReview);
    }

    #[test]
    fn unknown_choice_names_the_kind() {
        let err = "poke".parse::<ReactionKind>().unwrap_err();
        assert_eq!(err.to_string(), "\"poke\" is not a valid reaction");
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&ReportAction::NoAction).unwrap();
        assert_eq!(json, "\"none\"");
        let parsed: ShareMethod = serde_json::from_str("\"share_x\"").unwrap();
        assert_eq!(parsed, ShareMethod::ShareX);
    }

    #[test]
    fn social_split() {
        assert!(ShareMethod::Telegram.is_social());
        assert!(!ShareMethod::CopyLink.is_social());
    }
}
