use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Generates a lowercase string enum that round-trips through SQLite TEXT
/// columns and JSON alike.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

text_enum! {
    /// Household role. Only parents are expected to manage the family.
    Role {
        Parent => "parent",
        Child => "child",
    }
}

text_enum! {
    EventSource {
        Ical => "ical",
        Google => "google",
        Alexa => "alexa",
        Manual => "manual",
    }
}

text_enum! {
    RecurrenceType {
        Daily => "daily",
        Weekly => "weekly",
        Monthly => "monthly",
    }
}

text_enum! {
    TimeOfDay {
        Morning => "morning",
        Afternoon => "afternoon",
        Evening => "evening",
        Anytime => "anytime",
    }
}

text_enum! {
    /// Origin of a ledger entry. Completion awards are created and retracted by
    /// the chore completion toggle; manual awards are granted by a family member.
    AwardKind {
        Completion => "completion",
        Manual => "manual",
    }
}

/// Recurrence metadata carried by a chore. Stored and echoed back, never
/// interpreted server-side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence_type: Option<RecurrenceType>,
    /// Every N days/weeks/months.
    pub recurrence_interval: Option<i64>,
    /// Times per period, e.g. twice a day.
    pub recurrence_count: Option<i64>,
    /// Days of the week (0-6) for weekly chores.
    #[serde(default)]
    pub recurrence_days: Vec<u8>,
    pub recurrence_time_of_day: Option<TimeOfDay>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub parent_chore_id: Option<crate::ChoreId>,
    pub max_completions: Option<i64>,
}
