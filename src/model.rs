use serde::{Deserialize, Serialize};

/// Recurrence mode of a reminder-bearing entity.
///
/// Weekly and monthly are calendar predicates (same weekday / same
/// day-of-month), not interval arithmetic; a monthly task due on the 31st
/// simply has no occurrence in a 30-day month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    None,
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    /// Decode the stored column value. Unknown strings fall back to `none`,
    /// which still yields the single fixed occurrence.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "daily" => Recurrence::Daily,
            "weekly" => Recurrence::Weekly,
            "monthly" => Recurrence::Monthly,
            _ => Recurrence::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Recurrence::None => "none",
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::Monthly => "monthly",
        }
    }
}

/// Lead-time selector: how far ahead of the occurrence the reminder fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyBefore {
    #[serde(rename = "at_time")]
    AtTime,
    #[serde(rename = "5_min")]
    Min5,
    #[serde(rename = "10_min")]
    Min10,
    #[serde(rename = "15_min")]
    Min15,
    #[serde(rename = "30_min")]
    Min30,
    #[serde(rename = "1_hour")]
    Hour1,
    #[serde(rename = "1_day")]
    Day1,
}

impl NotifyBefore {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "5_min" => NotifyBefore::Min5,
            "10_min" => NotifyBefore::Min10,
            "15_min" => NotifyBefore::Min15,
            "30_min" => NotifyBefore::Min30,
            "1_hour" => NotifyBefore::Hour1,
            "1_day" => NotifyBefore::Day1,
            _ => NotifyBefore::AtTime,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotifyBefore::AtTime => "at_time",
            NotifyBefore::Min5 => "5_min",
            NotifyBefore::Min10 => "10_min",
            NotifyBefore::Min15 => "15_min",
            NotifyBefore::Min30 => "30_min",
            NotifyBefore::Hour1 => "1_hour",
            NotifyBefore::Day1 => "1_day",
        }
    }

    /// Offset in whole minutes, subtracted from the occurrence instant.
    pub fn lead_minutes(self) -> i64 {
        match self {
            NotifyBefore::AtTime => 0,
            NotifyBefore::Min5 => 5,
            NotifyBefore::Min10 => 10,
            NotifyBefore::Min15 => 15,
            NotifyBefore::Min30 => 30,
            NotifyBefore::Hour1 => 60,
            NotifyBefore::Day1 => 1440,
        }
    }
}

/// A task row as read from the store. Dates and times stay raw strings here;
/// the resolver parses them and fails closed on garbage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoReminder {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub notify: bool,
    pub due_date: Option<String>,
    pub due_time: Option<String>,
    pub recurrence: Recurrence,
    pub notify_before: NotifyBefore,
    pub completed: bool,
    #[serde(default)]
    pub notification_sent: bool,
}

/// Mindset journal prompt configuration for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptReminder {
    pub id: String,
    pub user_id: String,
    /// Time-of-day of the daily prompt; absent means the evening default.
    pub prompt_time: Option<String>,
    /// Calendar date (`YYYY-MM-DD`) of the last prompt notification. The
    /// day-boundary comparison doubles as the per-day reset.
    pub notified_on: Option<String>,
}

/// A reminder with a shared dispatch contract, so the dispatcher never has
/// to inspect payload shapes at runtime.
#[derive(Debug, Clone)]
pub enum Reminder {
    Todo(TodoReminder),
    MindsetPrompt(PromptReminder),
}

impl Reminder {
    pub fn id(&self) -> &str {
        match self {
            Reminder::Todo(t) => &t.id,
            Reminder::MindsetPrompt(p) => &p.id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Reminder::Todo(t) => &t.user_id,
            Reminder::MindsetPrompt(p) => &p.user_id,
        }
    }

    pub fn kind(&self) -> ReminderKind {
        match self {
            Reminder::Todo(_) => ReminderKind::Todo,
            Reminder::MindsetPrompt(_) => ReminderKind::MindsetPrompt,
        }
    }

    pub fn notification_title(&self) -> String {
        match self {
            Reminder::Todo(t) => t.title.clone(),
            Reminder::MindsetPrompt(_) => "Evening check-in".to_string(),
        }
    }

    pub fn notification_body(&self) -> String {
        match self {
            Reminder::Todo(_) => "This task is due now.".to_string(),
            Reminder::MindsetPrompt(_) => {
                "Take a minute to reflect on today.".to_string()
            }
        }
    }

    pub fn payload(&self) -> PushPayload {
        PushPayload {
            kind: self.kind(),
            title: self.notification_title(),
            body: self.notification_body(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Todo,
    MindsetPrompt,
}

impl ReminderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderKind::Todo => "todo",
            ReminderKind::MindsetPrompt => "mindset_prompt",
        }
    }
}

/// Payload handed to the push transport for every registered endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPayload {
    pub kind: ReminderKind,
    pub title: String,
    pub body: String,
}

/// One registered push endpoint for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEndpoint {
    pub id: String,
    pub user_id: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: i64,
}

/// Durable in-app notification history row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: i64,
}
