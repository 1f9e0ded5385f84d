use serde::Deserialize;
use time::{Date, Duration};

pub const DEFAULT_OFFSETS_DAYS: [u32; 4] = [7, 5, 2, 1];

/// Days before the renewal date at which reminders fire.
#[derive(Clone, Debug, Deserialize)]
#[serde(transparent)]
pub struct ReminderOffsets(Vec<u32>);

impl ReminderOffsets {
    pub fn new(offsets_days: Vec<u32>) -> Self {
        Self(offsets_days)
    }
}

impl Default for ReminderOffsets {
    fn default() -> Self {
        Self(DEFAULT_OFFSETS_DAYS.to_vec())
    }
}

impl AsRef<[u32]> for ReminderOffsets {
    fn as_ref(&self) -> &[u32] {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReminderEntry {
    pub position: usize,
    pub offset_days: u32,
    pub instant: Date,
    pub label: String,
}

#[derive(Clone, Debug)]
pub struct ReminderPlan(Vec<ReminderEntry>);

impl ReminderPlan {
    pub fn entries(&self) -> &[ReminderEntry] {
        &self.0
    }

    pub fn get(&self, position: usize) -> Option<&ReminderEntry> {
        self.0.get(position)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn reminder_label(offset_days: u32) -> String {
    format!("Reminder {offset_days} days before")
}

/// Builds the reminders for one billing cycle, earliest first.
///
/// Entries that would land before `start_date` are dropped. Offsets sharing
/// an instant keep their configured order and are all delivered.
pub fn build_plan(renewal_date: Date, start_date: Date, offsets: &ReminderOffsets) -> ReminderPlan {
    let mut entries: Vec<(u32, Date)> = offsets
        .as_ref()
        .iter()
        .filter_map(|&offset| {
            renewal_date
                .checked_sub(Duration::days(offset.into()))
                .map(|instant| (offset, instant))
        })
        .filter(|(_, instant)| *instant >= start_date)
        .collect();

    entries.sort_by_key(|(_, instant)| *instant);

    ReminderPlan(
        entries
            .into_iter()
            .enumerate()
            .map(|(position, (offset_days, instant))| ReminderEntry {
                position,
                offset_days,
                instant,
                label: reminder_label(offset_days),
            })
            .collect(),
    )
}
